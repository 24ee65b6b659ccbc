//! Artifact tags
//!
//! Every containerize step names its image with a fresh tag built from the
//! build date, the commit and a weak sub-second disambiguator:
//!
//! ```text
//! 24.01.02.abcdef1-421
//! ^^ ^^ ^^ ^^^^^^^ ^^^
//! yy MM dd commit  hundredths of a second + one random digit
//! ```
//!
//! Tags are not content addressed: rebuilding the same commit yields a new
//! tag. Two builds of one commit in the same hundredth of a second can still
//! collide, so pushes check the registry instead of trusting uniqueness.

use crate::error::TagError;
use chrono::{DateTime, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the commit prefix embedded in a tag
pub const COMMIT_PREFIX_LEN: usize = 7;

/// Identifier of one built container image
///
/// Ordering is textual, which sorts by build date first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactTag(String);

impl ArtifactTag {
    /// Build a tag from explicit inputs
    ///
    /// # Arguments
    /// * `commit` - Full or abbreviated commit hash (at least 7 hex chars)
    /// * `now` - Build time; the date is taken in the given time zone
    /// * `random_digit` - Single digit disambiguator
    pub fn generate<Tz>(commit: &str, now: &DateTime<Tz>, random_digit: u8) -> Result<Self, TagError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let prefix = commit_prefix(commit)?;
        if random_digit > 9 {
            return Err(TagError::InvalidDigit(random_digit));
        }

        let hundredths = now.timestamp_subsec_millis() / 10 % 100;

        Ok(Self(format!(
            "{}.{}-{:02}{}",
            now.format("%y.%m.%d"),
            prefix,
            hundredths,
            random_digit
        )))
    }

    /// Build a tag for `commit` using the local clock
    pub fn for_commit(commit: &str) -> Result<Self, TagError> {
        // Digit in 0..=8, matching the historical tag convention
        let random_digit = uuid::Uuid::new_v4().as_bytes()[0] % 9;
        Self::generate(commit, &chrono::Local::now(), random_digit)
    }

    /// Parse and validate an existing tag
    pub fn parse(s: &str) -> Result<Self, TagError> {
        let malformed = || TagError::Malformed(s.to_string());

        let (head, suffix) = s.rsplit_once('-').ok_or_else(malformed)?;
        if suffix.len() != 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        let parts: Vec<&str> = head.split('.').collect();
        let [yy, mm, dd, commit] = parts.as_slice() else {
            return Err(malformed());
        };

        if date_from_parts(yy, mm, dd).is_none() {
            return Err(malformed());
        }
        if commit.len() != COMMIT_PREFIX_LEN || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(malformed());
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build date encoded in the tag
    pub fn date(&self) -> NaiveDate {
        let mut parts = self.0.splitn(4, '.');
        let (yy, mm, dd) = (
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
            parts.next().unwrap_or_default(),
        );
        date_from_parts(yy, mm, dd).unwrap_or_default()
    }

    /// Seven character commit prefix encoded in the tag
    pub fn commit_prefix(&self) -> &str {
        let start = "yy.MM.dd.".len();
        &self.0[start..start + COMMIT_PREFIX_LEN]
    }

    /// Reference to this tag in a repository, e.g. `app:24.01.02.abcdef1-421`
    pub fn image_ref(&self, repository: &str) -> String {
        format!("{}:{}", repository, self.0)
    }
}

fn commit_prefix(commit: &str) -> Result<&str, TagError> {
    let commit = commit.trim();
    if commit.len() < COMMIT_PREFIX_LEN || !commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TagError::InvalidCommit(commit.to_string()));
    }
    Ok(&commit[..COMMIT_PREFIX_LEN])
}

fn date_from_parts(yy: &str, mm: &str, dd: &str) -> Option<NaiveDate> {
    if [yy, mm, dd].iter().any(|p| p.len() != 2) {
        return None;
    }
    let year: i32 = yy.parse().ok()?;
    let month: u32 = mm.parse().ok()?;
    let day: u32 = dd.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArtifactTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArtifactTag {
    type Error = TagError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ArtifactTag> for String {
    fn from(tag: ArtifactTag) -> Self {
        tag.0
    }
}
