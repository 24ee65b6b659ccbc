//! .NET build targets

use anyhow::Context;
use async_trait::async_trait;
use shipyard_runner::{CommandSpec, TargetBody, TargetContext, TargetOutputs};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::params;

/// File the local database container reads its password from
pub const DB_PASSWORD_FILE: &str = "docker-postgres-password.txt";

/// Configuration `publish` always uses
const PUBLISH_CONFIGURATION: &str = "Release";

/// Appended to every dotnet invocation
const QUIET: [&str; 2] = ["--verbosity", "quiet"];

fn dotnet(ctx: &TargetContext<'_>) -> CommandSpec {
    CommandSpec::new("dotnet")
        .cwd(ctx.root())
        .env("DOTNET_NOLOGO", "1")
}

/// Removes a directory if present and creates it empty
async fn recreate_dir(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to clean {}", path.display()))?;
    }
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))
}

/// Creates the local database password and hands it to the web project
pub struct InitLocalDb {
    web_project: PathBuf,
}

impl InitLocalDb {
    pub fn new(web_project: &Path) -> Self {
        Self {
            web_project: web_project.to_path_buf(),
        }
    }
}

#[async_trait]
impl TargetBody for InitLocalDb {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let path = ctx.root().join(DB_PASSWORD_FILE);

        // docker compose creates a directory when the file is missing
        if path.is_dir() {
            debug!("Removing directory {}", path.display());
            tokio::fs::remove_dir_all(&path)
                .await
                .with_context(|| format!("Failed to remove directory {}", path.display()))?;
        }

        if path.exists() {
            anyhow::bail!("Password was already initialized ({})", path.display());
        }

        let password = uuid::Uuid::new_v4().simple().to_string();
        tokio::fs::write(&path, &password)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Passed as JSON on stdin so the password stays off the command line
        let secrets = serde_json::json!({ "DB:Password": password }).to_string();
        ctx.run(
            dotnet(ctx)
                .args(["user-secrets", "set", "--project"])
                .arg(self.web_project.to_string_lossy())
                .stdin(secrets),
        )
        .await?;

        info!("Local database password written to {}", path.display());
        Ok(TargetOutputs::new())
    }
}

pub struct Clean {
    publish_dir: PathBuf,
}

impl Clean {
    pub fn new(publish_dir: &Path) -> Self {
        Self {
            publish_dir: publish_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl TargetBody for Clean {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        ctx.run(dotnet(ctx).arg("clean").args(QUIET)).await?;
        recreate_dir(&ctx.root().join(&self.publish_dir)).await?;
        Ok(TargetOutputs::new())
    }
}

pub struct Restore;

#[async_trait]
impl TargetBody for Restore {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        ctx.run(dotnet(ctx).arg("restore").args(QUIET)).await?;
        Ok(TargetOutputs::new())
    }
}

pub struct Compile;

#[async_trait]
impl TargetBody for Compile {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let configuration = ctx.require(params::CONFIGURATION)?;
        ctx.run(
            dotnet(ctx)
                .args(["build", "--no-restore", "--configuration", configuration])
                .args(QUIET),
        )
        .await?;
        Ok(TargetOutputs::new())
    }
}

pub struct Test;

#[async_trait]
impl TargetBody for Test {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let configuration = ctx.require(params::CONFIGURATION)?;
        ctx.run(
            dotnet(ctx)
                .args(["test", "--no-build", "--configuration", configuration])
                .args(QUIET),
        )
        .await?;
        Ok(TargetOutputs::new())
    }
}

/// Publishes the web project without development settings
pub struct Publish {
    web_project: PathBuf,
    publish_dir: PathBuf,
}

impl Publish {
    pub fn new(web_project: &Path, publish_dir: &Path) -> Self {
        Self {
            web_project: web_project.to_path_buf(),
            publish_dir: publish_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl TargetBody for Publish {
    async fn execute(&self, ctx: &TargetContext<'_>) -> anyhow::Result<TargetOutputs> {
        let output = ctx.root().join(&self.publish_dir);
        recreate_dir(&output).await?;

        ctx.run(
            dotnet(ctx)
                .arg("publish")
                .arg(self.web_project.to_string_lossy())
                .args(["--no-restore", "--configuration", PUBLISH_CONFIGURATION])
                .arg("--output")
                .arg(output.to_string_lossy())
                .args(QUIET),
        )
        .await?;

        let dev_settings = output.join("appsettings.Development.json");
        if dev_settings.exists() {
            tokio::fs::remove_file(&dev_settings)
                .await
                .with_context(|| format!("Failed to remove {}", dev_settings.display()))?;
        }

        Ok(TargetOutputs::from([(
            "publish_dir".to_string(),
            output.display().to_string(),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::RecordingRunner;
    use shipyard_runner::{BuildContext, Parameters};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn context(root: &Path, runner: Arc<RecordingRunner>) -> BuildContext {
        BuildContext::new(root, Parameters::default(), runner)
    }

    #[tokio::test]
    async fn test_init_local_db_writes_password() {
        let dir = tempfile::tempdir().unwrap();
        // Left behind by docker compose
        std::fs::create_dir(dir.path().join(DB_PASSWORD_FILE)).unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let build = context(dir.path(), runner.clone());
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, "init-local-db", &outputs);

        InitLocalDb::new(Path::new("src/Web")).execute(&ctx).await.unwrap();

        let password = std::fs::read_to_string(dir.path().join(DB_PASSWORD_FILE)).unwrap();
        assert!(password.len() >= 20);

        let specs = runner.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].program, "dotnet");
        assert_eq!(specs[0].args, ["user-secrets", "set", "--project", "src/Web"]);
        let stdin: serde_json::Value =
            serde_json::from_str(specs[0].stdin.as_deref().unwrap()).unwrap();
        assert_eq!(stdin["DB:Password"], password);
        assert!(specs.iter().all(|s| !s.args.contains(&password)));
    }

    #[tokio::test]
    async fn test_init_local_db_refuses_existing_password() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DB_PASSWORD_FILE), "existing").unwrap();

        let runner = Arc::new(RecordingRunner::new());
        let build = context(dir.path(), runner.clone());
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, "init-local-db", &outputs);

        let err = InitLocalDb::new(Path::new("src/Web"))
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already initialized"));
        assert!(runner.specs().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(DB_PASSWORD_FILE)).unwrap(),
            "existing"
        );
    }

    #[tokio::test]
    async fn test_publish_removes_development_settings() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let build = context(dir.path(), runner.clone());
        let outputs = BTreeMap::new();
        let ctx = TargetContext::new(&build, "publish", &outputs);

        // Stands in for what dotnet publish would produce
        let publish = dir.path().join("publish");
        let stale = publish.join("stale.dll");
        std::fs::create_dir_all(&publish).unwrap();
        std::fs::write(&stale, "").unwrap();

        let produced = Publish::new(Path::new("src/Web"), Path::new("publish"))
            .execute(&ctx)
            .await
            .unwrap();

        assert!(publish.is_dir());
        assert!(!stale.exists());
        assert!(!publish.join("appsettings.Development.json").exists());
        assert_eq!(produced["publish_dir"], publish.display().to_string());

        let lines = runner.lines();
        assert!(lines[0].starts_with("dotnet publish src/Web --no-restore --configuration Release"));
        assert!(lines[0].ends_with("--verbosity quiet"));
    }
}
