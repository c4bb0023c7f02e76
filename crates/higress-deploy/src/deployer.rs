//! Shared context for every workflow step.
//!
//! A [`Deployer`] owns the loaded configuration, the artifact locations and
//! the backends used to reach the outside world. Each subcommand adds its own
//! `impl Deployer` block in `commands/`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{self, Config};
use crate::descriptors::{self, ArtifactPaths};
use crate::exec::{Cmd, CommandRunner, ProcessRunner, RunnerExt};
use crate::http::{HttpClient, ReqwestClient};
use crate::prompt::{Prompt, StdinPrompt};
use crate::{Error, Result};

/// External CLIs every provisioning run depends on.
pub const REQUIRED_TOOLS: [(&str, &str); 4] = [
    (
        "aws",
        "Install the AWS CLI: https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html",
    ),
    (
        "kubectl",
        "Install kubectl: https://kubernetes.io/docs/tasks/tools/",
    ),
    (
        "eksctl",
        "Install eksctl: https://eksctl.io/installation/",
    ),
    ("helm", "Install Helm: https://helm.sh/docs/intro/install/"),
];

pub struct Deployer {
    config: Config,
    paths: ArtifactPaths,
    runner: Arc<dyn CommandRunner>,
    http: Arc<dyn HttpClient>,
    prompt: Arc<dyn Prompt>,
}

impl Deployer {
    /// Deployer backed by real processes, HTTP and the terminal.
    pub fn new(config: Config, paths: ArtifactPaths) -> Result<Self> {
        Ok(Self::with_backends(
            config,
            paths,
            Arc::new(ProcessRunner::new()),
            Arc::new(ReqwestClient::new()?),
            Arc::new(StdinPrompt),
        ))
    }

    pub fn with_backends(
        config: Config,
        paths: ArtifactPaths,
        runner: Arc<dyn CommandRunner>,
        http: Arc<dyn HttpClient>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        Self {
            config,
            paths,
            runner,
            http,
            prompt,
        }
    }

    /// Load `config_path`, warn about validation problems, and regenerate
    /// the descriptors into `workdir`.
    pub fn from_file(config_path: &Path, workdir: &Path) -> Result<Self> {
        let config = config::load(config_path)?;
        preflight(&config);
        let deployer = Self::new(config, ArtifactPaths::new(workdir))?;
        deployer.regenerate_descriptors()?;
        Ok(deployer)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn cluster_name(&self) -> &str {
        &self.config.eks.cluster_name
    }

    pub fn region(&self) -> &str {
        &self.config.aws.region
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub(crate) fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    pub(crate) fn prompt(&self) -> &dyn Prompt {
        self.prompt.as_ref()
    }

    /// Rewrite all descriptors from the current configuration.
    pub fn regenerate_descriptors(&self) -> Result<()> {
        descriptors::write_all(&self.config, &self.paths)
    }

    /// Account id from the config file, or from STS when not set there.
    pub async fn account_id(&self) -> Result<String> {
        if let Some(id) = self.config.explicit_account_id() {
            return Ok(id.to_string());
        }
        let cmd = Cmd::aws().args([
            "sts",
            "get-caller-identity",
            "--query",
            "Account",
            "--output",
            "text",
        ]);
        let id = self.runner().capture(&cmd).await?;
        if id.is_empty() {
            return Err(Error::command_failed(cmd.to_string(), "empty account id"));
        }
        Ok(id)
    }

    /// Fail unless every tool in [`REQUIRED_TOOLS`] is on `PATH`.
    pub async fn check_prerequisites(&self) -> Result<()> {
        info!("Checking prerequisites...");
        let mut missing = Vec::new();
        for (tool, hint) in REQUIRED_TOOLS {
            let found = self
                .runner()
                .try_capture(&Cmd::new("which").arg(tool))
                .await?
                .is_some_and(|path| !path.is_empty());
            if found {
                info!("  found {}", tool);
            } else {
                warn!("{} not found. {}", tool, hint);
                missing.push(tool.to_string());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingTools { tools: missing })
        }
    }

    /// Fixed delay letting the cloud side catch up with a change.
    pub(crate) async fn settle(&self, delay: Duration, reason: &str) {
        info!("Waiting {}s for {}...", delay.as_secs(), reason);
        tokio::time::sleep(delay).await;
    }
}

/// Log validation problems without stopping the run.
pub fn preflight(config: &Config) {
    let errors = config::validate(config);
    if errors.is_empty() {
        return;
    }
    warn!(
        "Configuration has {} problem(s); continuing anyway (run `validate` for details)",
        errors.len()
    );
    for error in &errors {
        warn!("  {}", error);
    }
}
