//! Higress on EKS deployment library
//!
//! Drives `aws`, `eksctl`, `helm` and `kubectl` through the steps needed to
//! run the Higress gateway on an EKS cluster behind an Application Load
//! Balancer, from cluster creation to teardown.

pub mod commands;
pub mod config;
pub mod deployer;
pub mod descriptors;
pub mod error;
pub mod exec;
pub mod http;
pub mod policy;
pub mod poll;
pub mod prompt;

#[cfg(test)]
mod testing;

pub use error::{Error, FailureKind, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{init, validate, WorkflowCommand};
use deployer::Deployer;
use descriptors::ArtifactPaths;
use prompt::StdinPrompt;

/// Namespace of the Higress release and the ALB ingress.
pub const HIGRESS_NAMESPACE: &str = "higress-system";
/// Namespace of the load balancer controller and the EBS CSI driver.
pub const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";
pub const INGRESS_NAME: &str = "higress-alb";
pub const GATEWAY_SERVICE: &str = "higress-gateway";
pub const HTTP_NODE_PORT: u16 = 30080;
pub const HTTPS_NODE_PORT: u16 = 30443;
pub const HIGRESS_RELEASE: &str = "higress";
pub const CONTROLLER_NAME: &str = "aws-load-balancer-controller";

/// Higress on EKS - provision, deploy and tear down
#[derive(Parser, Debug)]
#[command(name = "higress-deploy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "HIGRESS_DEPLOY_CONFIG",
        default_value = config::DEFAULT_CONFIG_PATH
    )]
    pub config: PathBuf,

    /// Directory for generated descriptors
    #[arg(long, global = true, env = "HIGRESS_DEPLOY_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration scaffold; descriptors are not generated until
    /// the scaffold is filled in and another command runs
    Init(init::InitArgs),
    /// Check the configuration file without touching AWS and regenerate the
    /// descriptors
    Validate,
    #[command(flatten)]
    Workflow(WorkflowCommand),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(args) => init::run(&args, &self.config, &StdinPrompt).await,
            Commands::Validate => {
                let config = config::load(&self.config)?;
                descriptors::write_all(&config, &ArtifactPaths::new(&self.workdir))?;
                validate::run(&config)
            }
            Commands::Workflow(command) => {
                let deployer = Deployer::from_file(&self.config, &self.workdir)?;
                command.execute(&deployer).await
            }
        }
    }
}
