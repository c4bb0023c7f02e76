//! CLI commands

use std::fmt::Display;

use clap::Subcommand;

use crate::deployer::Deployer;
use crate::{Error, Result};

pub mod alb;
pub mod clean;
pub mod create;
pub mod deploy;
pub mod ebs_csi;
pub mod ingress;
pub mod init;
pub mod install_all;
pub mod status;
pub mod validate;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed`, naming the failed step.
    fn cmd_err(self, step: &str) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self, step: &str) -> Result<T> {
        self.map_err(|e| Error::command_failed(step, e.to_string()))
    }
}

/// Subcommands that operate on the configured deployment.
#[derive(Subcommand, Debug)]
pub enum WorkflowCommand {
    /// Create the EKS cluster
    Create,
    /// Install the EBS CSI driver add-on
    InstallEbsCsi,
    /// Install the AWS Load Balancer Controller
    InstallAlb,
    /// Refresh the controller IAM policy and restart the controller
    FixAlbPermissions,
    /// Open the gateway node ports to the VPC on the cluster security group
    FixAlbSecurityGroup,
    /// Install the Higress release
    Deploy,
    /// Create the ALB ingress in front of the gateway
    CreateLb,
    /// Run every step from cluster creation to load balancer
    InstallAll,
    /// Show the current deployment state
    Status,
    /// Remove the cluster or only the Higress release
    Clean(clean::CleanArgs),
    /// Delete the EKS cluster (deprecated, use `clean eks`)
    Delete(clean::DeleteArgs),
}

impl WorkflowCommand {
    pub async fn execute(self, deployer: &Deployer) -> Result<()> {
        match self {
            WorkflowCommand::Create => deployer.create_cluster().await,
            WorkflowCommand::InstallEbsCsi => deployer.install_ebs_csi().await,
            WorkflowCommand::InstallAlb => deployer.install_alb_controller().await,
            WorkflowCommand::FixAlbPermissions => deployer.fix_alb_permissions().await,
            WorkflowCommand::FixAlbSecurityGroup => deployer.fix_alb_security_group().await,
            WorkflowCommand::Deploy => deployer.deploy_application().await,
            WorkflowCommand::CreateLb => deployer.create_load_balancer().await,
            WorkflowCommand::InstallAll => deployer.install_all().await,
            WorkflowCommand::Status => deployer.report_status().await,
            WorkflowCommand::Clean(args) => clean::run(args, deployer).await,
            WorkflowCommand::Delete(args) => clean::run_deprecated_delete(args, deployer).await,
        }
    }
}
