//! Clean command - tear down the release or the whole cluster
//!
//! `clean higress` removes the ingress, the release and its namespace but
//! keeps the cluster and the load balancer controller. `clean eks` does the
//! same and then removes the controller, the cluster and the controller
//! policy.

use std::time::Duration;

use clap::{Args, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};

use super::alb::{policy_arn, WEBHOOK_CONFIGURATION};
use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::prompt::confirm;
use crate::{Error, Result, CONTROLLER_NAME, HIGRESS_NAMESPACE, HIGRESS_RELEASE, KUBE_SYSTEM_NAMESPACE};

const RELEASE_SETTLE: Duration = Duration::from_secs(20);
const CONTROLLER_SETTLE: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CleanTarget {
    /// The whole EKS cluster and everything on it
    Eks,
    /// Only the Higress release; the cluster stays up
    Higress,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// What to remove
    #[arg(value_enum)]
    pub target: CleanTarget,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

pub async fn run(args: CleanArgs, deployer: &Deployer) -> Result<()> {
    match args.target {
        CleanTarget::Higress => deployer.teardown_application(args.force).await,
        CleanTarget::Eks => deployer.teardown_cluster(args.force).await,
    }
}

pub async fn run_deprecated_delete(args: DeleteArgs, deployer: &Deployer) -> Result<()> {
    warn!("`delete` is deprecated, use `clean eks` instead");
    deployer.teardown_cluster(args.force).await
}

impl Deployer {
    pub async fn teardown_application(&self, force: bool) -> Result<()> {
        if !force {
            println!("This will delete the Higress release, its namespace and the ALB ingress.");
            println!("The EKS cluster and the load balancer controller are kept.");
            if !confirm(self.prompt(), "Delete Higress?").await? {
                return Err(Error::aborted("deletion not confirmed"));
            }
        }

        self.remove_application().await?;
        info!("Higress removed");
        println!(
            "The cluster is still running; use `higress-deploy clean eks` to delete it."
        );
        Ok(())
    }

    pub async fn teardown_cluster(&self, force: bool) -> Result<()> {
        if !force {
            println!(
                "This will permanently delete cluster '{}' with its nodes, Higress, the load \
                 balancers, the controller and its IAM policy.",
                self.cluster_name()
            );
            let answer = self
                .prompt()
                .ask("Type the cluster name to confirm:")
                .await?;
            if answer != self.cluster_name() {
                return Err(Error::aborted(format!(
                    "cluster name '{}' does not match '{}'",
                    answer,
                    self.cluster_name()
                )));
            }
        }

        info!("[Step 1] Removing Higress...");
        self.remove_application().await?;

        info!("[Step 2] Removing load balancer controller...");
        self.runner()
            .try_run(&Cmd::helm().args(["uninstall", CONTROLLER_NAME, "-n", KUBE_SYSTEM_NAMESPACE]))
            .await?;
        for kind in ["validatingwebhookconfiguration", "mutatingwebhookconfiguration"] {
            self.runner()
                .try_run(&Cmd::kubectl().args(["delete", kind, WEBHOOK_CONFIGURATION]))
                .await?;
        }
        self.settle(CONTROLLER_SETTLE, "AWS resources to be released")
            .await;

        info!("[Step 3] Deleting EKS cluster (this takes 10-15 minutes)...");
        self.runner()
            .check(
                &Cmd::eksctl()
                    .args(["delete", "cluster", "--name", self.cluster_name()])
                    .args(["--region", self.region(), "--wait"]),
            )
            .await?;

        info!("[Step 4] Deleting controller IAM policy...");
        match self.account_id().await {
            Ok(account) => {
                let arn = policy_arn(&account);
                if !self
                    .runner()
                    .try_run(&Cmd::aws().args(["iam", "delete-policy", "--policy-arn", &arn]))
                    .await?
                {
                    warn!("Could not delete {}; remove it manually if unused", arn);
                }
            }
            Err(e) => warn!("Skipping policy deletion, account id unknown: {}", e),
        }

        info!("Cluster {} deleted", self.cluster_name());
        Ok(())
    }

    /// Delete ingress, release and namespace, clearing finalizers if the
    /// namespace hangs in `Terminating`. Every step is best effort.
    async fn remove_application(&self) -> Result<()> {
        self.runner()
            .try_run(&Cmd::kubectl().args(["delete", "ingress", "--all", "-n", HIGRESS_NAMESPACE]))
            .await?;
        self.runner()
            .try_run(&Cmd::helm().args(["uninstall", HIGRESS_RELEASE, "-n", HIGRESS_NAMESPACE]))
            .await?;
        self.settle(RELEASE_SETTLE, "load balancers to be released")
            .await;
        self.runner()
            .try_run(
                &Cmd::kubectl()
                    .args(["delete", "namespace", HIGRESS_NAMESPACE, "--timeout=60s"]),
            )
            .await?;
        self.clear_stuck_namespace().await
    }

    async fn clear_stuck_namespace(&self) -> Result<()> {
        let Some(raw) = self
            .runner()
            .try_capture(&Cmd::kubectl().args(["get", "namespace", HIGRESS_NAMESPACE, "-o", "json"]))
            .await?
        else {
            return Ok(());
        };
        if !raw.contains("Terminating") {
            return Ok(());
        }

        warn!("Namespace {} stuck in Terminating, clearing finalizers", HIGRESS_NAMESPACE);
        let mut namespace: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not parse namespace {}: {}", HIGRESS_NAMESPACE, e);
                return Ok(());
            }
        };
        namespace["spec"]["finalizers"] = Value::Array(Vec::new());

        let finalize = Cmd::kubectl()
            .args(["replace", "--raw"])
            .arg(format!("/api/v1/namespaces/{}/finalize", HIGRESS_NAMESPACE))
            .args(["-f", "-"])
            .stdin(serde_json::to_string(&namespace)?);
        if !self.runner().try_run(&finalize).await? {
            warn!("Could not clear finalizers of {}", HIGRESS_NAMESPACE);
        }
        Ok(())
    }
}
