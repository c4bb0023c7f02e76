//! EBS CSI driver add-on installation
//!
//! The driver's controller runs under its own IAM role bound to the
//! `ebs-csi-controller-sa` service account. Any earlier binding is removed
//! first so a stale role never shadows the fresh one.

use std::time::Duration;

use tracing::{info, warn};

use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::poll::{poll_until, PollBudget, PollOutcome};
use crate::{Error, Result, KUBE_SYSTEM_NAMESPACE};

pub const ADDON_NAME: &str = "aws-ebs-csi-driver";
const SERVICE_ACCOUNT: &str = "ebs-csi-controller-sa";
const DRIVER_POLICY_ARN: &str = "arn:aws:iam::aws:policy/service-role/AmazonEBSCSIDriverPolicy";

const ACTIVE: &str = "ACTIVE";
const TERMINAL_STATUSES: [&str; 3] = ["CREATE_FAILED", "UPDATE_FAILED", "DELETE_FAILED"];

const ADDON_BUDGET: PollBudget = PollBudget::new(30, Duration::from_secs(10));

impl Deployer {
    pub async fn install_ebs_csi(&self) -> Result<()> {
        info!("Installing EBS CSI driver on {}...", self.cluster_name());

        info!("[Step 1] Checking driver policy...");
        self.runner()
            .capture(&Cmd::aws().args(["iam", "get-policy", "--policy-arn", DRIVER_POLICY_ARN]))
            .await?;

        info!("[Step 2] Binding service account {} to a fresh role...", SERVICE_ACCOUNT);
        self.replace_driver_service_account().await?;
        let role_arn = self.driver_role_arn().await?;

        info!("[Step 3] Installing add-on {}...", ADDON_NAME);
        self.apply_addon(role_arn.as_deref()).await?;

        info!("[Step 4] Waiting for add-on to become {}...", ACTIVE);
        self.wait_for_addon().await
    }

    fn driver_role_name(&self) -> String {
        format!("AmazonEKS_EBS_CSI_DriverRole_{}", self.cluster_name())
    }

    async fn replace_driver_service_account(&self) -> Result<()> {
        let delete = Cmd::eksctl()
            .args(["delete", "iamserviceaccount"])
            .arg(format!("--cluster={}", self.cluster_name()))
            .arg(format!("--namespace={}", KUBE_SYSTEM_NAMESPACE))
            .arg(format!("--name={}", SERVICE_ACCOUNT))
            .arg(format!("--region={}", self.region()));
        if !self.runner().try_run(&delete).await? {
            info!("No existing service account binding to remove");
        }

        let create = Cmd::eksctl()
            .args(["create", "iamserviceaccount"])
            .arg(format!("--cluster={}", self.cluster_name()))
            .arg(format!("--namespace={}", KUBE_SYSTEM_NAMESPACE))
            .arg(format!("--name={}", SERVICE_ACCOUNT))
            .arg(format!("--role-name={}", self.driver_role_name()))
            .arg("--role-only")
            .arg(format!("--attach-policy-arn={}", DRIVER_POLICY_ARN))
            .arg(format!("--region={}", self.region()))
            .arg("--approve");
        self.runner().check(&create).await
    }

    /// ARN of the driver role, or `None` if it cannot be resolved.
    async fn driver_role_arn(&self) -> Result<Option<String>> {
        let cmd = Cmd::aws()
            .args(["iam", "get-role", "--role-name"])
            .arg(self.driver_role_name())
            .args(["--query", "Role.Arn", "--output", "text"]);
        let arn = self
            .runner()
            .try_capture(&cmd)
            .await?
            .filter(|arn| !arn.is_empty() && arn != "None");
        if arn.is_none() {
            warn!("Could not resolve {}; the add-on will fall back to the node role", self.driver_role_name());
        }
        Ok(arn)
    }

    fn describe_addon(&self, query: &str, output: &str) -> Cmd {
        Cmd::aws()
            .args(["eks", "describe-addon", "--cluster-name"])
            .arg(self.cluster_name())
            .args(["--addon-name", ADDON_NAME, "--region", self.region()])
            .args(["--query", query, "--output", output])
    }

    async fn addon_status(&self) -> Result<Option<String>> {
        Ok(self
            .runner()
            .try_capture(&self.describe_addon("addon.status", "text"))
            .await?
            .filter(|status| !status.is_empty()))
    }

    async fn apply_addon(&self, role_arn: Option<&str>) -> Result<()> {
        let existing = self.addon_status().await?;
        let mut cmd = match &existing {
            Some(status) => {
                info!("Add-on already present ({}), updating", status);
                Cmd::aws()
                    .args(["eks", "update-addon"])
                    .args(["--resolve-conflicts", "OVERWRITE"])
            }
            None => Cmd::aws().args(["eks", "create-addon"]),
        };
        cmd = cmd
            .arg("--cluster-name")
            .arg(self.cluster_name())
            .args(["--addon-name", ADDON_NAME, "--region", self.region()]);
        if let Some(arn) = role_arn {
            cmd = cmd.arg("--service-account-role-arn").arg(arn);
        }
        self.runner().check(&cmd).await
    }

    async fn wait_for_addon(&self) -> Result<()> {
        let outcome = poll_until(ADDON_BUDGET, "EBS CSI add-on", move || async move {
            self.addon_status().await.map(|status| {
                status.filter(|s| s == ACTIVE || TERMINAL_STATUSES.contains(&s.as_str()))
            })
        })
        .await?;

        match outcome {
            PollOutcome::Ready(status) if status == ACTIVE => {
                info!("EBS CSI driver is {}", ACTIVE);
                Ok(())
            }
            PollOutcome::Ready(status) => {
                self.dump_addon_diagnostics().await?;
                Err(Error::AddonFailed {
                    addon: ADDON_NAME.to_string(),
                    status,
                })
            }
            PollOutcome::TimedOut { attempts } => {
                warn!(
                    "EBS CSI add-on not {} after {} checks; check `aws eks describe-addon` later",
                    ACTIVE, attempts
                );
                Ok(())
            }
        }
    }

    async fn dump_addon_diagnostics(&self) -> Result<()> {
        warn!("EBS CSI add-on failed, collecting diagnostics...");
        self.runner()
            .try_run(&self.describe_addon("addon.health", "json"))
            .await?;
        self.runner()
            .try_run(
                &Cmd::kubectl()
                    .args(["get", "pods", "-n", KUBE_SYSTEM_NAMESPACE])
                    .args(["-l", "app.kubernetes.io/name=aws-ebs-csi-driver"]),
            )
            .await?;
        Ok(())
    }
}
