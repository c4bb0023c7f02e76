//! AWS Load Balancer Controller installation and repair

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use super::CommandErrorExt;
use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::policy::{self, ADDITIONAL_PERMISSIONS};
use crate::poll::{poll_text, PollBudget};
use crate::{Result, CONTROLLER_NAME, HTTPS_NODE_PORT, HTTP_NODE_PORT, KUBE_SYSTEM_NAMESPACE};

pub const POLICY_NAME: &str = "AWSLoadBalancerControllerIAMPolicy";
pub const WEBHOOK_SERVICE: &str = "aws-load-balancer-webhook-service";
/// Name of both webhook configurations the controller registers.
pub const WEBHOOK_CONFIGURATION: &str = "aws-load-balancer-webhook";

const CHART_REPO_NAME: &str = "eks";
const CHART_REPO_URL: &str = "https://aws.github.io/eks-charts";

/// Endpoint population right after install.
pub const WEBHOOK_INSTALL_BUDGET: PollBudget = PollBudget::new(30, Duration::from_secs(1));
const WEBHOOK_SETTLE: Duration = Duration::from_secs(10);

/// ARN of the controller policy in `account_id`.
pub fn policy_arn(account_id: &str) -> String {
    format!("arn:aws:iam::{}:policy/{}", account_id, POLICY_NAME)
}

impl Deployer {
    pub async fn install_alb_controller(&self) -> Result<()> {
        info!("Installing AWS Load Balancer Controller on {}...", self.cluster_name());
        let arn = policy_arn(&self.account_id().await?);

        info!("[Step 1] Preparing IAM policy...");
        self.prepare_controller_policy().await?;
        self.push_controller_policy(&arn).await?;

        info!("[Step 2] Creating IAM service account...");
        let service_account = Cmd::eksctl()
            .args(["create", "iamserviceaccount"])
            .arg(format!("--cluster={}", self.cluster_name()))
            .arg(format!("--namespace={}", KUBE_SYSTEM_NAMESPACE))
            .arg(format!("--name={}", CONTROLLER_NAME))
            .arg(format!("--attach-policy-arn={}", arn))
            .arg("--override-existing-serviceaccounts")
            .arg(format!("--region={}", self.region()))
            .arg("--approve");
        self.runner().check(&service_account).await?;

        info!("[Step 3] Installing controller chart...");
        self.add_chart_repo(CHART_REPO_NAME, CHART_REPO_URL).await?;
        let install = Cmd::helm()
            .args(["upgrade", "--install", CONTROLLER_NAME])
            .arg(format!("{}/{}", CHART_REPO_NAME, CONTROLLER_NAME))
            .args(["-n", KUBE_SYSTEM_NAMESPACE])
            .arg("--set")
            .arg(format!("clusterName={}", self.cluster_name()))
            .args(["--set", "serviceAccount.create=false"])
            .arg("--set")
            .arg(format!("serviceAccount.name={}", CONTROLLER_NAME))
            .arg("--set")
            .arg(format!("region={}", self.region()))
            .arg("--set")
            .arg(format!("vpcId={}", self.config().vpc.vpc_id));
        self.runner().check(&install).await?;

        info!("[Step 4] Waiting for controller...");
        self.runner()
            .check(
                &Cmd::kubectl()
                    .args(["wait", "--for=condition=available", "--timeout=300s"])
                    .arg(format!("deployment/{}", CONTROLLER_NAME))
                    .args(["-n", KUBE_SYSTEM_NAMESPACE]),
            )
            .await?;

        if !self.webhook_endpoints_ready(WEBHOOK_INSTALL_BUDGET).await? {
            warn!("Webhook endpoints not populated yet, continuing");
        }
        self.settle(WEBHOOK_SETTLE, "webhook initialization").await;

        self.runner()
            .try_run(
                &Cmd::kubectl()
                    .args(["get", "deployment", "-n", KUBE_SYSTEM_NAMESPACE, CONTROLLER_NAME]),
            )
            .await?;

        info!("AWS Load Balancer Controller installed");
        Ok(())
    }

    /// Push a refreshed policy, restart the controller so it picks it up,
    /// and wait for the rollout.
    pub async fn fix_alb_permissions(&self) -> Result<()> {
        info!("Repairing AWS Load Balancer Controller permissions...");
        let arn = policy_arn(&self.account_id().await?);

        self.prepare_controller_policy().await?;
        self.push_controller_policy(&arn).await?;

        info!("Restarting controller to pick up the new policy...");
        self.runner().check(&self.controller_restart()).await?;
        self.runner()
            .check(
                &Cmd::kubectl()
                    .args(["rollout", "status", "deployment", CONTROLLER_NAME])
                    .args(["-n", KUBE_SYSTEM_NAMESPACE, "--timeout=300s"]),
            )
            .await?;

        println!("Controller permissions updated. Next steps:");
        println!("  1. Delete a previously failed ingress:");
        println!(
            "     kubectl delete ingress {} -n {}",
            crate::INGRESS_NAME,
            crate::HIGRESS_NAMESPACE
        );
        println!("  2. Recreate the load balancer:");
        println!("     higress-deploy create-lb");
        Ok(())
    }

    /// Allow the VPC to reach the gateway node ports through the cluster
    /// security group.
    pub async fn fix_alb_security_group(&self) -> Result<()> {
        info!("Opening gateway node ports on the cluster security group...");

        let group_id = self
            .runner()
            .capture(
                &Cmd::aws()
                    .args(["eks", "describe-cluster", "--name"])
                    .arg(self.cluster_name())
                    .args(["--region", self.region()])
                    .args([
                        "--query",
                        "cluster.resourcesVpcConfig.clusterSecurityGroupId",
                        "--output",
                        "text",
                    ]),
            )
            .await?;
        let cidr = self
            .runner()
            .capture(
                &Cmd::aws()
                    .args(["ec2", "describe-vpcs", "--vpc-ids"])
                    .arg(&self.config().vpc.vpc_id)
                    .args(["--region", self.region()])
                    .args(["--query", "Vpcs[0].CidrBlock", "--output", "text"]),
            )
            .await?;
        info!("Security group {} / VPC CIDR {}", group_id, cidr);

        for port in [HTTP_NODE_PORT, HTTPS_NODE_PORT] {
            let rule = Cmd::aws()
                .args(["ec2", "authorize-security-group-ingress", "--group-id"])
                .arg(&group_id)
                .args(["--protocol", "tcp", "--port"])
                .arg(port.to_string())
                .arg("--cidr")
                .arg(&cidr)
                .args(["--region", self.region()]);
            if self.runner().try_run(&rule).await? {
                info!("Allowed tcp/{} from {}", port, cidr);
            } else {
                warn!("Rule for tcp/{} not added (it may already be present)", port);
            }
        }
        Ok(())
    }

    /// Download the baseline policy, merge in the extra permissions, and
    /// write the result to the policy artifact.
    async fn prepare_controller_policy(&self) -> Result<()> {
        let url = &self.config().alb.policy_url;
        info!("Downloading controller policy from {}", url);
        let body = self.http().get_text(url).await?;
        let mut document: Value = serde_json::from_str(&body).cmd_err("parse controller policy")?;

        let added = policy::augment(&mut document, self.config().alb.augment_scope);
        if added.is_empty() {
            info!(
                "Policy already grants all {} listener permissions",
                ADDITIONAL_PERMISSIONS.len()
            );
        }
        for permission in &added {
            info!("  added {}", permission);
        }

        std::fs::create_dir_all(self.paths().dir())?;
        std::fs::write(self.paths().policy(), serde_json::to_string_pretty(&document)?)?;
        Ok(())
    }

    /// Create the policy, or add a new default version when it exists.
    async fn push_controller_policy(&self, arn: &str) -> Result<()> {
        let document = format!("file://{}", self.paths().policy().display());
        let existing = self
            .runner()
            .try_capture(&Cmd::aws().args(["iam", "get-policy", "--policy-arn", arn]))
            .await?;

        if existing.is_some_and(|out| out.contains("Policy")) {
            info!("Policy {} exists, pushing a new version", POLICY_NAME);
            let versions = self
                .runner()
                .try_capture(
                    &Cmd::aws()
                        .args(["iam", "list-policy-versions", "--policy-arn", arn])
                        .args([
                            "--query",
                            "Versions[?IsDefaultVersion==`false`].VersionId",
                            "--output",
                            "text",
                        ]),
                )
                .await?
                .unwrap_or_default();

            if let Some(oldest) = policy::version_to_evict(&versions) {
                info!("Deleting policy version {} to stay under the version cap", oldest);
                self.runner()
                    .try_run(
                        &Cmd::aws()
                            .args(["iam", "delete-policy-version", "--policy-arn", arn])
                            .args(["--version-id", &oldest]),
                    )
                    .await?;
            }

            self.runner()
                .check(
                    &Cmd::aws()
                        .args(["iam", "create-policy-version", "--policy-arn", arn])
                        .args(["--policy-document", &document, "--set-as-default"]),
                )
                .await
        } else {
            info!("Creating policy {}", POLICY_NAME);
            self.runner()
                .check(
                    &Cmd::aws()
                        .args(["iam", "create-policy", "--policy-name", POLICY_NAME])
                        .args(["--policy-document", &document]),
                )
                .await
        }
    }

    pub(crate) async fn add_chart_repo(&self, name: &str, url: &str) -> Result<()> {
        self.runner()
            .check(&Cmd::helm().args(["repo", "add", name, url, "--force-update"]))
            .await?;
        self.runner().check(&Cmd::helm().args(["repo", "update"])).await
    }

    pub(crate) fn controller_restart(&self) -> Cmd {
        Cmd::kubectl()
            .args(["rollout", "restart", "deployment", CONTROLLER_NAME])
            .args(["-n", KUBE_SYSTEM_NAMESPACE])
    }

    /// Poll until the admission webhook service has endpoint addresses.
    pub(crate) async fn webhook_endpoints_ready(&self, budget: PollBudget) -> Result<bool> {
        let endpoints = Cmd::kubectl()
            .args(["get", "endpoints", WEBHOOK_SERVICE, "-n", KUBE_SYSTEM_NAMESPACE])
            .args(["-o", "jsonpath={.subsets[*].addresses[*].ip}"]);
        let runner = self.runner();

        let outcome = poll_text(
            budget,
            "controller webhook endpoints",
            || runner.try_capture(&endpoints),
            |ips| !ips.trim().is_empty(),
        )
        .await?;

        if outcome.is_ready() {
            info!("Controller webhook is ready");
        }
        Ok(outcome.is_ready())
    }
}
