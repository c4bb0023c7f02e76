//! Deploy command - install the Higress release
//!
//! The release is installed once with `helm upgrade --install --wait`.
//! Gateway and controller readiness are then checked independently and only
//! warned about; a failed install is not retried.

use std::time::Duration;

use tracing::{info, warn};

use super::alb::WEBHOOK_SERVICE;
use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::poll::PollBudget;
use crate::{Result, CONTROLLER_NAME, HIGRESS_NAMESPACE, HIGRESS_RELEASE, KUBE_SYSTEM_NAMESPACE};

const CHART_REPO_NAME: &str = "higress.io";
const CHART_REPO_URL: &str = "https://higress.io/helm-charts";
const INSTALL_TIMEOUT: &str = "10m";

/// Webhook readiness before installing.
pub const WEBHOOK_DEPLOY_BUDGET: PollBudget = PollBudget::new(60, Duration::from_secs(1));
const RESTART_SETTLE: Duration = Duration::from_secs(20);

/// Workload labels checked after install.
const READY_LABELS: [&str; 2] = ["app=higress-gateway", "app=higress-controller"];
const READY_TIMEOUT: &str = "--timeout=300s";

impl Deployer {
    pub async fn deploy_application(&self) -> Result<()> {
        info!("Deploying Higress...");

        info!("[Step 1] Checking controller webhook...");
        self.ensure_webhook_ready().await?;

        info!("[Step 2] Preparing namespace and chart...");
        self.add_chart_repo(CHART_REPO_NAME, CHART_REPO_URL).await?;
        if !self
            .runner()
            .try_run(&Cmd::kubectl().args(["create", "namespace", HIGRESS_NAMESPACE]))
            .await?
        {
            info!("Namespace {} already exists", HIGRESS_NAMESPACE);
        }
        self.regenerate_descriptors()?;

        info!("[Step 3] Installing Higress (this takes 3-5 minutes)...");
        let install = Cmd::helm()
            .args(["upgrade", "--install", HIGRESS_RELEASE])
            .arg(format!("{}/{}", CHART_REPO_NAME, HIGRESS_RELEASE))
            .args(["-n", HIGRESS_NAMESPACE, "-f"])
            .arg(self.paths().values().display().to_string())
            .args(["--wait", "--timeout", INSTALL_TIMEOUT]);
        if let Err(e) = self.runner().check(&install).await {
            print_install_hints();
            return Err(e);
        }

        info!("[Step 4] Waiting for workloads...");
        for label in READY_LABELS {
            let wait = Cmd::kubectl()
                .args(["wait", "--for=condition=ready", "pod", "-l", label])
                .args(["-n", HIGRESS_NAMESPACE, READY_TIMEOUT]);
            if self.runner().try_run(&wait).await? {
                info!("Pods with {} are ready", label);
            } else {
                warn!("Pods with {} not ready yet, continuing", label);
            }
        }

        for resource in ["pods", "svc"] {
            self.runner()
                .try_run(&Cmd::kubectl().args(["get", resource, "-n", HIGRESS_NAMESPACE]))
                .await?;
        }

        info!("Higress deployed");
        Ok(())
    }

    /// Wait for the controller webhook, restarting the controller once if it
    /// does not come up. Never fails on a webhook that stays unready.
    async fn ensure_webhook_ready(&self) -> Result<()> {
        if self.webhook_ready().await? {
            return Ok(());
        }

        warn!("Webhook not ready, restarting {}...", CONTROLLER_NAME);
        self.runner().try_run(&self.controller_restart()).await?;
        self.settle(RESTART_SETTLE, "controller restart").await;

        if !self.webhook_ready().await? {
            warn!("Webhook still not ready, attempting install anyway");
        }
        Ok(())
    }

    /// Whether the webhook service exists and gets endpoints within budget.
    async fn webhook_ready(&self) -> Result<bool> {
        let service = self
            .runner()
            .try_capture(
                &Cmd::kubectl().args(["get", "service", WEBHOOK_SERVICE, "-n", KUBE_SYSTEM_NAMESPACE]),
            )
            .await?;
        if service.is_none() {
            warn!(
                "Webhook service {} not found; run `higress-deploy install-alb` first",
                WEBHOOK_SERVICE
            );
            return Ok(false);
        }
        self.webhook_endpoints_ready(WEBHOOK_DEPLOY_BUDGET).await
    }
}

fn print_install_hints() {
    println!("Higress installation failed. Troubleshooting:");
    println!("  1. Controller pods:");
    println!(
        "     kubectl get pods -n {} -l app.kubernetes.io/name={}",
        KUBE_SYSTEM_NAMESPACE, CONTROLLER_NAME
    );
    println!("  2. Controller logs:");
    println!("     kubectl logs -n {} deployment/{}", KUBE_SYSTEM_NAMESPACE, CONTROLLER_NAME);
    println!("  3. Webhook service and endpoints:");
    println!("     kubectl get svc,endpoints {} -n {}", WEBHOOK_SERVICE, KUBE_SYSTEM_NAMESPACE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::testing::{deployer, FakeRunner, Reply};
    use crate::Error;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn installs_once_and_checks_each_workload() {
        let runner = Arc::new(
            FakeRunner::new()
                .on("get endpoints", "10.0.2.7")
                .fail("app=higress-controller"),
        );
        let d = deployer(config::sample(), runner.clone());

        d.deploy_application().await.unwrap();

        assert_eq!(runner.count("helm upgrade --install higress higress.io/higress"), 1);
        assert_eq!(runner.count("helm uninstall"), 0);
        let install = runner.find("helm upgrade").unwrap();
        assert!(install.args.contains(&"--wait".to_string()));
        assert!(d.paths().values().exists());

        let gateway = runner.position("app=higress-gateway").unwrap();
        let controller = runner.position("app=higress-controller").unwrap();
        assert!(runner.position("helm upgrade").unwrap() < gateway && gateway < controller);
    }

    #[tokio::test(start_paused = true)]
    async fn unready_webhook_restarts_controller_once_then_proceeds() {
        let runner = Arc::new(FakeRunner::new().on("get endpoints", ""));
        let d = deployer(config::sample(), runner.clone());
        let start = Instant::now();

        d.deploy_application().await.unwrap();

        assert_eq!(runner.count("rollout restart"), 1);
        assert_eq!(
            runner.count("get endpoints"),
            2 * WEBHOOK_DEPLOY_BUDGET.max_attempts as usize
        );
        assert_eq!(
            start.elapsed(),
            WEBHOOK_DEPLOY_BUDGET.max_wait() * 2 + RESTART_SETTLE
        );
        assert_eq!(runner.count("helm upgrade"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_recovering_after_restart_skips_second_timeout() {
        let mut replies = vec![Reply::Ok(String::new()); 60];
        replies.push(Reply::Ok("10.0.2.7".into()));
        let runner = Arc::new(FakeRunner::new().sequence("get endpoints", replies));
        let d = deployer(config::sample(), runner.clone());

        d.deploy_application().await.unwrap();
        assert_eq!(runner.count("rollout restart"), 1);
        assert_eq!(runner.count("get endpoints"), 61);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_install_is_fatal() {
        let runner = Arc::new(
            FakeRunner::new()
                .on("get endpoints", "10.0.2.7")
                .fail("helm upgrade"),
        );
        let d = deployer(config::sample(), runner.clone());

        assert!(matches!(
            d.deploy_application().await,
            Err(Error::CommandFailed { .. })
        ));
        assert_eq!(runner.count("kubectl wait"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_webhook_service_restarts_controller_once() {
        let runner = Arc::new(FakeRunner::new().fail("get service aws-load-balancer-webhook-service"));
        let d = deployer(config::sample(), runner.clone());
        let start = Instant::now();

        d.deploy_application().await.unwrap();

        assert_eq!(runner.count("get service aws-load-balancer-webhook-service"), 2);
        assert_eq!(runner.count("rollout restart"), 1);
        assert_eq!(runner.count("get endpoints"), 0);
        assert_eq!(start.elapsed(), RESTART_SETTLE);
        assert_eq!(runner.count("helm upgrade"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_service_appearing_after_restart_is_awaited() {
        let runner = Arc::new(
            FakeRunner::new()
                .sequence(
                    "get service aws-load-balancer-webhook-service",
                    vec![Reply::Fail, Reply::Ok("aws-load-balancer-webhook-service".into())],
                )
                .on("get endpoints", "10.0.2.7"),
        );
        let d = deployer(config::sample(), runner.clone());

        d.deploy_application().await.unwrap();

        let restart = runner.position("rollout restart").unwrap();
        assert!(runner.position("get endpoints").unwrap() > restart);
        assert_eq!(runner.count("get endpoints"), 1);
    }
}
