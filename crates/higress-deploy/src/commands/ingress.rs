//! Create-lb command - provision the ALB through an ingress
//!
//! The ingress is recreated from scratch on every run. While the controller
//! provisions the load balancer its events are inspected; known fatal
//! failures abort with a targeted fix instead of waiting out the budget.

use std::time::Duration;

use tracing::{info, warn};

use crate::deployer::Deployer;
use crate::descriptors::ingress::{listen_ports, listeners};
use crate::error::FailureKind;
use crate::exec::{Cmd, RunnerExt};
use crate::poll::{poll_until, PollBudget, PollOutcome};
use crate::{Error, Result, CONTROLLER_NAME, HIGRESS_NAMESPACE, INGRESS_NAME, KUBE_SYSTEM_NAMESPACE};

pub const HOSTNAME_BUDGET: PollBudget = PollBudget::new(40, Duration::from_secs(10));
const RECREATE_SETTLE: Duration = Duration::from_secs(5);
const CONTROLLER_PICKUP: Duration = Duration::from_secs(15);
const WARMUP: Duration = Duration::from_secs(30);

/// Number of most recent events inspected per attempt.
const RECENT_EVENTS: usize = 5;

/// Event substrings that mean provisioning went wrong.
const FAILURE_MARKERS: [&str; 2] = ["faileddeploymodel", "error"];

const CERTIFICATE_HINT: &str = "Set alb.certificate_arn in the config file to an ACM certificate, \
     or leave it blank to serve HTTP only";
const PERMISSION_HINT: &str = "Run `higress-deploy fix-alb-permissions` (or re-run `install-alb`) \
     to refresh the controller IAM policy";

/// Recognised failures: event substring, kind, remediation.
const CLASSIFIED_FAILURES: [(&str, FailureKind, &str); 3] = [
    (
        "certificate must be specified",
        FailureKind::MissingCertificate,
        CERTIFICATE_HINT,
    ),
    ("not authorized", FailureKind::AuthorizationDenied, PERMISSION_HINT),
    ("access denied", FailureKind::AuthorizationDenied, PERMISSION_HINT),
];

/// Last `n` lines of `text`.
fn recent_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Whether `events` report a provisioning failure at all.
pub fn has_failure(events: &str) -> bool {
    let lower = events.to_lowercase();
    FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Match `events` against the known failures, case-insensitively.
pub fn classify_events(events: &str) -> Option<(FailureKind, &'static str)> {
    let lower = events.to_lowercase();
    CLASSIFIED_FAILURES
        .iter()
        .find(|(needle, _, _)| lower.contains(needle))
        .map(|(_, kind, hint)| (*kind, *hint))
}

impl Deployer {
    pub async fn create_load_balancer(&self) -> Result<()> {
        if !self.config().higress.use_alb {
            info!(
                "higress.use_alb is false; the gateway is exposed by its own LoadBalancer service"
            );
            return Ok(());
        }

        info!("Creating Application Load Balancer...");
        self.remove_existing_ingress().await?;

        self.regenerate_descriptors()?;
        let listeners = listeners(self.config());
        info!("Listeners: {}", listen_ports(&listeners));
        if self.config().alb.certificate().is_none() {
            info!("No certificate configured; set alb.certificate_arn to enable HTTPS");
        }
        self.runner()
            .check(
                &Cmd::kubectl()
                    .args(["apply", "-f"])
                    .arg(self.paths().ingress().display().to_string()),
            )
            .await?;

        info!("Waiting for the load balancer (this takes 3-5 minutes)...");
        self.settle(CONTROLLER_PICKUP, "the controller to pick up the ingress")
            .await;

        let outcome = poll_until(HOSTNAME_BUDGET, "load balancer hostname", move || async move {
            self.check_ingress_events().await?;
            self.ingress_hostname().await
        })
        .await?;

        match outcome {
            PollOutcome::Ready(hostname) => self.announce_endpoint(&hostname).await,
            PollOutcome::TimedOut { .. } => {
                warn!("Load balancer not ready after {:?}", HOSTNAME_BUDGET.max_wait());
                self.describe_ingress().await?;
                println!("Check:");
                println!(
                    "  1. Controller logs: kubectl logs -n {} deployment/{}",
                    KUBE_SYSTEM_NAMESPACE, CONTROLLER_NAME
                );
                println!("  2. Ingress events: kubectl get events -n {}", HIGRESS_NAMESPACE);
                println!("  3. Subnet tags for load balancer discovery");
                Ok(())
            }
        }
    }

    async fn remove_existing_ingress(&self) -> Result<()> {
        let existing = self
            .runner()
            .try_capture(&Cmd::kubectl().args(["get", "ingress", INGRESS_NAME, "-n", HIGRESS_NAMESPACE]))
            .await?;
        if existing.is_some_and(|out| out.contains(INGRESS_NAME)) {
            info!("Ingress {} exists, recreating it", INGRESS_NAME);
            self.runner()
                .try_run(&Cmd::kubectl().args(["delete", "ingress", INGRESS_NAME, "-n", HIGRESS_NAMESPACE]))
                .await?;
            self.settle(RECREATE_SETTLE, "ingress deletion").await;
        }
        Ok(())
    }

    /// Abort on a classified failure in the most recent ingress events.
    async fn check_ingress_events(&self) -> Result<()> {
        let events = self
            .runner()
            .try_capture(
                &Cmd::kubectl()
                    .args(["get", "events", "-n", HIGRESS_NAMESPACE])
                    .arg(format!("--field-selector=involvedObject.name={}", INGRESS_NAME))
                    .arg("--sort-by=.lastTimestamp"),
            )
            .await?
            .unwrap_or_default();
        let recent = recent_lines(&events, RECENT_EVENTS);
        if !has_failure(&recent) {
            return Ok(());
        }

        warn!("Load balancer provisioning reported errors:\n{}", recent);
        self.describe_ingress().await?;

        match classify_events(&recent) {
            Some((kind, hint)) => Err(Error::Remediation {
                kind,
                message: recent,
                hint: hint.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) async fn ingress_hostname(&self) -> Result<Option<String>> {
        Ok(self
            .runner()
            .try_capture(
                &Cmd::kubectl()
                    .args(["get", "ingress", INGRESS_NAME, "-n", HIGRESS_NAMESPACE])
                    .args(["-o", "jsonpath={.status.loadBalancer.ingress[0].hostname}"]),
            )
            .await?
            .filter(|host| !host.is_empty()))
    }

    async fn describe_ingress(&self) -> Result<()> {
        self.runner()
            .try_run(&Cmd::kubectl().args(["describe", "ingress", INGRESS_NAME, "-n", HIGRESS_NAMESPACE]))
            .await?;
        Ok(())
    }

    /// Print and persist the hostname, then probe it once.
    async fn announce_endpoint(&self, hostname: &str) -> Result<()> {
        info!("Load balancer ready: {}", hostname);
        println!("HTTP:  http://{}", hostname);
        if self.config().alb.certificate().is_some() {
            println!("HTTPS: https://{}", hostname);
        }

        std::fs::write(self.paths().endpoint(), hostname)?;
        info!("Hostname saved to {}", self.paths().endpoint().display());

        self.settle(WARMUP, "the load balancer to warm up").await;
        match self.http().probe(&format!("http://{}", hostname)).await {
            Ok(status) => println!("HTTP status: {}", status),
            Err(e) => warn!("Probe of {} failed: {}", hostname, e),
        }
        Ok(())
    }
}
