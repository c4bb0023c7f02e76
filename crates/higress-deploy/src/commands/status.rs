//! Status command

use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::{Result, HIGRESS_NAMESPACE};

impl Deployer {
    /// Print cluster, node and release state. Every query is best effort.
    pub async fn report_status(&self) -> Result<()> {
        let sections = [
            (
                "EKS cluster",
                Cmd::eksctl()
                    .args(["get", "cluster", "--name", self.cluster_name()])
                    .args(["--region", self.region()]),
            ),
            ("Nodes", Cmd::kubectl().args(["get", "nodes"])),
            (
                "Higress pods",
                Cmd::kubectl().args(["get", "pods", "-n", HIGRESS_NAMESPACE]),
            ),
            (
                "Higress services",
                Cmd::kubectl().args(["get", "svc", "-n", HIGRESS_NAMESPACE]),
            ),
            (
                "Ingress",
                Cmd::kubectl().args(["get", "ingress", "-n", HIGRESS_NAMESPACE]),
            ),
        ];

        for (title, cmd) in &sections {
            println!("\n== {} ==", title);
            if !self.runner().try_run(cmd).await? {
                println!("(unavailable)");
            }
        }

        let hostname = match self.ingress_hostname().await? {
            Some(host) => Some(host),
            None => std::fs::read_to_string(self.paths().endpoint())
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        };
        if let Some(host) = hostname {
            println!("\n== Endpoint ==");
            println!("ALB DNS: {}", host);
            println!("HTTP:    http://{}", host);
            if self.config().alb.certificate().is_some() {
                println!("HTTPS:   https://{}", host);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config;
    use crate::testing::{deployer, FakeRunner};
    use std::sync::Arc;

    #[tokio::test]
    async fn failing_queries_do_not_fail_status() {
        let runner = Arc::new(FakeRunner::new().fail("eksctl get cluster").fail("kubectl"));
        let d = deployer(config::sample(), runner.clone());

        d.report_status().await.unwrap();
        assert_eq!(runner.count("kubectl get"), 5);
        assert_eq!(runner.count("eksctl get cluster --name higress-prod --region us-east-1"), 1);
    }
}
