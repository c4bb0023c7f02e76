//! Create command - provision the EKS cluster
//!
//! 1. Check that the external CLIs are installed
//! 2. Tag the subnets for load balancer discovery (best effort)
//! 3. Create the cluster from the generated topology
//! 4. List the nodes to confirm the cluster answers

use tracing::{info, warn};

use crate::deployer::Deployer;
use crate::exec::{Cmd, RunnerExt};
use crate::Result;

const PUBLIC_ROLE_TAG: &str = "kubernetes.io/role/elb";
const PRIVATE_ROLE_TAG: &str = "kubernetes.io/role/internal-elb";

impl Deployer {
    pub async fn create_cluster(&self) -> Result<()> {
        info!("[Phase 1] Checking prerequisites...");
        self.check_prerequisites().await?;

        info!("[Phase 2] Tagging subnets...");
        self.tag_subnets().await?;

        info!("[Phase 3] Creating EKS cluster {} (this takes 15-20 minutes)...", self.cluster_name());
        self.regenerate_descriptors()?;
        let topology = self.paths().cluster_topology();
        self.runner()
            .check(
                &Cmd::eksctl()
                    .args(["create", "cluster", "-f"])
                    .arg(topology.display().to_string()),
            )
            .await?;

        info!("[Phase 4] Verifying nodes...");
        self.runner().check(&Cmd::kubectl().args(["get", "nodes"])).await?;

        info!("EKS cluster {} created", self.cluster_name());
        Ok(())
    }

    /// Tag public subnets for internet-facing and private subnets for
    /// internal load balancers. Failures are logged and skipped.
    async fn tag_subnets(&self) -> Result<()> {
        let cluster_tag = format!("Key=kubernetes.io/cluster/{},Value=shared", self.cluster_name());
        let vpc = &self.config().vpc;
        let tiers = [
            (PUBLIC_ROLE_TAG, &vpc.public_subnets),
            (PRIVATE_ROLE_TAG, &vpc.private_subnets),
        ];

        for (role_tag, subnets) in tiers {
            for subnet in subnets {
                info!("Tagging subnet {} with {}", subnet, role_tag);
                let cmd = Cmd::aws()
                    .args(["ec2", "create-tags", "--resources"])
                    .arg(subnet)
                    .arg("--tags")
                    .arg(format!("Key={},Value=1", role_tag))
                    .arg(&cluster_tag)
                    .args(["--region", self.region()]);
                if !self.runner().try_run(&cmd).await? {
                    warn!("Failed to tag subnet {}; load balancer discovery may not find it", subnet);
                }
            }
        }
        Ok(())
    }
}
