//! Install-all command - run every provisioning step in order
//!
//! Stops at the first fatal error. Steps that already completed are not
//! rolled back; rerunning a single step resumes from there.

use tracing::info;

use crate::deployer::Deployer;
use crate::Result;

const PHASES: usize = 6;

impl Deployer {
    pub async fn install_all(&self) -> Result<()> {
        info!("Installing Higress on EKS ({})", self.cluster_name());

        info!("[Phase 1/{}] Creating EKS cluster", PHASES);
        self.create_cluster().await?;

        info!("[Phase 2/{}] Installing EBS CSI driver", PHASES);
        self.install_ebs_csi().await?;

        info!("[Phase 3/{}] Installing AWS Load Balancer Controller", PHASES);
        self.install_alb_controller().await?;

        info!("[Phase 4/{}] Deploying Higress", PHASES);
        self.deploy_application().await?;

        info!("[Phase 5/{}] Creating load balancer", PHASES);
        self.create_load_balancer().await?;

        info!("[Phase 6/{}] Checking status", PHASES);
        self.report_status().await?;

        info!("Installation complete");
        Ok(())
    }
}
