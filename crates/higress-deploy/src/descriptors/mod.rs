//! Declarative descriptors derived from [`Config`].
//!
//! Three files are generated: the eksctl cluster topology, the Helm values
//! for the gateway release, and the ALB ingress manifest. Each is a pure
//! function of the configuration and serializes with a fixed field order, so
//! the same configuration always produces byte-identical files. They are
//! rewritten at the start of every run and never edited by hand.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::Result;

pub mod cluster;
pub mod ingress;
pub mod values;

pub use cluster::cluster_topology;
pub use ingress::ingress_descriptor;
pub use values::application_values;

const CLUSTER_TOPOLOGY_FILE: &str = "eks-cluster-config.yaml";
const VALUES_FILE: &str = "higress-values.yaml";
const INGRESS_FILE: &str = "higress-alb-ingress.yaml";
const POLICY_FILE: &str = "iam-policy.json";
const ENDPOINT_FILE: &str = "alb-endpoint.txt";

/// Locations of generated artifacts, rooted at the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cluster_topology(&self) -> PathBuf {
        self.dir.join(CLUSTER_TOPOLOGY_FILE)
    }

    pub fn values(&self) -> PathBuf {
        self.dir.join(VALUES_FILE)
    }

    pub fn ingress(&self) -> PathBuf {
        self.dir.join(INGRESS_FILE)
    }

    /// Augmented controller policy document.
    pub fn policy(&self) -> PathBuf {
        self.dir.join(POLICY_FILE)
    }

    /// Hostname of the provisioned load balancer.
    pub fn endpoint(&self) -> PathBuf {
        self.dir.join(ENDPOINT_FILE)
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Serialize a descriptor to YAML.
pub fn to_yaml<T: Serialize>(descriptor: &T) -> Result<String> {
    Ok(serde_yaml::to_string(descriptor)?)
}

pub fn render_cluster_topology(config: &Config) -> Result<String> {
    to_yaml(&cluster_topology(config))
}

pub fn render_application_values(config: &Config) -> Result<String> {
    to_yaml(&application_values(config))
}

pub fn render_ingress(config: &Config) -> Result<String> {
    to_yaml(&ingress_descriptor(config))
}

/// Regenerate all three descriptors into `paths`.
pub fn write_all(config: &Config, paths: &ArtifactPaths) -> Result<()> {
    std::fs::create_dir_all(paths.dir())?;

    let outputs = [
        (paths.cluster_topology(), render_cluster_topology(config)?),
        (paths.values(), render_application_values(config)?),
        (paths.ingress(), render_ingress(config)?),
    ];
    for (path, contents) in outputs {
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "Wrote descriptor");
    }

    info!(
        "Regenerated descriptors in {}",
        paths.dir().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn write_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("out"));
        let config = config::sample();

        write_all(&config, &paths).unwrap();
        let first: Vec<String> = [paths.cluster_topology(), paths.values(), paths.ingress()]
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();

        write_all(&config, &paths).unwrap();
        let second: Vec<String> = [paths.cluster_topology(), paths.values(), paths.ingress()]
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn regeneration_tracks_config_changes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let mut config = config::sample();

        write_all(&config, &paths).unwrap();
        let before = std::fs::read_to_string(paths.ingress()).unwrap();

        config.alb.certificate_arn = "arn:aws:acm:us-east-1:123:certificate/abc".to_string();
        write_all(&config, &paths).unwrap();
        let after = std::fs::read_to_string(paths.ingress()).unwrap();

        assert_ne!(before, after);
        assert!(after.contains("certificate/abc"));
    }

    #[test]
    fn artifact_paths_are_rooted_in_workdir() {
        let paths = ArtifactPaths::new("/tmp/work");
        assert_eq!(paths.values(), PathBuf::from("/tmp/work/higress-values.yaml"));
        assert_eq!(paths.endpoint(), PathBuf::from("/tmp/work/alb-endpoint.txt"));
        assert_eq!(ArtifactPaths::default().dir(), Path::new("."));
    }
}
