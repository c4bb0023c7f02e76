//! Deployment configuration loaded from `config.yaml`.
//!
//! The file is the single source of truth for a run. It is parsed once into an
//! immutable [`Config`] and handed to every step by reference.
//!
//! Every field is defaulted during deserialization so that an incomplete file
//! still parses; [`validate`] then reports every missing or inconsistent value
//! at once instead of stopping at the first one.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::policy::AugmentScope;
use crate::{Error, Result};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Account id written by `init`; treated as unset.
pub const ACCOUNT_ID_PLACEHOLDER: &str = "YOUR_AWS_ACCOUNT_ID";

/// Number of availability zone slots the topology maps subnets onto.
pub const SUBNETS_PER_TIER: usize = 3;

/// Baseline IAM policy published by the load balancer controller project.
pub const DEFAULT_POLICY_URL: &str = "https://raw.githubusercontent.com/kubernetes-sigs/aws-load-balancer-controller/v2.7.0/docs/install/iam_policy.json";

/// Root of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aws: AwsConfig,
    pub vpc: VpcConfig,
    pub eks: EksConfig,
    pub higress: HigressConfig,
    pub alb: AlbConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    /// Skips the STS lookup when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcConfig {
    pub vpc_id: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EksConfig {
    pub cluster_name: String,
    /// Must be a quoted string; an unquoted `1.30` would read as `1.3`.
    #[serde(deserialize_with = "version_string")]
    pub kubernetes_version: String,
    pub node_group_name: String,
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u32>,
}

/// Resolved node group sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeGroupSizing {
    pub min: u32,
    pub desired: u32,
    pub max: u32,
    pub volume_gib: u32,
}

impl EksConfig {
    /// Sizing with absent values read as zero. Only meaningful after [`validate`].
    pub fn sizing(&self) -> NodeGroupSizing {
        NodeGroupSizing {
            min: self.min_size.unwrap_or_default(),
            desired: self.desired_capacity.unwrap_or_default(),
            max: self.max_size.unwrap_or_default(),
            volume_gib: self.volume_size.unwrap_or_default(),
        }
    }
}

/// Gateway release settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HigressConfig {
    /// `true` exposes the gateway through an ALB on fixed node ports,
    /// `false` through an NLB-backed LoadBalancer service.
    pub use_alb: bool,
    pub replicas: u32,
    pub cpu_request: String,
    pub memory_request: String,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub enable_autoscaling: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub enable_monitoring: bool,
}

impl Default for HigressConfig {
    fn default() -> Self {
        Self {
            use_alb: true,
            replicas: 3,
            cpu_request: "1000m".to_string(),
            memory_request: "2Gi".to_string(),
            cpu_limit: "2000m".to_string(),
            memory_limit: "4Gi".to_string(),
            enable_autoscaling: true,
            min_replicas: 3,
            max_replicas: 10,
            enable_monitoring: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbConfig {
    /// ACM certificate ARN; blank means HTTP only.
    pub certificate_arn: String,
    pub policy_url: String,
    pub augment_scope: AugmentScope,
}

impl Default for AlbConfig {
    fn default() -> Self {
        Self {
            certificate_arn: String::new(),
            policy_url: DEFAULT_POLICY_URL.to_string(),
            augment_scope: AugmentScope::default(),
        }
    }
}

impl AlbConfig {
    /// The certificate ARN if one is configured.
    pub fn certificate(&self) -> Option<&str> {
        let arn = self.certificate_arn.trim();
        (!arn.is_empty()).then_some(arn)
    }
}

impl Config {
    /// Account id from the file, ignoring blanks and the scaffold placeholder.
    pub fn explicit_account_id(&self) -> Option<&str> {
        self.aws
            .account_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != ACCOUNT_ID_PLACEHOLDER)
    }

    /// Scaffold written by `init`.
    pub fn template() -> Self {
        Config {
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                account_id: Some(ACCOUNT_ID_PLACEHOLDER.to_string()),
            },
            vpc: VpcConfig {
                vpc_id: "vpc-xxxxxxxxx".to_string(),
                public_subnets: (1..=3)
                    .map(|i| format!("subnet-public-{}-xxxxxxxxx", i))
                    .collect(),
                private_subnets: (1..=3)
                    .map(|i| format!("subnet-private-{}-xxxxxxxxx", i))
                    .collect(),
            },
            eks: EksConfig {
                cluster_name: "higress-prod".to_string(),
                kubernetes_version: "1.29".to_string(),
                node_group_name: "higress-nodes".to_string(),
                instance_type: "c6i.xlarge".to_string(),
                desired_capacity: Some(3),
                min_size: Some(3),
                max_size: Some(6),
                volume_size: Some(100),
            },
            higress: HigressConfig::default(),
            alb: AlbConfig::default(),
        }
    }
}

fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::Number(n) => Err(serde::de::Error::custom(format!(
            "kubernetes_version {} is a number; quote the version (e.g. \"1.30\")",
            n
        ))),
        other => Err(serde::de::Error::custom(format!(
            "expected a version string, found {:?}",
            other
        ))),
    }
}

/// Load and parse the configuration file.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let data = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&data).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `config` to YAML and write it to `path`.
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let data = serde_yaml::to_string(config)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// A single configuration problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{key} is missing or empty")]
    Missing { key: String },

    #[error("{key} must list exactly {expected} subnets, found {found}")]
    SubnetCount {
        key: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("eks.min_size ({min}) must not exceed eks.max_size ({max})")]
    MinExceedsMax { min: u32, max: u32 },

    #[error("eks.desired_capacity ({desired}) must be between eks.min_size ({min}) and eks.max_size ({max})")]
    DesiredOutOfRange { desired: u32, min: u32, max: u32 },

    #[error("higress.min_replicas ({min}) must not exceed higress.max_replicas ({max})")]
    ReplicaBounds { min: u32, max: u32 },
}

/// Check `config` and return every problem found. An empty list means valid.
pub fn validate(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let required = [
        ("aws.region", &config.aws.region),
        ("vpc.vpc_id", &config.vpc.vpc_id),
        ("eks.cluster_name", &config.eks.cluster_name),
        ("eks.kubernetes_version", &config.eks.kubernetes_version),
        ("eks.node_group_name", &config.eks.node_group_name),
        ("eks.instance_type", &config.eks.instance_type),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            errors.push(ValidationError::Missing {
                key: key.to_string(),
            });
        }
    }

    for (key, subnets) in [
        ("vpc.public_subnets", &config.vpc.public_subnets),
        ("vpc.private_subnets", &config.vpc.private_subnets),
    ] {
        if subnets.len() != SUBNETS_PER_TIER {
            errors.push(ValidationError::SubnetCount {
                key,
                expected: SUBNETS_PER_TIER,
                found: subnets.len(),
            });
        }
        for (i, subnet) in subnets.iter().enumerate() {
            if subnet.trim().is_empty() {
                errors.push(ValidationError::Missing {
                    key: format!("{}[{}]", key, i),
                });
            }
        }
    }

    let eks = &config.eks;
    let sizes = [
        ("eks.desired_capacity", eks.desired_capacity),
        ("eks.min_size", eks.min_size),
        ("eks.max_size", eks.max_size),
        ("eks.volume_size", eks.volume_size),
    ];
    for (key, value) in sizes {
        if value.is_none() {
            errors.push(ValidationError::Missing {
                key: key.to_string(),
            });
        }
    }

    if let (Some(min), Some(desired), Some(max)) =
        (eks.min_size, eks.desired_capacity, eks.max_size)
    {
        if min > max {
            errors.push(ValidationError::MinExceedsMax { min, max });
        }
        if desired < min || desired > max {
            errors.push(ValidationError::DesiredOutOfRange { desired, min, max });
        }
    }

    let higress = &config.higress;
    if higress.enable_autoscaling && higress.min_replicas > higress.max_replicas {
        errors.push(ValidationError::ReplicaBounds {
            min: higress.min_replicas,
            max: higress.max_replicas,
        });
    }

    errors
}

/// Human-readable result of [`validate`], echoing the key settings.
pub fn validation_report(config: &Config, errors: &[ValidationError]) -> String {
    let mut out = String::new();
    if errors.is_empty() {
        let sizing = config.eks.sizing();
        out.push_str("Configuration is valid\n");
        out.push_str(&format!("  Cluster:  {}\n", config.eks.cluster_name));
        out.push_str(&format!("  Region:   {}\n", config.aws.region));
        out.push_str(&format!(
            "  Nodes:    min {} / desired {} / max {} ({})\n",
            sizing.min, sizing.desired, sizing.max, config.eks.instance_type
        ));
    } else {
        out.push_str(&format!("Found {} configuration error(s):\n", errors.len()));
        for error in errors {
            out.push_str(&format!("  - {}\n", error));
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn sample() -> Config {
    let mut config = Config::template();
    config.aws.account_id = Some("123456789012".to_string());
    config.vpc.vpc_id = "vpc-0abc".to_string();
    config.vpc.public_subnets = vec!["subnet-pub-a".into(), "subnet-pub-b".into(), "subnet-pub-c".into()];
    config.vpc.private_subnets = vec!["subnet-prv-a".into(), "subnet-prv-b".into(), "subnet-prv-c".into()];
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
aws:
  region: us-west-2
vpc:
  vpc_id: vpc-123
  public_subnets: [subnet-a, subnet-b, subnet-c]
  private_subnets: [subnet-d, subnet-e, subnet-f]
eks:
  cluster_name: gw
  kubernetes_version: "1.29"
  node_group_name: gw-nodes
  instance_type: m6i.xlarge
  desired_capacity: 3
  min_size: 3
  max_size: 6
  volume_size: 80
alb:
  certificate_arn: "  "
"#;

    #[test]
    fn parses_full_config_with_defaults() {
        let config: Config = serde_yaml::from_str(FULL).unwrap();
        assert_eq!(config.aws.region, "us-west-2");
        assert_eq!(config.eks.kubernetes_version, "1.29");
        assert_eq!(config.eks.sizing().volume_gib, 80);
        assert!(config.higress.use_alb);
        assert_eq!(config.higress.max_replicas, 10);
        assert_eq!(config.alb.policy_url, DEFAULT_POLICY_URL);
        assert_eq!(config.alb.augment_scope, AugmentScope::FirstMatch);
        assert!(config.alb.certificate().is_none());
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn load_reports_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "eks: [unclosed").unwrap();
        assert!(matches!(load(&path).unwrap_err(), Error::ConfigParse { .. }));

        std::fs::write(&path, "eks:\n  min_size: three\n").unwrap();
        assert!(matches!(load(&path).unwrap_err(), Error::ConfigParse { .. }));
    }

    #[test]
    fn unquoted_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        std::fs::write(&path, "eks:\n  kubernetes_version: 1.30\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("quote the version"), "{err}");

        std::fs::write(&path, "eks:\n  kubernetes_version: \"1.30\"\n").unwrap();
        assert_eq!(load(&path).unwrap().eks.kubernetes_version, "1.30");
    }

    #[test]
    fn save_then_load_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save(&Config::template(), &path).unwrap();
        assert_eq!(load(&path).unwrap(), Config::template());
    }

    #[test]
    fn min_above_max_is_reported() {
        let mut config = sample();
        config.eks.min_size = Some(5);
        config.eks.max_size = Some(3);
        config.eks.desired_capacity = Some(4);

        let errors = validate(&config);
        assert!(errors.contains(&ValidationError::MinExceedsMax { min: 5, max: 3 }));
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("eks.min_size (5) must not exceed eks.max_size (3)")));
    }

    #[test]
    fn two_public_subnets_is_reported() {
        let mut config = sample();
        config.vpc.public_subnets.pop();

        let errors = validate(&config);
        assert_eq!(
            errors,
            vec![ValidationError::SubnetCount {
                key: "vpc.public_subnets",
                expected: 3,
                found: 2
            }]
        );
    }

    #[test]
    fn collects_every_missing_key() {
        let config: Config = serde_yaml::from_str("aws:\n  region: eu-west-1\n").unwrap();
        let errors = validate(&config);

        let missing: Vec<String> = errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::Missing { key } => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in [
            "vpc.vpc_id",
            "eks.cluster_name",
            "eks.kubernetes_version",
            "eks.node_group_name",
            "eks.instance_type",
            "eks.desired_capacity",
            "eks.min_size",
            "eks.max_size",
            "eks.volume_size",
        ] {
            assert!(missing.contains(&key.to_string()), "{} not reported", key);
        }
        assert!(!missing.contains(&"aws.region".to_string()));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::SubnetCount { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn blank_subnet_entry_is_reported() {
        let mut config = sample();
        config.vpc.private_subnets[1] = " ".to_string();
        assert_eq!(
            validate(&config),
            vec![ValidationError::Missing {
                key: "vpc.private_subnets[1]".to_string()
            }]
        );
    }

    #[test]
    fn replica_bounds_only_checked_with_autoscaling() {
        let mut config = sample();
        config.higress.min_replicas = 8;
        config.higress.max_replicas = 4;
        assert_eq!(
            validate(&config),
            vec![ValidationError::ReplicaBounds { min: 8, max: 4 }]
        );

        config.higress.enable_autoscaling = false;
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn valid_report_echoes_cluster_region_and_nodes() {
        let mut config = sample();
        config.eks.min_size = Some(3);
        config.eks.desired_capacity = Some(3);
        config.eks.max_size = Some(6);

        let errors = validate(&config);
        assert!(errors.is_empty());

        let report = validation_report(&config, &errors);
        assert!(report.contains("higress-prod"));
        assert!(report.contains("us-east-1"));
        assert!(report.contains("min 3 / desired 3 / max 6"));
    }

    #[test]
    fn explicit_account_id_ignores_placeholder() {
        let mut config = Config::template();
        assert!(config.explicit_account_id().is_none());
        config.aws.account_id = Some(" 111122223333 ".to_string());
        assert_eq!(config.explicit_account_id(), Some("111122223333"));
    }
}
