//! eksctl `ClusterConfig` for the managed cluster.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::Config;

const API_VERSION: &str = "eksctl.io/v1alpha5";
const KIND: &str = "ClusterConfig";

/// Availability zone slot suffixes, in subnet order.
const ZONE_SUFFIXES: [char; 3] = ['a', 'b', 'c'];

const VOLUME_TYPE: &str = "gp3";
const LOG_TYPES: [&str; 5] = [
    "api",
    "audit",
    "authenticator",
    "controllerManager",
    "scheduler",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTopology {
    pub api_version: String,
    pub kind: String,
    pub metadata: ClusterMetadata,
    pub vpc: VpcSpec,
    pub iam: ClusterIam,
    pub managed_node_groups: Vec<ManagedNodeGroup>,
    pub cloud_watch: CloudWatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMetadata {
    pub name: String,
    pub region: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VpcSpec {
    pub id: String,
    pub subnets: SubnetTiers,
}

/// Subnets keyed by availability zone, e.g. `us-east-1a`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetTiers {
    pub public: BTreeMap<String, SubnetRef>,
    pub private: BTreeMap<String, SubnetRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterIam {
    #[serde(rename = "withOIDC")]
    pub with_oidc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedNodeGroup {
    pub name: String,
    pub instance_type: String,
    pub desired_capacity: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub volume_size: u32,
    pub volume_type: String,
    pub private_networking: bool,
    pub subnets: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub iam: NodeGroupIam,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupIam {
    pub with_addon_policies: AddonPolicies,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonPolicies {
    pub auto_scaler: bool,
    pub alb_ingress: bool,
    pub cloud_watch: bool,
    pub ebs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWatch {
    pub cluster_logging: ClusterLogging,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogging {
    pub enable_types: Vec<String>,
}

fn zone_map(region: &str, subnets: &[String]) -> BTreeMap<String, SubnetRef> {
    ZONE_SUFFIXES
        .iter()
        .zip(subnets)
        .map(|(suffix, id)| (format!("{}{}", region, suffix), SubnetRef { id: id.clone() }))
        .collect()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build the cluster topology for `config`.
///
/// Subnets are mapped onto the `a`, `b` and `c` zones of the region in list
/// order. Nodes run in the private subnets only.
pub fn cluster_topology(config: &Config) -> ClusterTopology {
    let region = &config.aws.region;
    let eks = &config.eks;
    let sizing = eks.sizing();

    let node_group = ManagedNodeGroup {
        name: eks.node_group_name.clone(),
        instance_type: eks.instance_type.clone(),
        desired_capacity: sizing.desired,
        min_size: sizing.min,
        max_size: sizing.max,
        volume_size: sizing.volume_gib,
        volume_type: VOLUME_TYPE.to_string(),
        private_networking: true,
        subnets: config.vpc.private_subnets.clone(),
        labels: string_map(&[("role", "higress"), ("environment", "production")]),
        tags: string_map(&[("Name", "higress-node"), ("Environment", "production")]),
        iam: NodeGroupIam {
            with_addon_policies: AddonPolicies {
                auto_scaler: true,
                alb_ingress: true,
                cloud_watch: true,
                ebs: true,
            },
        },
    };

    ClusterTopology {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        metadata: ClusterMetadata {
            name: eks.cluster_name.clone(),
            region: region.clone(),
            version: eks.kubernetes_version.clone(),
        },
        vpc: VpcSpec {
            id: config.vpc.vpc_id.clone(),
            subnets: SubnetTiers {
                public: zone_map(region, &config.vpc.public_subnets),
                private: zone_map(region, &config.vpc.private_subnets),
            },
        },
        iam: ClusterIam { with_oidc: true },
        managed_node_groups: vec![node_group],
        cloud_watch: CloudWatch {
            cluster_logging: ClusterLogging {
                enable_types: LOG_TYPES.iter().map(|t| t.to_string()).collect(),
            },
        },
    }
}
