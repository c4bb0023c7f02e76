//! Helm values for the gateway release.
//!
//! Two exposure modes are supported. With `higress.use_alb` the gateway is a
//! NodePort service on fixed ports that an ALB targets by instance; otherwise
//! the chart's service becomes an NLB-backed `LoadBalancer`.

use serde_json::{json, Value};

use crate::config::{Config, HigressConfig};
use crate::{GATEWAY_SERVICE, HTTPS_NODE_PORT, HTTP_NODE_PORT};

/// Anti-affinity spreads gateway pods across hosts.
const TOPOLOGY_KEY: &str = "kubernetes.io/hostname";
const MIN_AVAILABLE: u32 = 2;
const TARGET_CPU_PERCENT: u32 = 70;
const TARGET_MEMORY_PERCENT: u32 = 80;

const PROMETHEUS_STORAGE: &str = "20Gi";
const GRAFANA_STORAGE: &str = "10Gi";
const LOKI_STORAGE: &str = "20Gi";

/// Build the values document for `config`.
///
/// Object keys serialize in sorted order, so the rendered YAML is stable.
pub fn application_values(config: &Config) -> Value {
    let higress = &config.higress;
    let mut values = if higress.use_alb {
        node_port_values(higress)
    } else {
        load_balancer_values(higress)
    };

    // the console, and with it the o11y stack, only ships in NodePort mode
    if higress.use_alb && higress.enable_monitoring {
        values["higress-console"]["o11y"] = observability();
    }
    values
}

fn global(higress: &HigressConfig) -> Value {
    json!({
        "local": false,
        "o11y": { "enabled": higress.enable_monitoring }
    })
}

fn gateway_resources(higress: &HigressConfig) -> Value {
    json!({
        "requests": { "cpu": higress.cpu_request, "memory": higress.memory_request },
        "limits": { "cpu": higress.cpu_limit, "memory": higress.memory_limit }
    })
}

fn node_port_values(higress: &HigressConfig) -> Value {
    json!({
        "global": global(higress),
        "higress-core": {
            "gateway": {
                "replicas": higress.replicas,
                "resources": gateway_resources(higress),
                "service": {
                    "type": "NodePort",
                    "ports": [
                        { "name": "http", "port": 80, "targetPort": 80, "nodePort": HTTP_NODE_PORT },
                        { "name": "https", "port": 443, "targetPort": 443, "nodePort": HTTPS_NODE_PORT }
                    ]
                },
                "affinity": {
                    "podAntiAffinity": {
                        "requiredDuringSchedulingIgnoredDuringExecution": [{
                            "labelSelector": {
                                "matchExpressions": [{
                                    "key": "app",
                                    "operator": "In",
                                    "values": [GATEWAY_SERVICE]
                                }]
                            },
                            "topologyKey": TOPOLOGY_KEY
                        }]
                    }
                },
                "podDisruptionBudget": { "enabled": true, "minAvailable": MIN_AVAILABLE },
                "autoscaling": {
                    "enabled": higress.enable_autoscaling,
                    "minReplicas": higress.min_replicas,
                    "maxReplicas": higress.max_replicas,
                    "targetCPUUtilizationPercentage": TARGET_CPU_PERCENT,
                    "targetMemoryUtilizationPercentage": TARGET_MEMORY_PERCENT
                }
            },
            "controller": {
                "replicas": 2,
                "resources": {
                    "requests": { "cpu": "500m", "memory": "1Gi" },
                    "limits": { "cpu": "1000m", "memory": "2Gi" }
                }
            }
        },
        "higress-console": {
            "enabled": true,
            "replicas": 2,
            "service": { "type": "ClusterIP" },
            "resources": {
                "requests": { "cpu": "200m", "memory": "512Mi" },
                "limits": { "cpu": "500m", "memory": "1Gi" }
            }
        }
    })
}

fn load_balancer_values(higress: &HigressConfig) -> Value {
    json!({
        "global": global(higress),
        "higress-core": {
            "gateway": {
                "replicas": higress.replicas,
                "resources": gateway_resources(higress),
                "service": {
                    "type": "LoadBalancer",
                    "annotations": {
                        "service.beta.kubernetes.io/aws-load-balancer-type": "nlb",
                        "service.beta.kubernetes.io/aws-load-balancer-scheme": "internet-facing",
                        "service.beta.kubernetes.io/aws-load-balancer-cross-zone-load-balancing-enabled": "true"
                    }
                }
            }
        }
    })
}

/// Persistent metrics, dashboards and log storage bundled with the console.
fn observability() -> Value {
    json!({
        "enabled": true,
        "prometheus": { "persistence": { "enabled": true, "size": PROMETHEUS_STORAGE } },
        "grafana": { "persistence": { "enabled": true, "size": GRAFANA_STORAGE } },
        "loki": { "persistence": { "enabled": true, "size": LOKI_STORAGE } }
    })
}
