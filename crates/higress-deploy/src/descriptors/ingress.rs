//! ALB ingress in front of the gateway's node ports.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::Config;
use crate::{GATEWAY_SERVICE, HIGRESS_NAMESPACE, HTTP_NODE_PORT, INGRESS_NAME};

const ANNOTATION_PREFIX: &str = "alb.ingress.kubernetes.io";
const INGRESS_CLASS: &str = "alb";
const SSL_POLICY: &str = "ELBSecurityPolicy-TLS-1-2-2017-01";
const RESOURCE_TAGS: &str = "Environment=production,Application=higress";

/// Listener opened on the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
    Http,
    Https,
}

impl Listener {
    pub fn port(self) -> u16 {
        match self {
            Listener::Http => 80,
            Listener::Https => 443,
        }
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Http => write!(f, "{{\"HTTP\": {}}}", self.port()),
            Listener::Https => write!(f, "{{\"HTTPS\": {}}}", self.port()),
        }
    }
}

/// Listeners for `config`: HTTPS is added only when a certificate is set.
pub fn listeners(config: &Config) -> Vec<Listener> {
    match config.alb.certificate() {
        Some(_) => vec![Listener::Http, Listener::Https],
        None => vec![Listener::Http],
    }
}

/// Value of the `listen-ports` annotation, e.g. `[{"HTTP": 80}]`.
pub fn listen_ports(listeners: &[Listener]) -> String {
    let entries: Vec<String> = listeners.iter().map(Listener::to_string).collect();
    format!("[{}]", entries.join(", "))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub api_version: String,
    pub kind: String,
    pub metadata: IngressMetadata,
    pub spec: IngressSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngressMetadata {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    pub ingress_class_name: String,
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngressRule {
    pub http: HttpRule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRule {
    pub paths: Vec<HttpPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpPath {
    pub path: String,
    pub path_type: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backend {
    pub service: ServiceBackend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceBackend {
    pub name: String,
    pub port: ServicePort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePort {
    pub number: u16,
}

impl Ingress {
    /// Annotation value by its short name, e.g. `listen-ports`.
    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.metadata
            .annotations
            .get(&format!("{}/{}", ANNOTATION_PREFIX, name))
            .map(String::as_str)
    }
}

/// Build the ingress for `config`.
///
/// The certificate ARN is the only switch for the listener set. Without one
/// the load balancer listens on HTTP only and carries no TLS annotations.
pub fn ingress_descriptor(config: &Config) -> Ingress {
    let listeners = listeners(config);
    let health_port = HTTP_NODE_PORT.to_string();

    let mut annotations: BTreeMap<String, String> = [
        ("scheme", "internet-facing".to_string()),
        ("target-type", "instance".to_string()),
        ("subnets", config.vpc.public_subnets.join(",")),
        ("healthcheck-path", "/".to_string()),
        ("healthcheck-port", health_port),
        ("healthcheck-protocol", "HTTP".to_string()),
        ("healthcheck-interval-seconds", "30".to_string()),
        ("healthcheck-timeout-seconds", "5".to_string()),
        ("healthy-threshold-count", "2".to_string()),
        ("unhealthy-threshold-count", "3".to_string()),
        ("listen-ports", listen_ports(&listeners)),
        ("tags", RESOURCE_TAGS.to_string()),
    ]
    .into_iter()
    .map(|(name, value)| (format!("{}/{}", ANNOTATION_PREFIX, name), value))
    .collect();

    if let Some(arn) = config.alb.certificate() {
        for (name, value) in [
            ("certificate-arn", arn),
            ("ssl-redirect", "443"),
            ("ssl-policy", SSL_POLICY),
        ] {
            annotations.insert(format!("{}/{}", ANNOTATION_PREFIX, name), value.to_string());
        }
    }

    Ingress {
        api_version: "networking.k8s.io/v1".to_string(),
        kind: "Ingress".to_string(),
        metadata: IngressMetadata {
            name: INGRESS_NAME.to_string(),
            namespace: HIGRESS_NAMESPACE.to_string(),
            annotations,
        },
        spec: IngressSpec {
            ingress_class_name: INGRESS_CLASS.to_string(),
            rules: vec![IngressRule {
                http: HttpRule {
                    paths: vec![HttpPath {
                        path: "/".to_string(),
                        path_type: "Prefix".to_string(),
                        backend: Backend {
                            service: ServiceBackend {
                                name: GATEWAY_SERVICE.to_string(),
                                port: ServicePort { number: 80 },
                            },
                        },
                    }],
                },
            }],
        },
    }
}
