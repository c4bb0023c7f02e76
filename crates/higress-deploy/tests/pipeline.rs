//! Offline checks of the public API: configuration in, descriptors and
//! command sequences out. No AWS or cluster access is needed.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use higress_deploy::config;
use higress_deploy::deployer::Deployer;
use higress_deploy::descriptors::{self, ArtifactPaths};
use higress_deploy::exec::{Cmd, CommandRunner};
use higress_deploy::http::HttpClient;
use higress_deploy::prompt::Prompt;
use higress_deploy::{Error, Result};

const CONFIG: &str = r#"
aws:
  region: eu-west-1
  account_id: "210987654321"
vpc:
  vpc_id: vpc-0f00
  public_subnets: [subnet-p1, subnet-p2, subnet-p3]
  private_subnets: [subnet-q1, subnet-q2, subnet-q3]
eks:
  cluster_name: edge
  kubernetes_version: "1.30"
  node_group_name: edge-nodes
  instance_type: c6i.2xlarge
  desired_capacity: 4
  min_size: 3
  max_size: 8
  volume_size: 120
alb:
  certificate_arn: arn:aws:acm:eu-west-1:210987654321:certificate/abcd
"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

fn yaml(path: &Path) -> serde_yaml::Value {
    serde_yaml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn config_file_produces_all_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    let config = config::load(&write_config(dir.path())).unwrap();
    assert!(config::validate(&config).is_empty());

    let paths = ArtifactPaths::new(dir.path().join("out"));
    descriptors::write_all(&config, &paths).unwrap();

    let topology = yaml(&paths.cluster_topology());
    assert_eq!(topology["metadata"]["name"], "edge");
    assert_eq!(topology["metadata"]["region"], "eu-west-1");
    assert_eq!(topology["metadata"]["version"], "1.30");

    let values = yaml(&paths.values());
    assert_eq!(values["higress-core"]["gateway"]["service"]["type"], "NodePort");

    let ingress = yaml(&paths.ingress());
    let annotations = &ingress["metadata"]["annotations"];
    assert_eq!(
        annotations["alb.ingress.kubernetes.io/listen-ports"],
        r#"[{"HTTP": 80}, {"HTTPS": 443}]"#
    );
    assert_eq!(
        annotations["alb.ingress.kubernetes.io/certificate-arn"],
        "arn:aws:acm:eu-west-1:210987654321:certificate/abcd"
    );
}

#[test]
fn regeneration_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = config::load(&write_config(dir.path())).unwrap();
    let paths = ArtifactPaths::new(dir.path());

    descriptors::write_all(&config, &paths).unwrap();
    let first = std::fs::read(paths.ingress()).unwrap();
    descriptors::write_all(&config, &paths).unwrap();
    assert_eq!(std::fs::read(paths.ingress()).unwrap(), first);
}

#[test]
fn incomplete_config_reports_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "aws:\n  region: eu-west-1\nvpc:\n  public_subnets: [subnet-p1]\n").unwrap();

    let config = config::load(&path).unwrap();
    let errors = config::validate(&config);
    let report = config::validation_report(&config, &errors);
    assert!(report.contains("vpc.vpc_id"));
    assert!(report.contains("vpc.public_subnets must list exactly 3 subnets, found 1"));
    assert!(report.contains("eks.cluster_name"));
}

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &Cmd, _fail_on_error: bool, _capture: bool) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(cmd.to_string());
        Ok(Some(String::new()))
    }
}

struct Offline;

#[async_trait]
impl HttpClient for Offline {
    async fn get_text(&self, url: &str) -> Result<String> {
        Err(Error::Other(format!("offline: {}", url)))
    }

    async fn probe(&self, url: &str) -> Result<u16> {
        Err(Error::Other(format!("offline: {}", url)))
    }
}

struct Answer(&'static str);

#[async_trait]
impl Prompt for Answer {
    async fn ask(&self, _question: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

fn deployer(dir: &Path, runner: Arc<RecordingRunner>, answer: &'static str) -> Deployer {
    let config = config::load(&write_config(dir)).unwrap();
    Deployer::with_backends(
        config,
        ArtifactPaths::new(dir),
        runner,
        Arc::new(Offline),
        Arc::new(Answer(answer)),
    )
}

#[tokio::test(start_paused = true)]
async fn application_teardown_keeps_the_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let d = deployer(dir.path(), runner.clone(), "y");

    d.teardown_application(false).await.unwrap();

    let calls = runner.calls.lock().unwrap();
    assert!(calls.iter().any(|c| c == "helm uninstall higress -n higress-system"));
    assert!(calls.iter().all(|c| !c.starts_with("eksctl")));
}

#[tokio::test(start_paused = true)]
async fn cluster_teardown_requires_the_exact_name() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let d = deployer(dir.path(), runner.clone(), "edge-typo");

    assert!(matches!(
        d.teardown_cluster(false).await,
        Err(Error::Aborted { .. })
    ));
    assert!(runner.calls.lock().unwrap().is_empty());
}
