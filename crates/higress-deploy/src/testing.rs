//! Test doubles for workflow scenarios.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::Config;
use crate::deployer::Deployer;
use crate::descriptors::ArtifactPaths;
use crate::exec::{Cmd, CommandRunner};
use crate::http::MockHttpClient;
use crate::prompt::MockPrompt;
use crate::{Error, Result};

/// Canned outcome of a command.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail,
}

struct Rule {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// Scripted [`CommandRunner`].
///
/// The first rule whose pattern is a substring of the rendered command
/// answers it. A rule with several replies hands them out in order and then
/// keeps repeating the last one. Commands matching no rule succeed with
/// empty output. Every call is recorded.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Cmd>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, output: &str) -> Self {
        self.sequence(pattern, vec![Reply::Ok(output.to_string())])
    }

    pub fn fail(self, pattern: &str) -> Self {
        self.sequence(pattern, vec![Reply::Fail])
    }

    pub fn sequence(self, pattern: &str, replies: Vec<Reply>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            replies: replies.into(),
        });
        self
    }

    /// Rendered commands, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(Cmd::to_string)
            .collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    /// First recorded command matching `pattern`.
    pub fn find(&self, pattern: &str) -> Option<Cmd> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.to_string().contains(pattern))
            .cloned()
    }

    /// Index of the first call matching `pattern`.
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(pattern))
    }

    fn reply(&self, rendered: &str) -> Reply {
        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| rendered.contains(&r.pattern)) else {
            return Reply::Ok(String::new());
        };
        if rule.replies.len() > 1 {
            rule.replies.pop_front().unwrap()
        } else {
            rule.replies.front().cloned().unwrap_or(Reply::Ok(String::new()))
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, cmd: &Cmd, fail_on_error: bool, capture: bool) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(cmd.clone());
        match self.reply(&cmd.to_string()) {
            Reply::Ok(output) if capture => Ok(Some(output)),
            Reply::Ok(_) => Ok(Some(String::new())),
            Reply::Fail if fail_on_error => Err(Error::command_failed(cmd.to_string(), "scripted failure")),
            Reply::Fail => Ok(None),
        }
    }
}

/// A [`Deployer`] whose working directory is removed on drop.
pub struct TestDeployer {
    deployer: Deployer,
    _workdir: TempDir,
}

impl Deref for TestDeployer {
    type Target = Deployer;

    fn deref(&self) -> &Deployer {
        &self.deployer
    }
}

/// Deployer over `runner` with no HTTP or prompt expectations.
pub fn deployer(config: Config, runner: Arc<FakeRunner>) -> TestDeployer {
    deployer_with(config, runner, MockHttpClient::new(), MockPrompt::new())
}

pub fn deployer_with(
    config: Config,
    runner: Arc<FakeRunner>,
    http: MockHttpClient,
    prompt: MockPrompt,
) -> TestDeployer {
    let workdir = TempDir::new().unwrap();
    let deployer = Deployer::with_backends(
        config,
        ArtifactPaths::new(workdir.path()),
        runner,
        Arc::new(http),
        Arc::new(prompt),
    );
    TestDeployer {
        deployer,
        _workdir: workdir,
    }
}
