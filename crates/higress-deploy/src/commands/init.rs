//! Init command - write a configuration scaffold

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use crate::config::{self, Config};
use crate::prompt::{confirm, Prompt};
use crate::Result;

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Where to write the scaffold (defaults to the --config path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing file without asking
    #[arg(short, long)]
    pub force: bool,
}

pub async fn run(args: &InitArgs, config_path: &Path, prompt: &dyn Prompt) -> Result<()> {
    let output = args.output.as_deref().unwrap_or(config_path);

    if output.exists() && !args.force {
        let question = format!("Config file {} already exists. Overwrite?", output.display());
        if !confirm(prompt, &question).await? {
            println!("Aborted");
            return Ok(());
        }
    }

    config::save(&Config::template(), output)?;
    info!("Wrote configuration scaffold to {}", output.display());
    println!("Edit {} and fill in your AWS resources before running `create`.", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::MockPrompt;

    #[tokio::test]
    async fn writes_template_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("custom.yaml");
        let args = InitArgs {
            output: Some(output.clone()),
            force: false,
        };

        run(&args, Path::new("unused.yaml"), &MockPrompt::new()).await.unwrap();
        assert_eq!(config::load(&output).unwrap(), Config::template());
    }

    #[tokio::test]
    async fn declined_overwrite_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "keep: me\n").unwrap();

        let mut prompt = MockPrompt::new();
        prompt.expect_ask().times(1).returning(|_| Ok("n".to_string()));

        run(&InitArgs::default(), &path, &prompt).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep: me\n");
    }

    #[tokio::test]
    async fn force_overwrites_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "keep: me\n").unwrap();
        let args = InitArgs {
            output: None,
            force: true,
        };

        run(&args, &path, &MockPrompt::new()).await.unwrap();
        assert_eq!(config::load(&path).unwrap(), Config::template());
    }
}
