use crate::config::Config;
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Global flags shared across every subcommand.
//
//   -c / --config      Path to a config.toml file
//   -v / --verbose     Debug logging
//   --timeout          Per-channel wait ceiling in seconds
//   --prompt-file      Guidance prompt served by prompts/get
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.rustypush/config.toml)
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "RUSTYPUSH_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long, action = ArgAction::SetTrue, global = true)]
    pub verbose: bool,

    /// Per-channel send timeout in seconds
    #[arg(
        long = "timeout",
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub timeout_secs: Option<u64>,

    /// File holding the guidance prompt text
    #[arg(
        long,
        value_name = "PATH",
        env = "RUSTYPUSH_PROMPT_FILE",
        global = true
    )]
    pub prompt_file: Option<PathBuf>,
}

impl CommonArgs {
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone()
    }

    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(secs) = self.timeout_secs {
            config.broadcast.timeout_secs = secs;
        }

        if let Some(prompt) = &self.prompt_file {
            config.server.prompt_file = Some(prompt.clone());
        }
    }

    /// Load the config file, overlay the environment, then these flags.
    pub fn load_config(&self) -> Result<Config, crate::error::PushError> {
        let mut config = Config::resolve(self.config_path())?;
        self.apply_overrides(&mut config);
        Ok(config)
    }
}
