// bases/provisioner/src/args.rs
use crate::error::{ProvisionerError, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const APP_DIR: &str = ".config/solution-provisioner";

/// Provision cloud solutions described by solution files
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: ~/.config/solution-provisioner/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Directory opened solutions are copied into
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Use this bearer token instead of asking the Azure CLI
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Print every event, including progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a solution file, or reopen the last one
    Open { path: Option<PathBuf> },

    /// Provision a solution, or the last opened one
    Provision { path: Option<PathBuf> },

    /// Show the persisted settings
    Status,

    /// Show or change settings
    Config {
        /// Subscription resources are created in
        #[arg(long)]
        subscription: Option<String>,
    },

    /// Serve the current solution and live events over HTTP
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

/// Arguments with defaults filled in
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub cache_dir: PathBuf,
    pub token: Option<String>,
    pub verbose: bool,
    pub command: Command,
}

impl Config {
    pub fn from_args(args: Args, home: Option<PathBuf>) -> Result<Self> {
        let app_dir = home.map(|home| home.join(APP_DIR));

        let settings_path = match args.settings {
            Some(path) => path,
            None => app_dir
                .as_ref()
                .map(|dir| dir.join("settings.json"))
                .ok_or(ProvisionerError::NoHome("--settings"))?,
        };
        let cache_dir = match args.cache_dir {
            Some(path) => path,
            None => app_dir
                .as_ref()
                .map(|dir| dir.join("solutions"))
                .ok_or(ProvisionerError::NoHome("--cache-dir"))?,
        };

        Ok(Self {
            settings_path,
            cache_dir,
            token: args.token.filter(|token| !token.is_empty()),
            verbose: args.verbose,
            command: args.command,
        })
    }
}
