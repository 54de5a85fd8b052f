//! Command-line surface: default invocation starts the proxy; `config`
//! diagnoses the resolved configuration without starting the server.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// llm-relay - local LLM-protocol proxy and trajectory recorder
#[derive(Parser)]
#[command(name = "llm-relay")]
#[command(version = crate::config::VERSION)]
#[command(about = "Local Anthropic/OpenAI protocol proxy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the TOML config file (default: ~/.config/llm-relay/config.toml)
    #[arg(long, global = true)]
    pub cfg_file: Option<PathBuf>,

    /// Host to bind the proxy to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind the proxy to
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for trajectory logs
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose the resolved configuration
    Config {
        /// Print the effective, merged configuration
        #[arg(long)]
        show: bool,

        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle the `config` subcommand. Returns true if a command was handled
/// (caller should exit without starting the proxy).
pub fn handle_cli(cli: &Cli) -> bool {
    match &cli.command {
        Some(Commands::Config { show, path }) => {
            if *path {
                handle_config_path(cli);
            } else if *show {
                handle_config_show(cli);
            } else {
                println!("Usage: llm-relay config [--show|--path]");
            }
            true
        }
        None => false,
    }
}

fn handle_config_path(cli: &Cli) {
    let path = cli
        .cfg_file
        .clone()
        .or_else(Config::default_config_path);
    match path {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("error: could not determine config file path (no home directory)");
            std::process::exit(1);
        }
    }
}

fn handle_config_show(cli: &Cli) {
    match Config::load(
        cli.cfg_file.clone(),
        cli.host.clone(),
        cli.port,
        cli.log_dir.clone(),
    ) {
        Ok(config) => {
            println!("# effective configuration (cli > env > file > defaults)");
            println!("bind_addr = {:?}", config.bind_addr.to_string());
            println!("log_dir = {:?}", config.log_dir.display().to_string());
            println!("routes = {} configured", config.routes.len());
            for route in config.routes.iter() {
                println!(
                    "  - {} -> {} ({}) at {}",
                    route.name,
                    route.upstream_model,
                    route.upstream_protocol.as_str(),
                    route.upstream_base_url
                );
            }
        }
        Err(e) => {
            eprintln!("error loading configuration: {e:#}");
            std::process::exit(1);
        }
    }
}
