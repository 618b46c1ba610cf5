// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-amd CLI - inspect how the AMD loader resolves and fetches modules

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_loader::{
    ConfigOptions, FileTransport, HttpTransport, Loader, NoScriptHost, VERSION,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "spacey-amd",
    about = "Inspect module resolution of the Spacey AMD loader",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Loader configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the base URL of the empty prefix
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Prefer `-dbg` source variants
    #[arg(long, global = true)]
    debug_sources: bool,

    /// Fetch over HTTP(S) below this URL instead of the file system
    #[arg(long, global = true, conflicts_with = "root")]
    server: Option<String>,

    /// Directory locations are resolved against
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show canonical names and locations of module identifiers
    Resolve {
        /// Module identifiers
        #[arg(required = true)]
        ids: Vec<String>,

        /// Resolve relative to this requesting module
        #[arg(long)]
        from: Option<String>,
    },

    /// Fetch module sources without executing them
    Fetch {
        /// Module identifiers
        #[arg(required = true)]
        ids: Vec<String>,

        /// Print the source text
        #[arg(long)]
        print: bool,
    },

    /// Print the effective loader configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("spacey_loader=debug,spacey_amd=debug")
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter("warn").init();
    }

    let loader = build_loader(&cli)?;
    match &cli.command {
        Command::Resolve { ids, from } => resolve(&loader, ids, from.as_deref()),
        Command::Fetch { ids, print } => fetch(&loader, ids, *print),
        Command::Config => {
            println!("{}", loader.config().to_json()?);
            Ok(())
        }
    }
}

/// Default configuration file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spacey-amd").join("loader.json"))
}

fn load_options(cli: &Cli) -> anyhow::Result<ConfigOptions> {
    let mut options = match &cli.config {
        Some(path) => ConfigOptions::from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => {
                tracing::debug!("using configuration {}", path.display());
                ConfigOptions::from_path(&path)?
            }
            None => ConfigOptions::new(),
        },
    };

    if let Some(base_url) = &cli.base_url {
        options.base_url = Some(base_url.clone());
    }
    if cli.debug_sources {
        options.debug_sources = Some(true);
    }
    Ok(options)
}

fn build_loader(cli: &Cli) -> anyhow::Result<Loader> {
    let options = load_options(cli)?;
    let loader = match &cli.server {
        Some(server) => {
            let transport = HttpTransport::new(server)?;
            Loader::with_options(transport, NoScriptHost, options)?
        }
        None => {
            let root = match &cli.root {
                Some(root) => root.clone(),
                None => std::env::current_dir()?,
            };
            Loader::with_options(FileTransport::new(root), NoScriptHost, options)?
        }
    };
    Ok(loader)
}

fn resolve(loader: &Loader, ids: &[String], from: Option<&str>) -> anyhow::Result<()> {
    let requester = match from {
        Some(from) => Some(loader.canonical_name(from, None)?),
        None => None,
    };

    for id in ids {
        match loader.canonical_name(id, requester.as_deref()) {
            Ok(resource) => {
                let location = loader.locate(&resource)?;
                println!("{}", id.cyan().bold());
                println!("  {:10} {}", "resource".dimmed(), location.resource);
                println!("  {:10} {}", "url".dimmed(), location.url.green());
                println!("  {:10} {}", "debug".dimmed(), location.debug_url);
            }
            Err(e) => {
                eprintln!("{}: {}: {}", "Error".red().bold(), id.cyan(), e);
            }
        }
    }
    Ok(())
}

fn fetch(loader: &Loader, ids: &[String], print: bool) -> anyhow::Result<()> {
    let mut failures = 0;
    for id in ids {
        match loader.fetch_source(id) {
            Ok(fetched) => {
                println!(
                    "{} {} {} ({} bytes)",
                    "✓".green().bold(),
                    fetched.resource.cyan(),
                    fetched.url.dimmed(),
                    fetched.source.len()
                );
                if print {
                    println!("{}", fetched.source);
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}", "✗".red().bold(), e);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} modules could not be fetched", failures, ids.len());
    }
    Ok(())
}
