use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use wren::error::Result;
use wren::scope::Resolvers;
use wren::Config;

/// A static site generator built on wren.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root directory
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the site, reparsing on every change
    Dev {
        /// Port to listen on (overrides config.toml and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write the site to the output directory
    Build,
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config::discover(&cli.root)?;
    match cli.command {
        Command::Dev { port } => {
            if let Some(port) = port {
                config.settings.port = port;
            }

            wren::dev::run(config, Resolvers::default())
        }
        Command::Build => {
            let report = wren::build::build(&config)?;
            println!("built {} pages into {}", report.pages, report.output.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
