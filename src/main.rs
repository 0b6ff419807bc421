use clap::{Parser, Subcommand};

use portabru::commands::{self, PipelineOptions};
use portabru::variant;

#[derive(Parser)]
#[command(name = "portabru")]
#[command(author, version, about = "Build, bottle, and repackage portable Ruby interpreters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pass --verbose through to every brew call
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pass --debug through to every brew call
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Bottle formulae from the jdx family
    Jdx {
        /// Formula names
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Keep source-built dependencies installed afterwards
        #[arg(long)]
        keep_deps: bool,

        /// Build without the YJIT compiler
        #[arg(long)]
        no_yjit: bool,
    },

    /// Bottle formulae from the portable family
    Portable {
        /// Formula names
        #[arg(required = true)]
        formulae: Vec<String>,

        /// Keep source-built dependencies installed afterwards
        #[arg(long)]
        keep_deps: bool,

        /// Build without the YJIT compiler
        #[arg(long)]
        no_yjit: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "warn");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let (config, formulae, keep_deps, no_yjit) = match cli.command {
        Commands::Jdx {
            formulae,
            keep_deps,
            no_yjit,
        } => (&variant::JDX, formulae, keep_deps, no_yjit),
        Commands::Portable {
            formulae,
            keep_deps,
            no_yjit,
        } => (&variant::PORTABLE, formulae, keep_deps, no_yjit),
    };

    commands::bottle(
        config,
        &formulae,
        &PipelineOptions {
            keep_deps,
            no_yjit,
            verbose: cli.verbose,
            debug: cli.debug,
        },
    )?;

    Ok(())
}
