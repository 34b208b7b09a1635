//! # ofmc CLI
//!
//! Command-line interface for compiling Obsidian-flavored Markdown to LaTeX
//! and PDF.

mod batch;
mod book;
mod commands;
mod typeset;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ofmc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "ofmc.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the build described by the config (batch or single file)
    Build,

    /// Compile a single note to a standalone document
    Compile {
        /// Markdown file (defaults to `markdown_file` from the config)
        file: Option<PathBuf>,

        /// Write the .tex file without running the typesetter
        #[arg(long)]
        tex_only: bool,
    },

    /// Print the link registry for the vault
    Registry {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Build => commands::build(&cli.config).await,
        Commands::Compile { file, tex_only } => {
            commands::compile_file(&cli.config, file.as_deref(), tex_only).await
        }
        Commands::Registry { json } => commands::show_registry(&cli.config, json),
    }
}
