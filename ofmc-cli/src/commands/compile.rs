//! Single-file compilation.

use crate::book::chapter_stem;
use crate::typeset::Typesetter;
use anyhow::{Context, Result};
use ofmc_core::{CompilerOptions, Config, DocumentCompiler, LinkRegistry, RenderMode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compile one note to a standalone document, and to PDF unless `tex_only`
pub async fn compile_file(config_path: &Path, file: Option<&Path>, tex_only: bool) -> Result<()> {
    tracing::info!("Loading config from {:?}", config_path);
    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    config
        .existing_vault_dir()
        .context("Invalid configuration")?;

    let file = match file {
        Some(file) => file.to_path_buf(),
        None => config
            .markdown_path()
            .context("No file given and no markdown_file in the configuration")?,
    };

    compile_with_config(config, file, tex_only).await
}

pub async fn compile_with_config(config: Config, file: PathBuf, tex_only: bool) -> Result<()> {
    let written = tokio::task::spawn_blocking(move || compile_single(&config, &file, tex_only))
        .await
        .context("Compile task panicked")??;

    println!("Wrote {}", written.display());
    Ok(())
}

/// Create the output directory and return its absolute path
pub fn prepare_output_dir(config: &Config) -> Result<PathBuf> {
    let output_dir = config.output_path();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;
    output_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve output directory {:?}", output_dir))
}

/// Options for compiling documents outside book mode
pub fn standalone_options(config: &Config, assets_dir: PathBuf) -> CompilerOptions {
    let mut options = CompilerOptions::from_config(config, Arc::new(LinkRegistry::new()), assets_dir);
    options.book_mode = false;
    options
}

/// Compile `file` into `<output>/<stem>/` and return the file handed to the user
fn compile_single(config: &Config, file: &Path, tex_only: bool) -> Result<PathBuf> {
    if !file.is_file() {
        anyhow::bail!("Markdown file not found: {:?}", file);
    }

    let output_dir = prepare_output_dir(config)?;
    let stem = chapter_stem(file);
    let work_dir = output_dir.join(&stem);
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create {:?}", work_dir))?;

    let compiler = DocumentCompiler::new(standalone_options(config, work_dir.join("assets")));
    let latex = compiler
        .compile(file, RenderMode::Standalone)
        .with_context(|| format!("Failed to compile {:?}", file))?;

    let tex = work_dir.join(format!("{}.tex", stem));
    fs::write(&tex, latex).with_context(|| format!("Failed to write {:?}", tex))?;
    tracing::info!("Wrote {:?}", tex);

    if tex_only {
        return Ok(tex);
    }

    let pdf = Typesetter::from_config(&config.typesetter)
        .typeset(&tex, config.typesetter.passes)
        .with_context(|| format!("Failed to typeset {:?}", tex))?;

    let destination = output_dir.join(format!("{}.pdf", stem));
    fs::copy(&pdf, &destination)
        .with_context(|| format!("Failed to copy {:?} to {:?}", pdf, destination))?;

    Ok(destination)
}
