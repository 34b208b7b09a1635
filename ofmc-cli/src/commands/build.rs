//! Build command implementation.

use super::compile::{compile_with_config, prepare_output_dir, standalone_options};
use crate::batch::{BatchScheduler, BatchSummary, WorkerLog};
use crate::book::{book_pdf_name, chapter_stem, BookAssembler, CHAPTER_DIR, MASTER_FILE};
use crate::typeset::Typesetter;
use anyhow::{Context, Result};
use ofmc_core::{vault_notes, CompilerOptions, Config, DocumentCompiler, LinkRegistry, RenderMode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REGISTRY_DUMP: &str = "debug_link_registry.json";
const PDF_DIR: &str = "individual_pdfs";

/// Run the build the configuration asks for
pub async fn build(config_path: &Path) -> Result<()> {
    tracing::info!("Loading config from {:?}", config_path);
    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    if !config.batch_compile {
        let file = config
            .markdown_path()
            .context("markdown_file is required when batch_compile is off")?;
        return compile_with_config(config, file, false).await;
    }

    let output_dir = prepare_output_dir(&config)?;
    let notes = vault_notes(&config);
    if notes.is_empty() {
        tracing::warn!("No Markdown files found in {:?}", config.vault_dir());
        return Ok(());
    }

    if config.book.enabled {
        build_book(config, &output_dir, notes).await
    } else {
        let summary = build_individual(config, &output_dir, notes).await?;
        println!("{}", summary);
        Ok(())
    }
}

async fn build_book(config: Config, output_dir: &Path, notes: Vec<PathBuf>) -> Result<()> {
    let registry = LinkRegistry::build(&notes);
    let dump = output_dir.join(REGISTRY_DUMP);
    fs::write(&dump, registry.to_json()?).with_context(|| format!("Failed to write {:?}", dump))?;

    let chapter_dir = output_dir.join(CHAPTER_DIR);
    fs::create_dir_all(&chapter_dir)
        .with_context(|| format!("Failed to create {:?}", chapter_dir))?;

    let options = CompilerOptions::from_config(&config, Arc::new(registry), chapter_dir.join("assets"));
    let compiler = Arc::new(DocumentCompiler::new(options));

    let scheduler = BatchScheduler::new(config.worker_count());
    let summary = scheduler
        .run(notes, {
            let chapter_dir = chapter_dir.clone();
            move |note: &Path, log: &WorkerLog| -> Result<()> {
                let latex = compiler.compile(note, RenderMode::Chapter)?;
                let tex = chapter_dir.join(format!("{}.tex", chapter_stem(note)));
                fs::write(&tex, latex).with_context(|| format!("Failed to write {:?}", tex))?;
                log.info("chapter written");
                Ok(())
            }
        })
        .await;
    println!("{}", summary);

    if summary.interrupted {
        tracing::warn!("Skipping book assembly after interruption");
        return Ok(());
    }

    let master = output_dir.join(MASTER_FILE);
    let tex = BookAssembler::new(&config, output_dir).render();
    fs::write(&master, tex).with_context(|| format!("Failed to write {:?}", master))?;
    tracing::info!("Wrote {:?}", master);

    let typesetter = Typesetter::from_config(&config.typesetter);
    let passes = config.typesetter.book_passes;
    let pdf = tokio::task::spawn_blocking({
        let master = master.clone();
        move || {
            typesetter.typeset_with_progress(&master, passes, |progress| match progress.total {
                Some(total) => tracing::debug!("Typesetting page {} of {}", progress.page, total),
                None => tracing::debug!("Typesetting page {}", progress.page),
            })
        }
    })
    .await
    .context("Typesetting task panicked")?
    .context("Failed to typeset book")?;

    let destination = output_dir.join(book_pdf_name(&config.book.title));
    fs::rename(&pdf, &destination)
        .with_context(|| format!("Failed to move {:?} to {:?}", pdf, destination))?;
    println!("Wrote {}", destination.display());

    Ok(())
}

async fn build_individual(
    config: Config,
    output_dir: &Path,
    notes: Vec<PathBuf>,
) -> Result<BatchSummary> {
    let run_dir = tempfile::Builder::new()
        .prefix("ofmc-run-")
        .tempdir()
        .context("Failed to create temporary directory")?;
    let pdf_dir = output_dir.join(PDF_DIR);
    let vault_dir = config.vault_dir();
    let typesetter = Typesetter::from_config(&config.typesetter);
    let passes = config.typesetter.passes;
    let base_options = standalone_options(&config, PathBuf::new());

    let scheduler = BatchScheduler::new(config.worker_count());
    let summary = scheduler
        .run(notes, {
            let run_root = run_dir.path().to_path_buf();
            move |note: &Path, log: &WorkerLog| -> Result<()> {
                let work_dir = tempfile::Builder::new()
                    .prefix("job-")
                    .tempdir_in(&run_root)
                    .context("Failed to create job directory")?;

                let mut options = base_options.clone();
                options.assets_dir = work_dir.path().join("assets");
                let latex = DocumentCompiler::new(options).compile(note, RenderMode::Standalone)?;

                let tex = work_dir.path().join("document.tex");
                fs::write(&tex, latex).with_context(|| format!("Failed to write {:?}", tex))?;
                log.info("compiled, typesetting");

                let pdf = typesetter.typeset(&tex, passes)?;

                let relative = note.strip_prefix(&vault_dir).unwrap_or(note);
                let destination = pdf_dir.join(relative).with_extension("pdf");
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {:?}", parent))?;
                }
                fs::copy(&pdf, &destination)
                    .with_context(|| format!("Failed to copy PDF to {:?}", destination))?;
                log.info(format!("wrote {}", destination.display()));
                Ok(())
            }
        })
        .await;

    run_dir
        .close()
        .context("Failed to remove temporary directory")?;
    Ok(summary)
}
