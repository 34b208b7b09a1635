//! Bounded parallel execution of per-file jobs.
//!
//! Jobs run as blocking tasks, at most `workers` at a time. Workers report
//! through a shared channel drained by a single logging task, and a Ctrl-C
//! stops new submissions while in-flight jobs finish.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy)]
enum Level {
    Info,
    Error,
}

#[derive(Debug)]
struct LogLine {
    level: Level,
    file: String,
    message: String,
}

/// Handle a job uses to report progress for its file
#[derive(Clone)]
pub struct WorkerLog {
    tx: mpsc::UnboundedSender<LogLine>,
    file: String,
}

impl WorkerLog {
    fn send(&self, level: Level, message: String) {
        // The consumer only goes away once every job has finished
        let _ = self.tx.send(LogLine {
            level,
            file: self.file.clone(),
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(Level::Info, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(Level::Error, message.into());
    }
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: Vec<PathBuf>,
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn success_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.processed as f64 * 100.0
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch summary")?;
        writeln!(f, "  Processed: {}", self.processed)?;
        writeln!(f, "  Succeeded: {}", self.succeeded)?;
        writeln!(f, "  Failed:    {}", self.failed.len())?;
        write!(f, "  Success rate: {:.1}%", self.success_rate())?;
        if self.interrupted {
            write!(f, "\n  Interrupted before all files were submitted")?;
        }
        for path in &self.failed {
            write!(f, "\n  - {}", path.display())?;
        }
        Ok(())
    }
}

pub struct BatchScheduler {
    workers: usize,
    stop: Arc<AtomicBool>,
}

impl BatchScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, stops further submissions
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run `job` for every file and collect the outcome
    pub async fn run<F>(&self, files: Vec<PathBuf>, job: F) -> BatchSummary
    where
        F: Fn(&Path, &WorkerLog) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<LogLine>();

        let consumer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                match line.level {
                    Level::Info => tracing::info!("[{}] {}", line.file, line.message),
                    Level::Error => tracing::error!("[{}] {}", line.file, line.message),
                }
            }
        });

        let interrupt = tokio::spawn({
            let stop = self.stop_handle();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted; waiting for running jobs to finish");
                    stop.store(true, Ordering::SeqCst);
                }
            }
        });

        tracing::info!("Processing {} files with {} workers", files.len(), self.workers);

        let mut summary = BatchSummary::default();
        let mut tasks = JoinSet::new();

        for file in files {
            if self.stop.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            // The stop flag may have been set while waiting for a slot
            if self.stop.load(Ordering::SeqCst) {
                summary.interrupted = true;
                break;
            }

            let log = WorkerLog {
                tx: tx.clone(),
                file: display_name(&file),
            };
            let job = Arc::clone(&job);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = job(&file, &log);
                if let Err(e) = &result {
                    log.error(format!("{:#}", e));
                }
                (file, result.is_ok())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            summary.processed += 1;
            match joined {
                Ok((_, true)) => summary.succeeded += 1,
                Ok((file, false)) => summary.failed.push(file),
                Err(e) => tracing::error!("Worker task panicked: {}", e),
            }
        }

        interrupt.abort();
        drop(tx);
        let _ = consumer.await;

        summary.failed.sort();
        summary
    }
}

fn display_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}
