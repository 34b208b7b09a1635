//! Invocation of the external LaTeX engine.

use ofmc_core::config::TypesetterConfig;
use regex::Regex;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Lines kept before the first `!` error line
const CONTEXT_BEFORE: usize = 2;
/// Lines kept after it, inclusive
const CONTEXT_AFTER: usize = 8;
/// Tail kept when the log has no `!` line
const TAIL_LINES: usize = 15;

#[derive(Error, Debug)]
pub enum TypesetError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed on {file:?} after {attempts} attempt(s):\n{excerpt}")]
    Failed {
        program: String,
        file: PathBuf,
        attempts: u32,
        excerpt: String,
    },

    #[error("{0:?} is not a file in a directory")]
    BadInput(PathBuf),

    #[error("No PDF produced at {0:?}")]
    MissingPdf(PathBuf),
}

/// Page progress reported by the book's page hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub page: u32,
    pub total: Option<u32>,
}

static PROGRESS_REGEX: OnceLock<Regex> = OnceLock::new();

fn progress_regex() -> &'static Regex {
    PROGRESS_REGEX
        .get_or_init(|| Regex::new(r"PYTEX-PROGRESS-SIGNAL\s+(\d+)(?:\s+of\s+(\d+))?").unwrap())
}

/// Progress from one line of engine output
pub fn parse_progress(line: &str) -> Option<Progress> {
    let caps = progress_regex().captures(line)?;
    Some(Progress {
        page: caps[1].parse().ok()?,
        total: caps.get(2).and_then(|m| m.as_str().parse().ok()),
    })
}

/// The part of an engine log worth showing
///
/// Centered on the first line starting with `!`, otherwise the tail.
pub fn extract_relevant_error(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();

    match lines.iter().position(|line| line.starts_with('!')) {
        Some(index) => {
            let start = index.saturating_sub(CONTEXT_BEFORE);
            let end = (index + CONTEXT_AFTER).min(lines.len());
            lines[start..end].join("\n")
        }
        None => lines[lines.len().saturating_sub(TAIL_LINES)..].join("\n"),
    }
}

enum Attempt {
    Done,
    Failed(String),
}

/// Runs the engine over a `.tex` file in its own directory
#[derive(Debug, Clone)]
pub struct Typesetter {
    program: String,
    args: Vec<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl Typesetter {
    pub fn from_config(config: &TypesetterConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Typeset `tex` with `passes` engine runs and return the PDF path
    pub fn typeset(&self, tex: &Path, passes: u32) -> Result<PathBuf, TypesetError> {
        self.typeset_with_progress(tex, passes, |_| {})
    }

    /// Like [`Typesetter::typeset`], reporting page progress from engine output
    pub fn typeset_with_progress(
        &self,
        tex: &Path,
        passes: u32,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<PathBuf, TypesetError> {
        let (Some(dir), Some(name)) = (tex.parent(), tex.file_name()) else {
            return Err(TypesetError::BadInput(tex.to_path_buf()));
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let pdf = tex.with_extension("pdf");
        let attempts = self.max_retries + 1;
        let mut excerpt = String::new();

        for attempt in 1..=attempts {
            match self.attempt(dir, Path::new(name), passes.max(1), &mut on_progress)? {
                Attempt::Done => {
                    return if pdf.is_file() {
                        Ok(pdf)
                    } else {
                        Err(TypesetError::MissingPdf(pdf))
                    };
                }
                Attempt::Failed(log) => {
                    excerpt = extract_relevant_error(&log);
                    tracing::warn!(
                        "{} failed on {:?} (attempt {}/{})",
                        self.program,
                        tex,
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(TypesetError::Failed {
            program: self.program.clone(),
            file: tex.to_path_buf(),
            attempts,
            excerpt,
        })
    }

    fn attempt(
        &self,
        dir: &Path,
        name: &Path,
        passes: u32,
        on_progress: &mut impl FnMut(Progress),
    ) -> Result<Attempt, TypesetError> {
        for pass in 1..=passes {
            tracing::debug!("{} pass {}/{} on {:?}", self.program, pass, passes, name);

            let mut child = Command::new(&self.program)
                .args(&self.args)
                .arg(name)
                .current_dir(dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|source| TypesetError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;

            let mut output = String::new();
            if let Some(stdout) = child.stdout.take() {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if let Some(progress) = parse_progress(&line) {
                        on_progress(progress);
                    }
                    output.push_str(&line);
                    output.push('\n');
                }
            }

            let status = child.wait().map_err(|source| TypesetError::Spawn {
                program: self.program.clone(),
                source,
            })?;

            if !status.success() {
                // The engine's own log is more complete than its stdout
                let log = fs::read_to_string(dir.join(name).with_extension("log")).unwrap_or(output);
                return Ok(Attempt::Failed(log));
            }
        }

        Ok(Attempt::Done)
    }
}
