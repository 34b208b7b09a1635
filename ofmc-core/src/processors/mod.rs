//! Text processor chains run before parsing and after rendering.
//!
//! A chain is an ordered list of stages. Each stage is either a built-in
//! from a closed, static table (named `$name` in the config) or an external
//! program that reads the text on stdin and writes the result to stdout.

pub mod post;
pub mod pre;

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{command} produced invalid UTF-8")]
    InvalidOutput { command: String },
}

/// A text-to-text transform
pub type TextTransform = fn(&str) -> String;

/// Entry in a built-in processor table
#[derive(Debug)]
pub struct BuiltinProcessor {
    pub name: &'static str,
    pub apply: TextTransform,
}

pub static BUILTIN_PRE_PROCESSORS: &[BuiltinProcessor] = &[
    BuiltinProcessor {
        name: "normalize_unicode",
        apply: pre::normalize_unicode,
    },
    BuiltinProcessor {
        name: "insert_blank_blockquote_lines",
        apply: pre::insert_blank_blockquote_lines,
    },
    BuiltinProcessor {
        name: "fix_callout_formulas",
        apply: pre::fix_callout_formulas,
    },
    BuiltinProcessor {
        name: "preprocess_nested_blockquotes",
        apply: pre::preprocess_nested_blockquotes,
    },
];

pub static BUILTIN_POST_PROCESSORS: &[BuiltinProcessor] = &[
    BuiltinProcessor {
        name: "fix_tcolorbox_label_tcolorbox",
        apply: post::fix_tcolorbox_label_tcolorbox,
    },
    BuiltinProcessor {
        name: "fix_choose",
        apply: post::fix_choose,
    },
    BuiltinProcessor {
        name: "replace_bbox",
        apply: post::replace_bbox,
    },
    BuiltinProcessor {
        name: "replace_array_with_matrix_environments",
        apply: post::replace_array_with_matrix_environments,
    },
    BuiltinProcessor {
        name: "fix_kern_syntax",
        apply: post::fix_kern_syntax,
    },
    BuiltinProcessor {
        name: "fix_smaller_than",
        apply: post::fix_smaller_than,
    },
    BuiltinProcessor {
        name: "fix_mathbb_k",
        apply: post::fix_mathbb_k,
    },
    BuiltinProcessor {
        name: "replace_tagged_dollars",
        apply: post::replace_tagged_dollars,
    },
    BuiltinProcessor {
        name: "split_inline_display_math",
        apply: post::split_inline_display_math,
    },
    BuiltinProcessor {
        name: "replace_custom_arrow_tricks",
        apply: post::replace_custom_arrow_tricks,
    },
    BuiltinProcessor {
        name: "fix_align_environment",
        apply: post::fix_align_environment,
    },
    BuiltinProcessor {
        name: "remove_bad_tex_block_pointers",
        apply: post::remove_bad_tex_block_pointers,
    },
];

/// A processor as written in the config file
///
/// ```yaml
/// processors:
///   pre:
///     - $normalize_unicode
///     - command: ./scripts/fix.py
///       args: [--strict]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessorSpec {
    Named(String),
    External(ExternalProcessor),
}

/// A program run as a stdin-to-stdout filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProcessor {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalProcessor {
    pub fn run(&self, text: &str) -> Result<String, ProcessorError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessorError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        // stdin is written while stdout is drained
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.to_owned();
            let command = self.command.clone();
            thread::spawn(move || {
                // A filter may exit without reading everything; its status decides
                if let Err(e) = stdin.write_all(input.as_bytes()) {
                    tracing::debug!("{} closed stdin early: {}", command, e);
                }
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|source| ProcessorError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(writer) = writer {
            if writer.join().is_err() {
                tracing::debug!("stdin writer for {} panicked", self.command);
            }
        }

        if !output.status.success() {
            return Err(ProcessorError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ProcessorError::InvalidOutput {
            command: self.command.clone(),
        })
    }
}

#[derive(Debug, Clone)]
enum Stage {
    Builtin(&'static BuiltinProcessor),
    External(ExternalProcessor),
}

/// Ordered sequence of text transforms
#[derive(Debug, Clone, Default)]
pub struct ProcessorChain {
    stages: Vec<Stage>,
}

impl ProcessorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from config entries, looking `$names` up in `table`
    ///
    /// Unknown names and entries without a `$` are logged and skipped.
    pub fn load(specs: &[ProcessorSpec], table: &'static [BuiltinProcessor]) -> Self {
        let mut stages = Vec::with_capacity(specs.len());

        for spec in specs {
            match spec {
                ProcessorSpec::Named(name) => {
                    let Some(builtin_name) = name.strip_prefix('$') else {
                        tracing::warn!("Unrecognized processor '{}'; expected $name", name);
                        continue;
                    };
                    match table.iter().find(|p| p.name == builtin_name) {
                        Some(builtin) => stages.push(Stage::Builtin(builtin)),
                        None => tracing::warn!("Unknown built-in processor '{}'", name),
                    }
                }
                ProcessorSpec::External(external) => stages.push(Stage::External(external.clone())),
            }
        }

        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Apply every stage in order; a failing external stage passes text through
    pub fn run(&self, text: &str) -> String {
        let mut current = text.to_string();

        for stage in &self.stages {
            current = match stage {
                Stage::Builtin(builtin) => (builtin.apply)(&current),
                Stage::External(external) => match external.run(&current) {
                    Ok(output) => output,
                    Err(e) => {
                        tracing::warn!("Processor failed, keeping input unchanged: {}", e);
                        current
                    }
                },
            };
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserialization() {
        let specs: Vec<ProcessorSpec> =
            serde_yaml::from_str("- $normalize_unicode\n- command: cat\n  args: [-u]\n").unwrap();
        assert_eq!(specs[0], ProcessorSpec::Named("$normalize_unicode".into()));
        assert_eq!(
            specs[1],
            ProcessorSpec::External(ExternalProcessor {
                command: "cat".into(),
                args: vec!["-u".into()],
            })
        );
    }

    #[test]
    fn test_unknown_names_are_skipped() {
        let specs = vec![
            ProcessorSpec::Named("$normalize_unicode".into()),
            ProcessorSpec::Named("$does_not_exist".into()),
            ProcessorSpec::Named("no_dollar".into()),
        ];
        let chain = ProcessorChain::load(&specs, BUILTIN_PRE_PROCESSORS);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.run("a\u{00A0}b"), "a b");
    }

    #[test]
    fn test_post_names_not_found_in_pre_table() {
        let specs = vec![ProcessorSpec::Named("$fix_choose".into())];
        assert!(ProcessorChain::load(&specs, BUILTIN_PRE_PROCESSORS).is_empty());
        assert_eq!(ProcessorChain::load(&specs, BUILTIN_POST_PROCESSORS).len(), 1);
    }

    #[test]
    fn test_stages_run_in_order() {
        let specs = vec![
            ProcessorSpec::Named("$replace_bbox".into()),
            ProcessorSpec::Named("$fix_choose".into()),
        ];
        let chain = ProcessorChain::load(&specs, BUILTIN_POST_PROCESSORS);
        assert_eq!(chain.run("\\bbox{n \\choose k}"), "\\boxed{\\binom{n}{k}}");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        assert_eq!(ProcessorChain::new().run("unchanged"), "unchanged");
    }

    #[cfg(unix)]
    #[test]
    fn test_external_stage() {
        let specs = vec![ProcessorSpec::External(ExternalProcessor {
            command: "tr".into(),
            args: vec!["a-z".into(), "A-Z".into()],
        })];
        assert_eq!(ProcessorChain::load(&specs, BUILTIN_PRE_PROCESSORS).run("abc"), "ABC");
    }

    #[cfg(unix)]
    #[test]
    fn test_external_stage_streams_large_input() {
        let stage = ExternalProcessor {
            command: "cat".into(),
            args: Vec::new(),
        };
        let input = "x".repeat(1 << 20);
        let (tx, rx) = std::sync::mpsc::channel();
        let sent = input.clone();
        thread::spawn(move || {
            let _ = tx.send(stage.run(&sent));
        });

        let output = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("cat should finish on large input")
            .unwrap();
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn test_failing_external_stage_passes_through() {
        let specs = vec![ProcessorSpec::External(ExternalProcessor {
            command: "definitely-not-a-real-program-ofmc".into(),
            args: vec![],
        })];
        assert_eq!(ProcessorChain::load(&specs, BUILTIN_PRE_PROCESSORS).run("keep"), "keep");
    }
}
