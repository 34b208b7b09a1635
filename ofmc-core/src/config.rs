//! Configuration parsing and management.

use crate::processors::{
    ProcessorChain, ProcessorSpec, BUILTIN_POST_PROCESSORS, BUILTIN_PRE_PROCESSORS,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Vault root is not a directory: {0}")]
    VaultNotFound(PathBuf),

    #[error("Markdown file not found: {0}")]
    MarkdownFileNotFound(PathBuf),
}

/// Main configuration struct matching the ofmc.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vault_root: PathBuf,

    #[serde(default)]
    pub author: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Single file to compile when `batch_compile` is off
    #[serde(default)]
    pub markdown_file: Option<PathBuf>,

    #[serde(default)]
    pub batch_compile: bool,

    /// Glob patterns matched against vault-relative paths
    #[serde(default)]
    pub excluded: Vec<String>,

    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default)]
    pub processors: ProcessorsConfig,

    #[serde(default)]
    pub book: BookConfig,

    #[serde(default)]
    pub typesetter: TypesetterConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default)]
    pub pre: Vec<ProcessorSpec>,

    #[serde(default)]
    pub post: Vec<ProcessorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_book_title")]
    pub title: String,

    /// Directories (relative to the vault) that become book parts
    #[serde(default)]
    pub parts: Vec<PartSpec>,

    #[serde(default)]
    pub front_matter: Vec<PathBuf>,

    #[serde(default)]
    pub back_matter: Vec<PathBuf>,

    #[serde(default)]
    pub cover_image: Option<PathBuf>,

    #[serde(default)]
    pub chapter_order: ChapterOrder,
}

fn default_book_title() -> String {
    String::from("Book")
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            title: default_book_title(),
            parts: Vec::new(),
            front_matter: Vec::new(),
            back_matter: Vec::new(),
            cover_image: None,
            chapter_order: ChapterOrder::default(),
        }
    }
}

/// A book part: a directory, optionally with its own title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartSpec {
    Dir(PathBuf),
    Pair(PathBuf, String),
    Titled { path: PathBuf, title: String },
}

impl PartSpec {
    pub fn path(&self) -> &Path {
        match self {
            PartSpec::Dir(path) | PartSpec::Pair(path, _) | PartSpec::Titled { path, .. } => path,
        }
    }

    /// Explicit title, or the directory name
    pub fn title(&self) -> String {
        match self {
            PartSpec::Pair(_, title) | PartSpec::Titled { title, .. } => title.clone(),
            PartSpec::Dir(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// How chapters inside a part are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterOrder {
    #[default]
    Alphabetical,
    /// By the `Created Time: ` line near the top of each note
    CreatedTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesetterConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_engine_args")]
    pub args: Vec<String>,

    /// Engine runs per attempt for individual documents
    #[serde(default = "default_passes")]
    pub passes: u32,

    #[serde(default = "default_book_passes")]
    pub book_passes: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_program() -> String {
    String::from("xelatex")
}

fn default_engine_args() -> Vec<String> {
    vec![
        "-interaction=nonstopmode".into(),
        "-halt-on-error".into(),
        "-shell-escape".into(),
    ]
}

fn default_passes() -> u32 {
    2
}

fn default_book_passes() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for TypesetterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_engine_args(),
            passes: default_passes(),
            book_passes: default_book_passes(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Check the settings a run cannot do without
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.existing_vault_dir()?;

        if !self.batch_compile {
            let file = self
                .markdown_path()
                .ok_or_else(|| ConfigError::MissingField("markdown_file".to_string()))?;
            if !file.is_file() {
                return Err(ConfigError::MarkdownFileNotFound(file));
            }
        }

        Ok(())
    }

    /// The vault directory, which must exist
    pub fn existing_vault_dir(&self) -> Result<PathBuf, ConfigError> {
        let vault = self.vault_dir();
        if vault.is_dir() {
            Ok(vault)
        } else {
            Err(ConfigError::VaultNotFound(vault))
        }
    }

    /// Get the vault directory, resolved relative to config file
    pub fn vault_dir(&self) -> PathBuf {
        self.resolve_path(&self.vault_root)
    }

    /// Get the output directory, resolved relative to config file
    pub fn output_path(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    /// The single-file target, resolved relative to config file
    pub fn markdown_path(&self) -> Option<PathBuf> {
        self.markdown_file.as_ref().map(|p| self.resolve_path(p))
    }

    /// Resolve an arbitrary path relative to the config file location
    pub fn resolve_relative(&self, path: &Path) -> PathBuf {
        self.resolve_path(path)
    }

    /// Resolve a path relative to the vault root
    pub fn vault_relative(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.vault_dir().join(path)
        }
    }

    /// Number of concurrent compile workers
    pub fn worker_count(&self) -> usize {
        self.max_workers.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(2))
                .unwrap_or(1)
                .max(1)
        })
    }

    pub fn pre_chain(&self) -> ProcessorChain {
        ProcessorChain::load(&self.processors.pre, BUILTIN_PRE_PROCESSORS)
    }

    pub fn post_chain(&self) -> ProcessorChain {
        ProcessorChain::load(&self.processors.post, BUILTIN_POST_PROCESSORS)
    }

    /// Whether a vault-relative path, or any directory above it, is excluded
    ///
    /// Patterns match from the right, so `drafts` excludes a `drafts`
    /// directory at any depth and `*.tmp.md` any such file.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.excluded.is_empty() {
            return false;
        }

        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        (1..=parts.len()).rev().any(|len| {
            let candidate = &parts[..len];
            self.excluded
                .iter()
                .any(|pattern| matches_from_right(pattern, candidate))
        })
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(config_path) = &self.config_path {
            if let Some(parent) = config_path.parent() {
                parent.join(path)
            } else {
                path.to_path_buf()
            }
        } else {
            path.to_path_buf()
        }
    }
}

fn matches_from_right(pattern: &str, parts: &[String]) -> bool {
    let pattern = pattern.trim_matches('/');
    if pattern.contains("**") {
        return glob_match::glob_match(pattern, &parts.join("/"));
    }

    let depth = pattern.split('/').count();
    if depth > parts.len() {
        return false;
    }
    glob_match::glob_match(pattern, &parts[parts.len() - depth..].join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_default_values() {
        let config = parse("vault_root: vault\n");
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(!config.batch_compile);
        assert!(!config.book.enabled);
        assert_eq!(config.book.title, "Book");
        assert_eq!(config.book.chapter_order, ChapterOrder::Alphabetical);
        assert_eq!(config.typesetter.program, "xelatex");
        assert_eq!(config.typesetter.passes, 2);
        assert_eq!(config.typesetter.book_passes, 3);
        assert_eq!(config.typesetter.max_retries, 2);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
vault_root: notes
author: Ada
batch_compile: true
excluded: ["drafts", "*.tmp.md"]
processors:
  pre: ["$normalize_unicode"]
  post:
    - "$fix_choose"
    - command: ./fix.sh
book:
  enabled: true
  title: My Book
  chapter_order: created_time
  parts:
    - Part One
    - [part2, Second Part]
    - path: part3
      title: Third
"#,
        );
        assert_eq!(config.author, "Ada");
        assert_eq!(config.pre_chain().len(), 1);
        assert_eq!(config.post_chain().len(), 2);
        assert_eq!(config.book.chapter_order, ChapterOrder::CreatedTime);
        let titles: Vec<_> = config.book.parts.iter().map(PartSpec::title).collect();
        assert_eq!(titles, vec!["Part One", "Second Part", "Third"]);
        assert_eq!(config.book.parts[1].path(), Path::new("part2"));
    }

    #[test]
    fn test_missing_vault_root() {
        assert!(serde_yaml::from_str::<Config>("author: x\n").is_err());
    }

    #[test]
    fn test_relative_paths_resolve_against_config() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("vault")).unwrap();
        fs::write(dir.path().join("vault/a.md"), "# A").unwrap();
        let config_path = dir.path().join("ofmc.yml");
        fs::write(&config_path, "vault_root: vault\nmarkdown_file: vault/a.md\n").unwrap();

        let config = Config::from_file(&config_path).unwrap();
        assert_eq!(config.vault_dir(), dir.path().join("vault"));
        assert_eq!(config.output_path(), dir.path().join("output"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("ofmc.yml");

        fs::write(&config_path, "vault_root: missing\nbatch_compile: true\n").unwrap();
        let config = Config::from_file(&config_path).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::VaultNotFound(_))));

        fs::create_dir(dir.path().join("vault")).unwrap();
        fs::write(&config_path, "vault_root: vault\n").unwrap();
        let config = Config::from_file(&config_path).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(_))));

        fs::write(&config_path, "vault_root: vault\nmarkdown_file: nope.md\n").unwrap();
        let config = Config::from_file(&config_path).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MarkdownFileNotFound(_))
        ));
    }

    #[test]
    fn test_exclusion_patterns() {
        let config = parse("vault_root: v\nexcluded: [drafts, '*.tmp.md', 'archive/old']\n");
        assert!(config.is_excluded(Path::new("drafts/a.md")));
        assert!(config.is_excluded(Path::new("notes/drafts/a.md")));
        assert!(config.is_excluded(Path::new("notes/x.tmp.md")));
        assert!(config.is_excluded(Path::new("archive/old/a.md")));
        assert!(!config.is_excluded(Path::new("archive/new/a.md")));
        assert!(!config.is_excluded(Path::new("notes/a.md")));
    }

    #[test]
    fn test_worker_count() {
        let mut config = parse("vault_root: v\nmax_workers: 3\n");
        assert_eq!(config.worker_count(), 3);
        config.max_workers = Some(0);
        assert!(config.worker_count() >= 1);
    }
}
