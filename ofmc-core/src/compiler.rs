//! Recursive document compilation.
//!
//! A [`DocumentCompiler`] turns one note into LaTeX: pre-process, parse with
//! the dialect rules, render, post-process. Embeds re-enter the compiler on
//! the extracted fragment with a child [`CompileEnv`], so every nesting level
//! carries its own depth, directory and active-path record.

use crate::assets::AssetStore;
use crate::config::Config;
use crate::extractor::ContentExtractor;
use crate::frontmatter::split_frontmatter;
use crate::latex::{demote_headings, escape_latex, render_document, DocumentMeta, LatexRenderer, RenderMode};
use crate::locator::{Locator, LocatorError};
use crate::markdown::{DialectParser, ParseContext, Transclusion};
use crate::processors::ProcessorChain;
use crate::registry::LinkRegistry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Deepest transclusion level that is still expanded
pub const MAX_RECURSION_DEPTH: usize = 5;

/// Emitted in place of a fragment nested deeper than [`MAX_RECURSION_DEPTH`]
pub const MAX_DEPTH_NOTICE: &str =
    "\\textcolor{red}{\\textbf{Error: Max recursion depth reached.}}";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Locator(#[from] LocatorError),
}

/// Why an embed could not be expanded; rendered in place, never propagated
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Target not found in file.")]
    TargetNotFound,

    #[error("Transclusion cycle: {0}")]
    Cycle(String),
}

/// Settings shared by every compilation in a run
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub content_root: PathBuf,
    pub author: String,
    pub registry: Arc<LinkRegistry>,
    pub book_mode: bool,
    /// Where referenced images are copied
    pub assets_dir: PathBuf,
    pub pre: ProcessorChain,
    pub post: ProcessorChain,
}

impl CompilerOptions {
    pub fn from_config(config: &Config, registry: Arc<LinkRegistry>, assets_dir: PathBuf) -> Self {
        Self {
            content_root: config.vault_dir(),
            author: config.author.clone(),
            registry,
            book_mode: config.book.enabled,
            assets_dir,
            pre: config.pre_chain(),
            post: config.post_chain(),
        }
    }
}

/// Per-call compile state
///
/// Each transclusion step gets its own copy through [`CompileEnv::descend`].
#[derive(Debug, Clone)]
pub struct CompileEnv {
    pub locator: Locator,
    pub current_file: PathBuf,
    pub note_name: String,
    pub depth: usize,
    pub registry: Arc<LinkRegistry>,
    pub book_mode: bool,
    pub assets: AssetStore,
    /// Set inside transclusion boxes, where figures cannot float
    pub in_box: bool,
    active: Vec<(PathBuf, Option<String>)>,
}

impl CompileEnv {
    pub fn current_dir(&self) -> &Path {
        self.locator.current_dir()
    }

    /// Whether `file`/`sub_target` is already being expanded on this path
    pub fn is_active(&self, file: &Path, sub_target: Option<&str>) -> bool {
        self.active
            .iter()
            .any(|(f, s)| f == file && s.as_deref() == sub_target)
    }

    /// Environment for an embedded fragment of `file`
    pub fn descend(&self, file: &Path, sub_target: Option<&str>) -> Self {
        let mut active = self.active.clone();
        active.push((file.to_path_buf(), sub_target.map(str::to_string)));

        Self {
            locator: self.locator.for_file(file),
            current_file: file.to_path_buf(),
            note_name: note_name(file),
            depth: self.depth + 1,
            registry: Arc::clone(&self.registry),
            book_mode: self.book_mode,
            assets: self.assets.clone(),
            in_box: true,
            active,
        }
    }
}

pub struct DocumentCompiler {
    options: CompilerOptions,
    parser: DialectParser,
}

impl DocumentCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            parser: DialectParser::new(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Environment for a top-level file at `depth`
    pub fn root_env(&self, file: &Path, depth: usize) -> Result<CompileEnv, CompileError> {
        let file = file.canonicalize().map_err(|source| CompileError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let locator = Locator::new(&self.options.content_root, &file)?;

        Ok(CompileEnv {
            locator,
            note_name: note_name(&file),
            active: vec![(file.clone(), None)],
            current_file: file,
            depth,
            registry: Arc::clone(&self.options.registry),
            book_mode: self.options.book_mode,
            assets: AssetStore::new(&self.options.assets_dir),
            in_box: false,
        })
    }

    /// Compile a note into a complete document or a book chapter
    pub fn compile(&self, file: &Path, mode: RenderMode) -> Result<String, CompileError> {
        let raw = fs::read_to_string(file).map_err(|source| CompileError::Read {
            path: file.to_path_buf(),
            source,
        })?;
        let (frontmatter, body) = split_frontmatter(&raw);
        let env = self.root_env(file, 0)?;

        tracing::debug!("Compiling {:?} ({:?})", env.current_file, mode);

        let text = self.options.pre.run(body);
        let fragment = self.compile_fragment(&text, &env);

        let banner = frontmatter
            .banner_target()
            .and_then(|target| self.resolve_banner(&target, &env));

        let label = match mode {
            RenderMode::Chapter if self.options.book_mode => {
                env.registry.label(&env.note_name).map(str::to_string)
            }
            _ => None,
        };

        let meta = DocumentMeta {
            title: frontmatter.title.unwrap_or_else(|| env.note_name.clone()),
            author: self.options.author.clone(),
            banner,
            label,
        };

        let document = render_document(&fragment, &meta, mode);
        Ok(self.options.post.run(&document))
    }

    /// Compile already pre-processed text as if it were the body of `file`
    pub fn compile_body(&self, text: &str, file: &Path, depth: usize) -> Result<String, CompileError> {
        let env = self.root_env(file, depth)?;
        Ok(self.compile_fragment(text, &env))
    }

    /// Parse and render `text` in `env`
    pub fn compile_fragment(&self, text: &str, env: &CompileEnv) -> String {
        if env.depth > MAX_RECURSION_DEPTH {
            tracing::warn!("Max recursion depth reached in {:?}", env.current_file);
            return MAX_DEPTH_NOTICE.to_string();
        }

        let ctx = ParseContext {
            locator: &env.locator,
            note_name: &env.note_name,
            registry: env.book_mode.then(|| env.registry.as_ref()),
        };
        let tokens = self.parser.parse(text, &ctx);

        LatexRenderer::new(self).render(&tokens, env)
    }

    /// Expand an embed into demoted LaTeX
    pub fn transclude(&self, embed: &Transclusion, env: &CompileEnv) -> Result<String, EmbedError> {
        if env.depth + 1 > MAX_RECURSION_DEPTH {
            tracing::warn!("Max recursion depth reached embedding {}", embed.original);
            return Ok(MAX_DEPTH_NOTICE.to_string());
        }

        let sub_target = embed.sub_target.as_deref();
        if env.is_active(&embed.path, sub_target) {
            return Err(EmbedError::Cycle(embed.original.clone()));
        }

        let raw = fs::read_to_string(&embed.path)?;
        let (_, body) = split_frontmatter(&raw);
        let slice = ContentExtractor::new(&self.options.pre)
            .extract(body, sub_target)
            .ok_or(EmbedError::TargetNotFound)?;

        let child = env.descend(&embed.path, sub_target);
        Ok(demote_headings(&self.compile_fragment(&slice, &child)))
    }

    /// Boxed embed, or a red notice if it could not be expanded
    pub fn render_transclusion(&self, embed: &Transclusion, env: &CompileEnv) -> String {
        let name = embed
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| embed.original.clone());

        match self.transclude(embed, env) {
            Ok(fragment) => format!(
                "\n\\begin{{tcolorbox}}[colback=black!5!white, colframe=black!75!white, coltext=black,title={{{}}}, breakable, fonttitle=\\small\\ttfamily]\n{}\n\\end{{tcolorbox}}\n",
                escape_latex(&name),
                fragment.trim(),
            ),
            Err(e) => {
                tracing::warn!("Error embedding {} in {}: {}", name, env.note_name, e);
                format!(
                    "\\textcolor{{red}}{{\\textbf{{Error embedding {}}}: {}}}",
                    escape_latex(&name),
                    escape_latex(&e.to_string()),
                )
            }
        }
    }

    fn resolve_banner(&self, target: &str, env: &CompileEnv) -> Option<PathBuf> {
        let Some(path) = env
            .locator
            .resolve(target)
            .or_else(|| env.locator.resolve(&format!("{}.png", target)))
        else {
            tracing::warn!("Banner image not found for {}: {}", env.note_name, target);
            return None;
        };

        match env.assets.ingest(&path) {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }
}

fn note_name(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn vault(files: &[(&str, &str)]) -> TempDir {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        dir
    }

    fn compiler(dir: &TempDir, registry: Option<LinkRegistry>) -> DocumentCompiler {
        DocumentCompiler::new(CompilerOptions {
            content_root: dir.path().to_path_buf(),
            author: "Tester".into(),
            book_mode: registry.is_some(),
            registry: Arc::new(registry.unwrap_or_default()),
            assets_dir: dir.path().join("_assets"),
            pre: ProcessorChain::new(),
            post: ProcessorChain::new(),
        })
    }

    fn body_of(dir: &TempDir, compiler: &DocumentCompiler, name: &str) -> String {
        let file = dir.path().join(name);
        let text = fs::read_to_string(&file).unwrap();
        compiler.compile_body(&text, &file, 0).unwrap()
    }

    #[test]
    fn test_wikilink_alias_outside_book() {
        let dir = vault(&[("a.md", "See [[Other Note|the other]].")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\textcolor{blue}{the other}"));
    }

    #[test]
    fn test_callout_box() {
        let dir = vault(&[("a.md", "> [!warning] Careful\n> Body text\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("colframe=red!75!black"));
        assert!(out.contains("title={Careful}"));
        assert!(out.contains("Body text"));
        assert!(out.contains("\\end{tcolorbox}"));
    }

    #[test]
    fn test_block_transclusion() {
        let dir = vault(&[
            ("a.md", "Before\n\n![[b#^abc123]]\n"),
            ("b.md", "Intro\n\nLine one.\nLine two.\n^abc123\n"),
        ]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("title={b.md}"));
        assert!(out.contains("Line one."));
        assert!(out.contains("Line two."));
        assert!(!out.contains("Intro"));
        assert!(!out.contains("abc123"));
    }

    #[test]
    fn test_transcluded_headings_are_demoted() {
        let dir = vault(&[
            ("a.md", "# Top\n\n![[b]]\n"),
            ("b.md", "# Inner\n\ntext\n"),
        ]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\section{Top}"));
        assert!(out.contains("\\section*{Inner}"));
    }

    #[test]
    fn test_transcluded_tagged_math_stays_display() {
        let dir = vault(&[
            ("a.md", "![[b]]\n"),
            ("b.md", "$$\na = b \\tag{1}\n$$\n"),
        ]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\[\na = b \\tag{1}\n\\]"));
        assert!(!out.contains("$$"));
    }

    #[test]
    fn test_missing_sub_target() {
        let dir = vault(&[("a.md", "![[b#Nope]]\n"), ("b.md", "# Yes\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\textcolor{red}{\\textbf{Error embedding b.md}: Target not found in file.}"));
    }

    #[test]
    fn test_broken_embed() {
        let dir = vault(&[("a.md", "![[missing]]\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("[Broken Embed: missing]"));
    }

    #[test]
    fn test_straight_chain_hits_depth_limit() {
        let mut files: Vec<(String, String)> = (0..6)
            .map(|i| (format!("n{}.md", i), format!("level {}\n\n![[n{}]]\n", i, i + 1)))
            .collect();
        files.push(("n6.md".into(), "bottom\n".into()));
        let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let dir = vault(&refs);

        let out = body_of(&dir, &compiler(&dir, None), "n0.md");
        assert!(out.contains("level 5"));
        assert!(out.contains(MAX_DEPTH_NOTICE));
        assert!(!out.contains("bottom"));
    }

    #[test]
    fn test_six_step_cycle_hits_depth_limit() {
        let files: Vec<(String, String)> = (0..6)
            .map(|i| (format!("c{}.md", i), format!("step {}\n\n![[c{}]]\n", i, (i + 1) % 6)))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let dir = vault(&refs);

        let out = body_of(&dir, &compiler(&dir, None), "c0.md");
        assert!(out.contains(MAX_DEPTH_NOTICE));
        assert!(!out.contains("Transclusion cycle"));
    }

    #[test]
    fn test_self_embed_is_a_cycle() {
        let dir = vault(&[("a.md", "Self\n\n![[a]]\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("Transclusion cycle: a"));
        assert!(!out.contains(MAX_DEPTH_NOTICE));
    }

    #[test]
    fn test_same_file_other_section_is_not_a_cycle() {
        let dir = vault(&[("a.md", "# One\n\n![[a#Two]]\n\n# Two\n\nsecond\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("second"));
        assert!(!out.contains("Transclusion cycle"));
    }

    #[test]
    fn test_book_mode_links() {
        let dir = vault(&[
            ("a.md", "[[b#Heading]] and [[other^zzzzzz|gone]]\n"),
            ("b.md", "# Heading\n"),
        ]);
        let registry = LinkRegistry::build(&[dir.path().join("a.md"), dir.path().join("b.md")]);
        let label = registry.label("b#Heading").unwrap().to_string();

        let out = body_of(&dir, &compiler(&dir, Some(registry)), "a.md");
        assert!(out.contains(&format!("\\hyperref[{}]{{Heading}}", label)));
        assert!(out.contains("\\textcolor{red}{gone}"));
    }

    #[test]
    fn test_image_embed_is_copied() {
        let dir = vault(&[("a.md", "![[pic.png|390]]\n"), ("pic.png", "png")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\begin{figure}[h!]"));
        assert!(out.contains("\\includegraphics[width=190pt]"));
        assert!(out.contains("\\caption{pic.png}"));
        assert_eq!(fs::read_dir(dir.path().join("_assets")).unwrap().count(), 1);
    }

    #[test]
    fn test_image_size_hint_is_scaled() {
        let dir = vault(&[("a.md", "![[pic.png|200]]\n"), ("pic.png", "png")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\includegraphics[width=97pt]"));
    }

    #[test]
    fn test_huge_size_hint_is_capped() {
        let dir = vault(&[("a.md", "![[pic.png|30000000]]\n"), ("pic.png", "png")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\includegraphics[width=350pt]"));
    }

    #[test]
    fn test_broken_link_with_empty_registry() {
        let dir = vault(&[("a.md", "[[Missing Note]]\n")]);
        let out = body_of(&dir, &compiler(&dir, Some(LinkRegistry::new())), "a.md");
        assert!(out.contains("\\textcolor{red}{Missing Note}"));
    }

    #[test]
    fn test_image_in_callout_does_not_float() {
        let dir = vault(&[("a.md", "> [!note]\n> ![[pic.png]]\n"), ("pic.png", "png")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\begin{center}"));
        assert!(out.contains("width=0.4\\textwidth"));
        assert!(!out.contains("\\begin{figure}"));
    }

    #[test]
    fn test_missing_image() {
        let dir = vault(&[("a.md", "![alt](nothere.png)\n")]);
        let out = body_of(&dir, &compiler(&dir, None), "a.md");
        assert!(out.contains("\\textcolor{red}{Image not found: nothere.png}"));
    }

    #[test]
    fn test_standalone_document() {
        let dir = vault(&[("a.md", "---\ntitle: My Title\n---\nHello *world*\n")]);
        let compiler = compiler(&dir, None);
        let out = compiler.compile(&dir.path().join("a.md"), RenderMode::Standalone).unwrap();
        assert!(out.starts_with("\\documentclass"));
        assert!(out.contains("\\title{My Title}"));
        assert!(out.contains("\\author{Tester}"));
        assert!(out.contains("Hello \\textit{world}"));
        assert!(out.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn test_chapter_label_in_book_mode() {
        let dir = vault(&[("intro.md", "Text\n")]);
        let registry = LinkRegistry::build(&[dir.path().join("intro.md")]);
        let label = registry.label("intro").unwrap().to_string();
        let compiler = compiler(&dir, Some(registry));

        let out = compiler.compile(&dir.path().join("intro.md"), RenderMode::Chapter).unwrap();
        assert!(out.starts_with(&format!("\\chapter{{intro}}\n\\label{{{}}}", label)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = vault(&[]);
        let compiler = compiler(&dir, None);
        let err = compiler.compile(&dir.path().join("nope.md"), RenderMode::Standalone);
        assert!(matches!(err, Err(CompileError::Read { .. })));
    }
}
