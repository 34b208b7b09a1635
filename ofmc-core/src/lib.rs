//! # ofmc-core
//!
//! Core library for compiling Obsidian-flavored Markdown vaults to LaTeX.
//!
//! This crate provides the dialect parser, the vault-wide link registry,
//! fragment extraction for embeds, and the recursive LaTeX compiler.

pub mod assets;
pub mod compiler;
pub mod config;
pub mod extractor;
pub mod frontmatter;
pub mod latex;
pub mod locator;
pub mod markdown;
pub mod processors;
pub mod registry;
pub mod slug;
pub mod vault;

pub use assets::AssetStore;
pub use compiler::{
    CompileEnv, CompileError, CompilerOptions, DocumentCompiler, EmbedError, MAX_RECURSION_DEPTH,
};
pub use config::{ChapterOrder, Config, ConfigError, PartSpec};
pub use extractor::{ContentExtractor, SubTarget};
pub use frontmatter::Frontmatter;
pub use latex::{DocumentMeta, LatexRenderer, RenderMode};
pub use locator::Locator;
pub use markdown::{DialectParser, ParseContext, Token};
pub use processors::ProcessorChain;
pub use registry::LinkRegistry;
pub use slug::heading_slug;
pub use vault::{discover_markdown_files, order_chapters, vault_notes};
