//! Token stream to LaTeX.
//!
//! The renderer walks the flat token list once, keeping the little state
//! that LaTeX output depends on: the open table row, callout nesting (which
//! decides whether images may float), and the label owed to a heading.
//! Transclusion tokens call back into the [`DocumentCompiler`].

pub mod document;
pub mod escape;

use crate::compiler::{CompileEnv, DocumentCompiler};
use crate::markdown::{ImageRef, InlineToken, Token, WikiLink};
use crate::registry::canonical_key;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

pub use document::{demote_headings, render_document, DocumentMeta, RenderMode, SHARED_PREAMBLE};
pub use escape::{escape_latex, escape_url, latex_path};

const DEFAULT_IMAGE_WIDTH: &str = "width=0.4\\textwidth";
const MAX_IMAGE_WIDTH_PT: u32 = 350;

/// Frame color for a callout type
pub fn callout_color(kind: &str) -> &'static str {
    match kind {
        "note" => "blue",
        "abstract" | "info" => "cyan",
        "todo" | "question" => "orange",
        "tip" | "done" => "green",
        "warning" | "caution" | "fail" | "error" => "red",
        "example" => "violet",
        _ => "gray",
    }
}

#[derive(Default)]
struct RenderState {
    callout_depth: usize,
    heading_label: Option<String>,
    cell_index: usize,
    cell_header: bool,
}

pub struct LatexRenderer<'c> {
    compiler: &'c DocumentCompiler,
}

impl<'c> LatexRenderer<'c> {
    pub fn new(compiler: &'c DocumentCompiler) -> Self {
        Self { compiler }
    }

    pub fn render(&self, tokens: &[Token], env: &CompileEnv) -> String {
        let mut out = String::new();
        let mut state = RenderState::default();

        for token in tokens {
            match token {
                Token::HeadingOpen { level, raw, .. } => {
                    let command = match level {
                        1 => "section",
                        2 => "subsection",
                        3 => "subsubsection",
                        _ => "paragraph",
                    };
                    out.push_str(&format!("\\{}{{", command));
                    state.heading_label = if env.book_mode {
                        env.registry
                            .label(&format!("{}#{}", env.note_name, raw))
                            .map(str::to_string)
                    } else {
                        None
                    };
                }
                Token::HeadingClose { .. } => {
                    out.push('}');
                    if let Some(label) = state.heading_label.take() {
                        out.push_str(&format!("\\label{{{}}}", label));
                    }
                    out.push_str("\n\n");
                }
                Token::ParagraphOpen => {}
                Token::ParagraphClose => out.push_str("\n\n"),
                Token::Inline(block) => {
                    let boxed = env.in_box || state.callout_depth > 0;
                    out.push_str(&self.render_inline(&block.children, env, boxed));
                    if let Some(label) = &block.anchor_label {
                        out.push_str(&format!("\\label{{{}}}", label));
                    }
                }
                Token::BulletListOpen => out.push_str("\\begin{itemize}\n"),
                Token::BulletListClose => out.push_str("\\end{itemize}\n\n"),
                Token::OrderedListOpen { start } => {
                    out.push_str("\\begin{enumerate}\n");
                    if *start > 1 {
                        out.push_str(&format!("\\setcounter{{enumi}}{{{}}}\n", start - 1));
                    }
                }
                Token::OrderedListClose => out.push_str("\\end{enumerate}\n\n"),
                Token::ListItemOpen => out.push_str("\\item "),
                Token::ListItemClose => {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Token::TableOpen { columns } => {
                    let spec = if *columns <= 1 {
                        "X".to_string()
                    } else {
                        format!("l{}", " X".repeat(columns - 1))
                    };
                    out.push_str(&format!(
                        "\\begin{{tabularx}}{{\\textwidth}}{{ {} }}\n\\toprule\n",
                        spec
                    ));
                }
                Token::TableClose => out.push_str("\\bottomrule\n\\end{tabularx}\n\n"),
                Token::TableHeadOpen => {}
                Token::TableHeadClose => out.push_str("\\midrule\n"),
                Token::TableBodyOpen | Token::TableBodyClose => {}
                Token::RowOpen => state.cell_index = 0,
                Token::RowClose => out.push_str(" \\\\\n"),
                Token::CellOpen { header } => {
                    if state.cell_index > 0 {
                        out.push_str(" & ");
                    }
                    state.cell_header = *header;
                    if *header {
                        out.push_str("\\textbf{");
                    }
                }
                Token::CellClose => {
                    if state.cell_header {
                        out.push('}');
                    }
                    state.cell_index += 1;
                }
                Token::BlockquoteOpen => out.push_str("\\begin{quote}\n"),
                Token::BlockquoteClose => out.push_str("\\end{quote}\n\n"),
                Token::CalloutOpen { kind, title } => {
                    let color = callout_color(kind);
                    let title = self.render_inline(title, env, true);
                    out.push_str(&format!(
                        "\\begin{{tcolorbox}}[colback={c}!5!white, colframe={c}!75!black, coltext=black, fonttitle=\\bfseries, breakable, title={{{t}}}]\n",
                        c = color,
                        t = title.trim(),
                    ));
                    state.callout_depth += 1;
                }
                Token::CalloutClose => {
                    out.push_str("\\end{tcolorbox}\n\n");
                    state.callout_depth = state.callout_depth.saturating_sub(1);
                }
                Token::CodeBlock { code, .. } => {
                    out.push_str("\\begin{verbatim}\n");
                    out.push_str(code);
                    if !code.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str("\\end{verbatim}\n\n");
                }
                Token::HtmlBlock(html) => {
                    tracing::debug!("Dropping HTML block in {}: {}", env.note_name, html.trim());
                }
                Token::Rule => out.push_str("\\noindent\\rule{\\textwidth}{0.4pt}\n\n"),
            }
        }

        out
    }

    fn render_inline(&self, children: &[InlineToken], env: &CompileEnv, boxed: bool) -> String {
        let mut out = String::new();

        for child in children {
            match child {
                InlineToken::Text(text) => out.push_str(&escape_latex(text)),
                InlineToken::Code(code) => {
                    out.push_str(&format!("\\texttt{{{}}}", escape_latex(code)))
                }
                InlineToken::Math(math) => out.push_str(&format!("${}$", math)),
                InlineToken::DisplayMath(math) => {
                    out.push_str(&format!("\n\\[\n{}\n\\]\n", math.trim()))
                }
                InlineToken::SoftBreak => out.push('\n'),
                InlineToken::HardBreak => out.push_str("\\\\\n"),
                InlineToken::StrongOpen => out.push_str("\\textbf{"),
                InlineToken::EmphasisOpen => out.push_str("\\textit{"),
                InlineToken::StrikeOpen => out.push_str("\\st{"),
                InlineToken::MarkOpen => out.push_str("\\hl{"),
                InlineToken::StrongClose
                | InlineToken::EmphasisClose
                | InlineToken::StrikeClose
                | InlineToken::MarkClose
                | InlineToken::LinkClose => out.push('}'),
                InlineToken::LinkOpen { href } => {
                    out.push_str(&format!("\\href{{{}}}{{", escape_url(href)))
                }
                InlineToken::TaskMarker { checked } => out.push_str(if *checked {
                    "$\\boxtimes$ "
                } else {
                    "$\\square$ "
                }),
                InlineToken::Image(image) => out.push_str(&self.render_image(image, env, boxed)),
                InlineToken::WikiLink(link) => out.push_str(&render_wikilink(link, env)),
                InlineToken::Transclusion(transclusion) => {
                    out.push_str(&self.compiler.render_transclusion(transclusion, env))
                }
                InlineToken::Html(html) => {
                    tracing::debug!("Dropping inline HTML in {}: {}", env.note_name, html);
                }
            }
        }

        out
    }

    fn render_image(&self, image: &ImageRef, env: &CompileEnv, boxed: bool) -> String {
        let src = percent_decode_str(&image.src).decode_utf8_lossy().into_owned();

        if src.starts_with("http://") || src.starts_with("https://") {
            tracing::warn!("Skipping web image in {}: {}", env.note_name, src);
            return format!("\\textcolor{{red}}{{Web image skipped: {}}}", escape_latex(&src));
        }

        let path = {
            let candidate = PathBuf::from(&src);
            if candidate.is_absolute() {
                candidate
            } else {
                env.current_dir().join(candidate)
            }
        };
        if !path.is_file() {
            tracing::warn!("Image not found in {}: {}", env.note_name, src);
            return format!("\\textcolor{{red}}{{Image not found: {}}}", escape_latex(&src));
        }

        let stored = match env.assets.ingest(&path) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("{}", e);
                return format!("\\textcolor{{red}}{{Image not copied: {}}}", escape_latex(&src));
            }
        };

        let width = image
            .size_hint
            .as_deref()
            .and_then(parse_width)
            .map(|px| format!("width={}pt", (px.saturating_mul(190) / 390).min(MAX_IMAGE_WIDTH_PT)))
            .unwrap_or_else(|| DEFAULT_IMAGE_WIDTH.to_string());

        let include = if is_svg(&stored) {
            format!("\\includesvg[{}]{{{}}}", width, latex_path(&stored))
        } else {
            format!("\\includegraphics[{}]{{{}}}", width, latex_path(&stored))
        };
        let caption = escape_latex(&image.caption);

        if boxed {
            format!(
                "\n\\begin{{center}}\n{}\n\n\\textit{{{}}}\n\\end{{center}}\n",
                include, caption
            )
        } else {
            format!(
                "\n\\begin{{figure}}[h!]\n\\centering\n{}\n\\caption{{{}}}\n\\end{{figure}}\n",
                include, caption
            )
        }
    }
}

fn render_wikilink(link: &WikiLink, env: &CompileEnv) -> String {
    let display = escape_latex(&link.display);
    if !env.book_mode {
        return format!("\\textcolor{{blue}}{{{}}}", display);
    }

    let key = canonical_key(&link.target, &env.note_name);
    match env.registry.label(&key) {
        Some(label) => format!("\\hyperref[{}]{{{}}}", label, display),
        None => {
            tracing::debug!("Unresolved wikilink in {}: {}", env.note_name, key);
            format!("\\textcolor{{red}}{{{}}}", display)
        }
    }
}

/// Width in pixels from `300` or `300x200`
fn parse_width(hint: &str) -> Option<u32> {
    hint.split('x').next()?.trim().parse().ok()
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callout_colors() {
        assert_eq!(callout_color("note"), "blue");
        assert_eq!(callout_color("warning"), "red");
        assert_eq!(callout_color("example"), "violet");
        assert_eq!(callout_color("cite"), "gray");
        assert_eq!(callout_color("custom"), "gray");
    }

    #[test]
    fn test_parse_width() {
        assert_eq!(parse_width("300"), Some(300));
        assert_eq!(parse_width("640x480"), Some(640));
        assert_eq!(parse_width("caption"), None);
    }
}
