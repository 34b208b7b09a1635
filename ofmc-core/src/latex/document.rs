//! Document envelopes and the preamble shared by every output class.

use super::escape::{escape_latex, latex_path};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Packages and macros used by both articles and books
///
/// Does not include `\documentclass` or page geometry.
pub const SHARED_PREAMBLE: &str = r"\usepackage{fontspec}
\usepackage{xeCJK}

\setmainfont{Latin Modern Roman}
\setsansfont{Latin Modern Sans}
\setmonofont{Latin Modern Mono}

\setCJKmainfont[ItalicFont = FandolKai]{FandolSong}
\setCJKsansfont{FandolHei}
\setCJKmonofont{FandolFang}

\usepackage{amsmath}
\usepackage{amssymb}

\usepackage{gensymb}
\usepackage{mathrsfs}
\usepackage{extpfeil}
\usepackage{graphicx}
\usepackage{grffile}
\usepackage{svg}
\usepackage[colorlinks=true, urlcolor=green, linkcolor=blue, citecolor=blue]{hyperref}
\usepackage[most]{tcolorbox}
\usepackage{upquote}
\usepackage{xcolor}
\usepackage{soul}
\usepackage{booktabs}
\usepackage{tabularx}

\usepackage{everypage}
\usepackage{lastpage}
\usepackage{refcount}

\usepackage{titling}
\pretitle{\begin{center}\Huge\bfseries}
\posttitle{\end{center}}

\definecolor{yellow}{HTML}{FFFF00}
\sethlcolor{yellow}

\newtcolorbox{calloutbox}[2][]{
    colback={#2!10!white},
    colframe={#2!75!black},
    coltext=black,
    fonttitle=\bfseries,
    title={#1},
    arc=2mm,
    boxrule=1pt,
    breakable,
}

\newcommand{\myhl}[1]{\colorbox{yellow}{#1}}
\let\hl\myhl

\newcommand{\longmapsfrom}{\mathrel{\longleftarrow\mkern-12mu\mid}}

\setcounter{MaxMatrixCols}{30}
";

/// How a compiled body is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// A complete article with preamble, title and table of contents
    Standalone,
    /// A `\chapter` fragment for inclusion in a book
    Chapter,
}

/// Title-block information for a document
#[derive(Debug, Clone, Default)]
pub struct DocumentMeta {
    pub title: String,
    pub author: String,
    pub banner: Option<PathBuf>,
    /// Label placed after the chapter heading so `[[note]]` links can target it
    pub label: Option<String>,
}

/// Wrap a compiled body in the envelope for `mode`
pub fn render_document(body: &str, meta: &DocumentMeta, mode: RenderMode) -> String {
    let banner = meta
        .banner
        .as_ref()
        .map(|path| {
            format!(
                "\\begin{{center}}\n\\includegraphics[width=0.9\\textwidth]{{{}}}\n\\end{{center}}\n\\vspace{{1em}}\n",
                latex_path(path)
            )
        })
        .unwrap_or_default();

    match mode {
        RenderMode::Standalone => format!(
            "\\documentclass[a4paper, 11pt]{{article}}\n\
             {preamble}\n\
             \\usepackage[a4paper, top=1in, bottom=1in, left=0.9in, right=0.9in]{{geometry}}\n\n\
             \\title{{{title}}}\n\
             \\author{{{author}}}\n\
             \\date{{\\today}}\n\
             \\begin{{document}}\n\
             \\maketitle\n\
             {banner}\
             \\tableofcontents\n\n\
             {body}\n\
             \\end{{document}}\n",
            preamble = SHARED_PREAMBLE,
            title = escape_latex(&meta.title),
            author = escape_latex(&meta.author),
            banner = banner,
            body = body.trim_end(),
        ),
        RenderMode::Chapter => {
            let label = meta
                .label
                .as_ref()
                .map(|l| format!("\\label{{{}}}\n", l))
                .unwrap_or_default();
            format!(
                "\\chapter{{{title}}}\n{label}\n{banner}\\vspace{{1cm}}\n{body}\n",
                title = escape_latex(&meta.title),
                label = label,
                banner = banner,
                body = body.trim_end(),
            )
        }
    }
}

static SECTION_REGEX: OnceLock<Regex> = OnceLock::new();

fn section_regex() -> &'static Regex {
    SECTION_REGEX.get_or_init(|| Regex::new(r"\\((?:sub)*)section(\s*\{)").unwrap())
}

/// Turn numbered sectioning commands into starred ones
///
/// Embedded fragments keep their headings out of the table of contents and
/// the section numbering of the host document.
pub fn demote_headings(latex: &str) -> String {
    section_regex()
        .replace_all(latex, |caps: &regex::Captures| {
            format!("\\{}section*{}", &caps[1], &caps[2])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_envelope() {
        let meta = DocumentMeta {
            title: "My_Note".into(),
            author: "Ada".into(),
            banner: Some(PathBuf::from("/vault/cover.png")),
            label: None,
        };
        let doc = render_document("Body text\n\n", &meta, RenderMode::Standalone);
        assert!(doc.starts_with("\\documentclass[a4paper, 11pt]{article}"));
        assert!(doc.contains("\\title{My\\_Note}"));
        assert!(doc.contains("\\author{Ada}"));
        assert!(doc.contains("\\includegraphics[width=0.9\\textwidth]{/vault/cover.png}"));
        assert!(doc.contains("\\tableofcontents\n\nBody text\n\\end{document}"));
    }

    #[test]
    fn test_chapter_envelope() {
        let meta = DocumentMeta {
            title: "Intro".into(),
            label: Some("wikilink:Intro:12345678".into()),
            ..DocumentMeta::default()
        };
        let doc = render_document("Body", &meta, RenderMode::Chapter);
        assert!(doc.starts_with("\\chapter{Intro}\n\\label{wikilink:Intro:12345678}\n"));
        assert!(doc.contains("\\vspace{1cm}\nBody\n"));
        assert!(!doc.contains("\\documentclass"));
    }

    #[test]
    fn test_demote_headings() {
        assert_eq!(
            demote_headings("\\section{A}\\subsubsection {B}\\section*{C}"),
            "\\section*{A}\\subsubsection* {B}\\section*{C}"
        );
    }
}
