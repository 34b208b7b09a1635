//! Master document for book mode.

use ofmc_core::latex::{escape_latex, latex_path, SHARED_PREAMBLE};
use ofmc_core::{discover_markdown_files, order_chapters, Config};
use std::path::{Path, PathBuf};

/// Directory, relative to the output directory, holding compiled chapters
pub const CHAPTER_DIR: &str = "tex_chapters";

pub const MASTER_FILE: &str = "_master_book.tex";

const PROGRESS_HOOK: &str = "\\AddEverypageHook{\\immediate\\write16{PYTEX-PROGRESS-SIGNAL \\thepage\\space of \\getpagerefnumber{LastPage}}}%";

/// File stem used for a note's chapter, safe for `\include`
pub fn chapter_stem(note: &Path) -> String {
    note.file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_default()
}

/// Final PDF name for a book title
pub fn book_pdf_name(title: &str) -> String {
    format!("{}.pdf", title.trim().replace(' ', "_"))
}

/// Assembles `_master_book.tex` from the chapters that compiled
pub struct BookAssembler<'a> {
    config: &'a Config,
    chapter_dir: PathBuf,
}

impl<'a> BookAssembler<'a> {
    pub fn new(config: &'a Config, output_dir: &Path) -> Self {
        Self {
            config,
            chapter_dir: output_dir.join(CHAPTER_DIR),
        }
    }

    pub fn render(&self) -> String {
        let book = &self.config.book;
        let mut out = String::new();

        out.push_str("\\documentclass[11pt, twoside]{book}\n");
        out.push_str(SHARED_PREAMBLE);
        out.push_str(
            "\\usepackage[a4paper, inner=1in, outer=0.75in, top=1in, bottom=1in]{geometry}\n\n",
        );
        out.push_str(&format!(
            "\\title{{{}}}\n\\author{{{}}}\n\\date{{\\today}}\n\n",
            escape_latex(&book.title),
            escape_latex(&self.config.author)
        ));
        out.push_str(PROGRESS_HOOK);
        out.push_str("\n\n\\begin{document}\n\n");

        if let Some(cover) = &book.cover_image {
            let cover = self.config.vault_relative(cover);
            if cover.is_file() {
                out.push_str(&format!(
                    "\\begin{{titlepage}}\n\\centering\n\\includegraphics[width=\\textwidth,height=\\textheight,keepaspectratio]{{{}}}\n\\end{{titlepage}}\n\n",
                    latex_path(&cover)
                ));
            } else {
                tracing::warn!("Cover image not found: {:?}", cover);
            }
        }

        out.push_str("\\frontmatter\n\\maketitle\n\\tableofcontents\n\n");
        for note in &book.front_matter {
            self.push_chapter(&mut out, &self.config.vault_relative(note));
        }

        out.push_str("\n\\mainmatter\n\n");
        if book.parts.is_empty() {
            for note in self.ordered_chapters(&self.config.vault_dir()) {
                self.push_chapter(&mut out, &note);
            }
        } else {
            for part in &book.parts {
                out.push_str(&format!("\\part{{{}}}\n", escape_latex(&part.title())));
                for note in self.ordered_chapters(&self.config.vault_relative(part.path())) {
                    self.push_chapter(&mut out, &note);
                }
                out.push('\n');
            }
        }

        if !book.back_matter.is_empty() {
            out.push_str("\n\\backmatter\n\n");
            for note in &book.back_matter {
                self.push_chapter(&mut out, &self.config.vault_relative(note));
            }
        }

        out.push_str("\n\\end{document}\n");
        out
    }

    fn ordered_chapters(&self, dir: &Path) -> Vec<PathBuf> {
        let mut notes: Vec<PathBuf> = discover_markdown_files(self.config, dir)
            .into_iter()
            .filter(|note| !self.is_matter(note))
            .collect();
        order_chapters(&mut notes, self.config.book.chapter_order);
        notes
    }

    fn is_matter(&self, note: &Path) -> bool {
        let book = &self.config.book;
        book.front_matter
            .iter()
            .chain(&book.back_matter)
            .any(|m| self.config.vault_relative(m) == note)
    }

    fn push_chapter(&self, out: &mut String, note: &Path) {
        let stem = chapter_stem(note);
        if self.chapter_dir.join(format!("{}.tex", stem)).is_file() {
            out.push_str(&format!("\\include{{{}/{}}}\n", CHAPTER_DIR, stem));
        } else {
            tracing::warn!("No compiled chapter for {:?}; leaving it out", note);
        }
    }
}
