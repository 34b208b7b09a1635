//! Built-in LaTeX post-processors.
//!
//! Each fixes a construct that renders in Obsidian's MathJax but breaks
//! under XeLaTeX.

use regex::{Captures, Regex};
use std::sync::OnceLock;

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(label_between_boxes, r"(\\end\{tcolorbox\})\s*(\\label\{[^\}]+\})\s*(\\end\{tcolorbox\})");
cached_regex!(choose_regex, r"(\w+)\s*\\choose\s*(\w+)");
cached_regex!(bbox_regex, r"\\bbox(?:\[[^\]]*\])?\{([^}]*)\}");
cached_regex!(kern_regex, r"\\(kern|raise|moveleft|moveright)\s*\{([^}]+)\}");
cached_regex!(dimension_regex, r"(?i)(\d*\.?\d+)\s+(pt|pc|in|bp|cm|mm|dd|cc|sp|em|ex|mu)\b");
cached_regex!(mathbb_k_regex, r"\\mathbb\s*k\b");
cached_regex!(display_math_regex, r"(?s)\$\$(.*?)\$\$");
cached_regex!(tag_regex, r"\\tag\s*(?:\{(.*?)\}|([^\s{]+))");
cached_regex!(text_after_open, r"\$\$\s*(\S)");
cached_regex!(text_before_close, r"([^\n]+?)\s*\$\$");
cached_regex!(bad_pointer_line, r"(?m)^[ \t]*\\\^\{\}.*?(?:\r?\n|\r|\z)");
cached_regex!(naked_array, r"(?s)\\begin\{array\}(\s*\{[^}]*\})?(.*?)\\end\{array\}");

/// Move labels stranded between two closing boxes outside the outer box
pub fn fix_tcolorbox_label_tcolorbox(latex: &str) -> String {
    let mut current = latex.to_string();
    loop {
        let next = label_between_boxes()
            .replace_all(&current, |caps: &Captures| {
                format!("{}\n{}\n{}", &caps[1], &caps[3], &caps[2])
            })
            .into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

pub fn fix_choose(latex: &str) -> String {
    choose_regex()
        .replace_all(latex, |caps: &Captures| format!("\\binom{{{}}}{{{}}}", &caps[1], &caps[2]))
        .into_owned()
}

pub fn replace_bbox(latex: &str) -> String {
    bbox_regex()
        .replace_all(latex, |caps: &Captures| format!("\\boxed{{{}}}", &caps[1]))
        .into_owned()
}

/// `\begin{array}...\end{array}` without a column spec becomes a matrix
pub fn replace_array_with_matrix_environments(latex: &str) -> String {
    const BRACKETED: &[(&str, &str, &str)] = &[
        ("pmatrix", r"\\left\s*\(", r"\\right\s*\)"),
        ("bmatrix", r"\\left\s*\[", r"\\right\s*\]"),
        ("vmatrix", r"\\left\s*(?:\\vert|\|)", r"\\right\s*(?:\\vert|\|)"),
        ("Vmatrix", r"\\left\s*(?:\\Vert|\\\|)", r"\\right\s*(?:\\Vert|\\\|)"),
    ];

    let mut current = latex.to_string();
    for (env, left, right) in BRACKETED {
        let pattern = format!(
            r"(?s)({})\\begin\{{array\}}(\s*\{{[^}}]*\}})?(.*?)\\end\{{array\}}({})",
            left, right
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        current = re
            .replace_all(&current, |caps: &Captures| {
                array_replacement(caps, caps.get(2), caps.get(3), env)
            })
            .into_owned();
    }

    naked_array()
        .replace_all(&current, |caps: &Captures| {
            array_replacement(caps, caps.get(1), caps.get(2), "matrix")
        })
        .into_owned()
}

fn array_replacement(
    caps: &Captures,
    spec: Option<regex::Match>,
    body: Option<regex::Match>,
    env: &str,
) -> String {
    let has_columns = spec
        .map(|m| {
            let inner = m.as_str().trim();
            !inner[1..inner.len() - 1].trim().is_empty()
        })
        .unwrap_or(false);

    if has_columns {
        return caps[0].to_string();
    }

    format!(
        "\\begin{{{env}}}{}\\end{{{env}}}",
        body.map_or("", |m| m.as_str())
    )
}

/// `\kern{2pt}` to `\kern 2pt`, and `1 em` to `1em`
pub fn fix_kern_syntax(latex: &str) -> String {
    let fixed = kern_regex().replace_all(latex, |caps: &Captures| {
        format!("\\{} {}", &caps[1], &caps[2])
    });
    dimension_regex()
        .replace_all(&fixed, |caps: &Captures| format!("{}{}", &caps[1], &caps[2]))
        .into_owned()
}

pub fn fix_smaller_than(latex: &str) -> String {
    latex.replace("\\<", "<").replace("\\>", ">")
}

pub fn fix_mathbb_k(latex: &str) -> String {
    mathbb_k_regex().replace_all(latex, "\\Bbbk").into_owned()
}

/// `$$ ... \tag{n} $$` becomes an equation environment carrying the tag
pub fn replace_tagged_dollars(latex: &str) -> String {
    display_math_regex()
        .replace_all(latex, |caps: &Captures| {
            let content = &caps[1];
            if !content.contains("\\tag") {
                return caps[0].to_string();
            }
            let Some(tag) = tag_regex().captures(content) else {
                tracing::warn!("Found \\tag but could not parse it in: {}", &caps[0]);
                return caps[0].to_string();
            };
            let label = tag.get(1).or_else(|| tag.get(2)).map_or("", |m| m.as_str());
            let without_tag = tag_regex().replacen(content, 1, "");
            format!(
                "\\begin{{equation}}\n{}\n\\tag{{{}}}\n\\end{{equation}}",
                without_tag.trim(),
                label
            )
        })
        .into_owned()
}

/// Put `$$` delimiters on lines of their own
pub fn split_inline_display_math(latex: &str) -> String {
    let unescaped = latex.replace("\\$\\$", "$$");
    let opened = text_after_open().replace_all(&unescaped, |caps: &Captures| {
        format!("$$\n{}", &caps[1])
    });
    text_before_close()
        .replace_all(&opened, |caps: &Captures| format!("{}\n$$", &caps[1]))
        .into_owned()
}

pub fn replace_custom_arrow_tricks(latex: &str) -> String {
    latex.replace(
        "\\longleftarrow{\\raise{.4pt}{\\hspace{-5pt}\\shortmid}}",
        "\\longmapsfrom ",
    )
}

pub fn fix_align_environment(latex: &str) -> String {
    latex
        .replace("\\begin{align}", "\\begin{aligned}")
        .replace("\\end{align}", "\\end{aligned}")
}

/// Drop lines that start with a stray escaped caret (`\^{}`)
pub fn remove_bad_tex_block_pointers(latex: &str) -> String {
    bad_pointer_line().replace_all(latex, "").into_owned()
}
