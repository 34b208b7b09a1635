//! Built-in Markdown pre-processors.

use regex::Regex;
use std::sync::OnceLock;

static QUOTED_MATH_FENCE: OnceLock<Regex> = OnceLock::new();
static QUOTE_PREFIX: OnceLock<Regex> = OnceLock::new();

fn quoted_math_fence() -> &'static Regex {
    QUOTED_MATH_FENCE.get_or_init(|| Regex::new(r"^\s*>\s*\$\$\s*$").unwrap())
}

fn quote_prefix() -> &'static Regex {
    QUOTE_PREFIX.get_or_init(|| Regex::new(r"^\s*>\s?").unwrap())
}

/// Replace typographic spaces and drop invisible characters
pub fn normalize_unicode(text: &str) -> String {
    text.replace(['\u{202F}', '\u{00A0}'], " ")
        .replace(['\u{200B}', '\u{FFFC}'], "")
}

/// Separate consecutive quote lines into their own paragraphs
pub fn insert_blank_blockquote_lines(text: &str) -> String {
    let mut out = Vec::new();
    let mut previous_quoted = false;

    for line in text.lines() {
        let quoted = line.trim_start().starts_with('>');
        if previous_quoted && quoted {
            out.push(">");
        }
        out.push(line);
        previous_quoted = quoted;
    }

    out.join("\n")
}

/// Pull `> $$ ... > $$` display math out of quotes so it parses as math
pub fn fix_callout_formulas(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        if !quoted_math_fence().is_match(lines[i]) {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        out.push("$$".to_string());
        i += 1;
        while i < lines.len() {
            let line = lines[i];
            if quoted_math_fence().is_match(line) {
                out.push("$$".to_string());
                i += 1;
                break;
            }
            if !line.trim_start().starts_with('>') {
                break;
            }
            out.push(quote_prefix().replace(line, "").into_owned());
            i += 1;
        }
    }

    out.join("\n").replace("Alternative Proof", "Alternative-Proof")
}

/// Flatten `>>` quotes that are not nested callouts by one level
pub fn preprocess_nested_blockquotes(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let stripped = line.trim_start();
            if !stripped.starts_with(">>") {
                return line.to_string();
            }
            let after_quotes = stripped.trim_start_matches([' ', '>']);
            if after_quotes.starts_with("[!") {
                return line.to_string();
            }
            let indent = line.len() - stripped.len();
            format!("{}{}", &line[..indent], &stripped[1..])
        })
        .collect::<Vec<_>>()
        .join("\n")
}
