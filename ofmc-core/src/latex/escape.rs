//! Escaping of text for LaTeX.

/// Escape LaTeX special characters in running text
///
/// # Examples
///
/// ```
/// use ofmc_core::latex::escape_latex;
///
/// assert_eq!(escape_latex("50% & $5"), r"50\% \& \$5");
/// ```
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\^{}"),
            '\\' => out.push_str("\\textbackslash{}"),
            '<' => out.push_str("\\textless{}"),
            '>' => out.push_str("\\textgreater{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a URL for the first argument of `\href`
pub fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '#' | '%' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '\\' => out.push('/'),
            _ => out.push(c),
        }
    }
    out
}

/// Path form safe inside `\includegraphics{...}`
pub fn latex_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
