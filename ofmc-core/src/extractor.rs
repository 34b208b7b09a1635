//! Extraction of a heading section or an anchored block from a note.

use crate::markdown::DialectParser;
use crate::processors::ProcessorChain;
use crate::slug::heading_slug;
use regex::Regex;

/// Which part of a note a transclusion asks for
#[derive(Debug, Clone, PartialEq)]
pub enum SubTarget {
    Heading(String),
    Block(String),
}

impl SubTarget {
    /// Parse `#heading`, `#^id` or `^id`
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(id) = raw.strip_prefix("#^").or_else(|| raw.strip_prefix('^')) {
            return Some(SubTarget::Block(id.trim().to_string()));
        }
        raw.strip_prefix('#')
            .map(|heading| SubTarget::Heading(heading.trim().to_string()))
    }
}

/// Pulls a section out of raw Markdown and runs the pre-processing chain on it
pub struct ContentExtractor<'a> {
    parser: DialectParser,
    preprocess: &'a ProcessorChain,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(preprocess: &'a ProcessorChain) -> Self {
        Self {
            parser: DialectParser::new(),
            preprocess,
        }
    }

    /// The requested slice of `raw`, or `None` if the target is not there
    ///
    /// Without a sub-target the whole text is returned.
    pub fn extract(&self, raw: &str, sub_target: Option<&str>) -> Option<String> {
        let slice = match sub_target {
            None => raw.to_string(),
            Some(sub) => match SubTarget::parse(sub)? {
                SubTarget::Block(id) => extract_block(raw, &id)?,
                SubTarget::Heading(heading) => self.extract_heading(raw, &heading)?,
            },
        };

        Some(self.preprocess.run(&slice))
    }

    fn extract_heading(&self, raw: &str, heading: &str) -> Option<String> {
        let outline = self.parser.outline(raw);
        let wanted_lower = heading.to_lowercase();
        let wanted_slug = heading_slug(heading);

        let start = outline.iter().position(|h| {
            h.text.to_lowercase() == wanted_lower || heading_slug(&h.text) == wanted_slug
        })?;
        let level = outline[start].level;

        let lines: Vec<&str> = raw.lines().collect();
        let end = outline[start + 1..]
            .iter()
            .find(|h| h.level <= level)
            .map_or(lines.len(), |h| h.line);

        let section = &lines[outline[start].line..end.min(lines.len())];
        Some(section.join("\n").trim_end().to_string())
    }
}

/// The paragraph ending in `^id`, anchor line included
fn extract_block(raw: &str, id: &str) -> Option<String> {
    let anchor = Regex::new(&format!(r"\^{}\s*$", regex::escape(id))).ok()?;
    let lines: Vec<&str> = raw.lines().collect();
    let target = lines.iter().position(|line| anchor.is_match(line))?;

    let standalone = lines[target].trim_start().starts_with('^');
    let mut start = target;

    if standalone {
        // Skip blank lines between the paragraph and its anchor
        while start > 0 && lines[start - 1].trim().is_empty() {
            start -= 1;
        }
    }
    while start > 0 && !lines[start - 1].trim().is_empty() {
        start -= 1;
    }

    Some(lines[start..=target].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{ProcessorSpec, BUILTIN_PRE_PROCESSORS};

    fn extract(raw: &str, sub: Option<&str>) -> Option<String> {
        let chain = ProcessorChain::new();
        ContentExtractor::new(&chain).extract(raw, sub)
    }

    #[test]
    fn test_sub_target_parse() {
        assert_eq!(SubTarget::parse("#^abc123"), Some(SubTarget::Block("abc123".into())));
        assert_eq!(SubTarget::parse("^abc123"), Some(SubTarget::Block("abc123".into())));
        assert_eq!(SubTarget::parse("#Intro"), Some(SubTarget::Heading("Intro".into())));
        assert_eq!(SubTarget::parse("Intro"), None);
    }

    #[test]
    fn test_whole_document() {
        assert_eq!(extract("all\ntext", None).as_deref(), Some("all\ntext"));
    }

    #[test]
    fn test_block_on_own_line() {
        let raw = "Intro\n\nLine one.\nLine two.\n^abc123\n\nAfter";
        assert_eq!(
            extract(raw, Some("^abc123")).as_deref(),
            Some("Line one.\nLine two.\n^abc123")
        );
    }

    #[test]
    fn test_inline_block_anchor() {
        let raw = "Other\n\nFirst line\nClaim here ^abc123\n\nAfter";
        assert_eq!(
            extract(raw, Some("#^abc123")).as_deref(),
            Some("First line\nClaim here ^abc123")
        );
    }

    #[test]
    fn test_inline_anchor_on_first_line() {
        assert_eq!(
            extract("Only ^abc123\nnext", Some("^abc123")).as_deref(),
            Some("Only ^abc123")
        );
    }

    #[test]
    fn test_heading_section_stops_at_same_level() {
        let raw = "# Top\n\n## Methods\n\nStep one\n\n### Detail\n\nMore\n\n## Results\n\nNumbers";
        assert_eq!(
            extract(raw, Some("#Methods")).as_deref(),
            Some("## Methods\n\nStep one\n\n### Detail\n\nMore")
        );
    }

    #[test]
    fn test_heading_matches_case_and_slug() {
        let raw = "## Step 2: Profit!\n\nbody\n";
        assert_eq!(extract(raw, Some("#step 2: profit!")).as_deref(), Some("## Step 2: Profit!\n\nbody"));
        assert_eq!(extract(raw, Some("#Step 2 Profit")).as_deref(), Some("## Step 2: Profit!\n\nbody"));
    }

    #[test]
    fn test_heading_to_end_of_file() {
        assert_eq!(extract("# Only\ntext\n", Some("#Only")).as_deref(), Some("# Only\ntext"));
    }

    #[test]
    fn test_missing_targets() {
        assert_eq!(extract("# A\n", Some("#B")), None);
        assert_eq!(extract("text ^abc123", Some("^ffffff")), None);
    }

    #[test]
    fn test_preprocessing_applies_to_slice() {
        let specs = vec![ProcessorSpec::Named("$normalize_unicode".into())];
        let chain = ProcessorChain::load(&specs, BUILTIN_PRE_PROCESSORS);
        let out = ContentExtractor::new(&chain).extract("# A\na\u{00A0}b", Some("#A"));
        assert_eq!(out.as_deref(), Some("# A\na b"));
    }
}
