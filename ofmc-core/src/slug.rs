//! Heading slugs used for `#heading` sub-targets.

/// Convert a heading to the slug form used when matching `[[note#heading]]`
///
/// Rules:
/// - Lowercase
/// - Drop everything that is not alphanumeric or whitespace
/// - Join the remaining words with single hyphens
///
/// # Examples
///
/// ```
/// use ofmc_core::heading_slug;
///
/// assert_eq!(heading_slug("Hello World"), "hello-world");
/// assert_eq!(heading_slug("Step 2: Profit!"), "step-2-profit");
/// ```
pub fn heading_slug(heading: &str) -> String {
    let kept: String = heading
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join("-")
}
