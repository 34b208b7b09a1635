//! Discovery of notes in a vault and chapter ordering for books.

use crate::config::{ChapterOrder, Config};
use chrono::NaiveDateTime;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// How many lines from the top are searched for a creation time
const CREATED_TIME_SCAN_LINES: usize = 20;

const CREATED_TIME_FORMATS: &[&str] = &["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S"];

static CREATED_TIME_REGEX: OnceLock<Regex> = OnceLock::new();

fn created_time_regex() -> &'static Regex {
    CREATED_TIME_REGEX.get_or_init(|| Regex::new(r"Created Time:\s*`([^`]+)`").unwrap())
}

/// Markdown files under `dir`, sorted, skipping hidden and excluded paths
///
/// Exclusion patterns are matched against paths relative to the vault.
pub fn discover_markdown_files(config: &Config, dir: &Path) -> Vec<PathBuf> {
    let vault_dir = config.vault_dir();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "md") {
            continue;
        }

        let relative = path.strip_prefix(&vault_dir).unwrap_or(path);
        if config.is_excluded(relative) {
            tracing::debug!("Skipping excluded {:?}", relative);
            continue;
        }

        files.push(path.to_path_buf());
    }

    files
}

/// Every note in the vault
pub fn vault_notes(config: &Config) -> Vec<PathBuf> {
    discover_markdown_files(config, &config.vault_dir())
}

/// The `Created Time: `...`` stamp near the top of a note
pub fn created_time(content: &str) -> Option<NaiveDateTime> {
    content
        .lines()
        .take(CREATED_TIME_SCAN_LINES)
        .find_map(|line| created_time_regex().captures(line))
        .and_then(|caps| {
            let stamp = caps[1].trim();
            CREATED_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
        })
}

/// Sort chapter files in place
///
/// Notes without a readable creation time sort first under `CreatedTime`.
pub fn order_chapters(files: &mut [PathBuf], order: ChapterOrder) {
    match order {
        ChapterOrder::Alphabetical => files.sort_by_key(|f| chapter_name(f).to_lowercase()),
        ChapterOrder::CreatedTime => files.sort_by_cached_key(|f| {
            let stamp = fs::read_to_string(f)
                .ok()
                .and_then(|content| created_time(&content))
                .unwrap_or(NaiveDateTime::MIN);
            (stamp, chapter_name(f).to_lowercase())
        }),
    }
}

fn chapter_name(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(root: &Path, excluded: &[&str]) -> Config {
        let yaml = format!(
            "vault_root: {:?}\nexcluded: [{}]\n",
            root,
            excluded
                .iter()
                .map(|p| format!("{:?}", p))
                .collect::<Vec<_>>()
                .join(", ")
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_discovery_skips_hidden_and_excluded() {
        let dir = tempdir().unwrap();
        for name in ["b.md", "a.md", "notes/c.md", "drafts/d.md", ".obsidian/e.md", "f.txt"] {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }

        let config = config_for(dir.path(), &["drafts"]);
        let names: Vec<_> = vault_notes(&config)
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.md"),
                PathBuf::from("b.md"),
                PathBuf::from("notes/c.md"),
            ]
        );
    }

    #[test]
    fn test_created_time_formats() {
        let note = "# Title\nCreated Time: `03/04/2023 02:15:00 PM`\n";
        let expected = NaiveDateTime::parse_from_str("2023-03-04 14:15:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(created_time(note), Some(expected));
        assert_eq!(created_time("Created Time: `03/04/2023 14:15:00`"), Some(expected));
        assert_eq!(created_time("Created Time: `yesterday`"), None);
        assert_eq!(created_time("no stamp"), None);
    }

    #[test]
    fn test_created_time_only_near_top() {
        let mut note = "line\n".repeat(CREATED_TIME_SCAN_LINES);
        note.push_str("Created Time: `03/04/2023 14:15:00`\n");
        assert_eq!(created_time(&note), None);
    }

    #[test]
    fn test_chapter_ordering() {
        let dir = tempdir().unwrap();
        let late = dir.path().join("alpha.md");
        let early = dir.path().join("beta.md");
        let undated = dir.path().join("gamma.md");
        fs::write(&late, "Created Time: `05/01/2024 09:00:00`").unwrap();
        fs::write(&early, "Created Time: `01/01/2024 09:00:00`").unwrap();
        fs::write(&undated, "nothing").unwrap();

        let mut files = vec![undated.clone(), early.clone(), late.clone()];
        order_chapters(&mut files, ChapterOrder::Alphabetical);
        assert_eq!(files, vec![late.clone(), early.clone(), undated.clone()]);

        order_chapters(&mut files, ChapterOrder::CreatedTime);
        assert_eq!(files, vec![undated, early, late]);
    }
}
