//! Inline previews of uploaded statements for the data analyst.
//!
//! Paths are picked out of the delegated task text and only files that live
//! under the upload directory are read. Text statements are inlined up to a
//! byte budget; anything else is listed without its contents.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static QUOTED_PATH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"["'`]([^"'`\n]+\.[A-Za-z0-9]{2,5})["'`]"#).ok());
static BARE_PATH: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?:^|\s)((?:\.{0,2}/)?[\w./-]+\.(?i:csv|txt|tsv|pdf))\b").ok());

const TEXT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Candidate file paths mentioned in `text`, in order of first mention.
pub fn mentioned_paths(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for re in [QUOTED_PATH.as_ref(), BARE_PATH.as_ref()].into_iter().flatten() {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let candidate = m.as_str().trim().to_string();
                if !found.contains(&candidate) {
                    found.push(candidate);
                }
            }
        }
    }
    found
}

/// Resolve `raw` inside `upload_root`, refusing anything that escapes it.
fn resolve_within(upload_root: &Path, raw: &str) -> Option<PathBuf> {
    let root = upload_root.canonicalize().ok()?;
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        // Uploads are referenced either relative to the process or by bare stored name
        let relative = PathBuf::from(raw);
        if relative.exists() { relative } else { root.join(raw) }
    };
    let canonical = joined.canonicalize().ok()?;
    if canonical.starts_with(&root) && canonical.is_file() {
        Some(canonical)
    } else {
        None
    }
}

/// Build the attachment section appended to the data analyst's task.
pub async fn render_previews(task: &str, upload_root: &Path, max_bytes: usize) -> Option<String> {
    let mut sections = Vec::new();

    for raw in mentioned_paths(task) {
        let Some(path) = resolve_within(upload_root, &raw) else {
            log::debug!("[ANALYST] Skipping path outside uploads or missing: {}", raw);
            continue;
        };

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
            sections.push(format!(
                "File {} ({} document): contents are not inlined; base the analysis on what the user states about it.",
                raw, extension
            ));
            continue;
        }

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let truncated = bytes.len() > max_bytes;
                let slice = &bytes[..bytes.len().min(max_bytes)];
                let text = String::from_utf8_lossy(slice);
                let mut section = format!("File {}:\n```\n{}\n```", raw, text.trim_end());
                if truncated {
                    section.push_str(&format!("\n(truncated to the first {} bytes of {})", max_bytes, bytes.len()));
                }
                sections.push(section);
            }
            Err(e) => {
                log::warn!("[ANALYST] Failed to read {}: {}", path.display(), e);
            }
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(format!("## Uploaded files\n\n{}", sections.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mentioned_paths_from_list_rendering() {
        let text = r#"The user uploaded: ["/uploads/ab12-jan.csv", "/uploads/cd34-feb.pdf"]. Summarize."#;
        assert_eq!(
            mentioned_paths(text),
            vec!["/uploads/ab12-jan.csv", "/uploads/cd34-feb.pdf"]
        );
    }

    #[test]
    fn test_mentioned_paths_bare_and_deduplicated() {
        let text = "Look at statement.csv and then statement.csv again";
        assert_eq!(mentioned_paths(text), vec!["statement.csv"]);
    }

    #[tokio::test]
    async fn test_previews_inline_text_and_list_pdf() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("jan.csv");
        let pdf = dir.path().join("feb.pdf");
        tokio::fs::write(&csv, "Date,Amount,Category\n2024-01-02,42.50,Groceries\n").await.unwrap();
        tokio::fs::write(&pdf, b"%PDF-1.4").await.unwrap();

        let task = format!("Analyze \"{}\" and \"{}\"", csv.display(), pdf.display());
        let preview = render_previews(&task, dir.path(), 1024).await.expect("preview");

        assert!(preview.contains("2024-01-02,42.50,Groceries"));
        assert!(preview.contains("pdf document"));
    }

    #[tokio::test]
    async fn test_previews_truncate_large_files() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("big.csv");
        tokio::fs::write(&csv, "x".repeat(100)).await.unwrap();

        let task = format!("\"{}\"", csv.display());
        let preview = render_previews(&task, dir.path(), 10).await.expect("preview");
        assert!(preview.contains("truncated to the first 10 bytes of 100"));
    }

    #[tokio::test]
    async fn test_files_outside_upload_root_are_ignored() {
        let uploads = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let secret = elsewhere.path().join("secret.csv");
        tokio::fs::write(&secret, "do not read").await.unwrap();

        let task = format!("\"{}\"", secret.display());
        assert!(render_previews(&task, uploads.path(), 1024).await.is_none());
    }
}
