//! Uploaded-file reference normalization.

use advisor_types::FileRef;

/// Resolve every file reference to its path string.
///
/// Order and duplicates are preserved. References that carry neither a
/// usable `path` nor `name` are dropped with a warning, so a turn whose
/// attachments are all unusable is treated as having no files.
pub fn normalize(files: &[FileRef]) -> Vec<String> {
    files
        .iter()
        .enumerate()
        .filter_map(|(idx, file)| match file.resolve() {
            Some(path) => Some(path.to_string()),
            None => {
                log::warn!("[TURN] Ignoring attachment #{} with no path or name: {:?}", idx, file);
                None
            }
        })
        .collect()
}
