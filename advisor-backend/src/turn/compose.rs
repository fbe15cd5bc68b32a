//! Instruction composition for the runner.

/// Build the single instruction string handed to the runner.
///
/// With attachments the text is prefixed by a preamble listing every path;
/// without attachments the text passes through untouched.
pub fn compose(text: &str, paths: &[String]) -> String {
    if paths.is_empty() {
        return text.to_string();
    }
    format!(
        "The user uploaded: {:?}. Provide a text breakdown of spending.{}",
        paths, text
    )
}
