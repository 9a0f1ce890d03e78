//! Context rendering for answer prompts.

use super::ContextBlock;

/// Returned in place of context when nothing has been ingested.
pub const NO_DATA_MESSAGE: &str = "No data available in the index. Please add some content first.";

impl ContextBlock {
    /// `source_url`, then `title` if present, then the chunk text.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.source_url.len() + self.title.len() + self.content.len() + 3,
        );
        out.push_str(&self.source_url);
        out.push('\n');
        if !self.title.is_empty() {
            out.push_str(&self.title);
            out.push('\n');
        }
        out.push_str(&self.content);
        out.push('\n');
        out
    }
}

/// Render blocks in rank order, separated by a blank line.
pub fn render_context(blocks: &[ContextBlock]) -> String {
    blocks
        .iter()
        .map(ContextBlock::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render restricted URLs as a bullet list for the prompt.
pub fn render_restricted(urls: &[String]) -> String {
    if urls.is_empty() {
        return "None".to_string();
    }
    urls.iter()
        .map(|url| format!("- {}", url))
        .collect::<Vec<_>>()
        .join("\n")
}
