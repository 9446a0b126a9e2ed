//! Parse outcomes shared by all provider adapters
//!
//! Vendors can answer a successful HTTP exchange with no usable text: the
//! model was blocked by a safety filter, flagged for recitation, or simply
//! returned an empty candidate. Downstream flows always want a string, so
//! those outcomes collapse to explanatory placeholder text at the boundary
//! instead of rippling through as errors.

/// What a provider extracted from one complete response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedContent {
    /// Usable generated text
    Text(String),
    /// The vendor answered but withheld the content
    Blocked(BlockReason),
    /// Nothing extractable, and no stated reason
    Empty,
}

impl ParsedContent {
    /// Collapse to the string handed to storage and the UI
    ///
    /// `Empty` becomes `""`, never an error, so callers can treat "model
    /// said nothing" as ordinary empty output.
    pub fn into_text(self) -> String {
        match self {
            ParsedContent::Text(text) => text,
            ParsedContent::Blocked(reason) => reason.placeholder(),
            ParsedContent::Empty => String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ParsedContent::Text(text) => text.is_empty(),
            ParsedContent::Blocked(_) => false,
            ParsedContent::Empty => true,
        }
    }
}

/// Why a vendor withheld content from an otherwise-successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Safety filter stopped the generation
    Safety,
    /// The output resembled protected material
    Recitation,
    /// A candidate came back but carried no usable parts
    NoUsableContent,
    /// The prompt itself was rejected, with the vendor's stated reason
    PromptBlocked(String),
}

impl BlockReason {
    /// Human-readable placeholder shown in place of the missing content
    pub fn placeholder(&self) -> String {
        match self {
            BlockReason::Safety => "[响应因安全设置被阻止]".to_string(),
            BlockReason::Recitation => "[响应因疑似引用受保护内容被阻止]".to_string(),
            BlockReason::NoUsableContent => "[未能从响应中提取有效内容]".to_string(),
            BlockReason::PromptBlocked(reason) => format!("[请求因 {} 被阻止]", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collapses_to_empty_string() {
        assert_eq!(ParsedContent::Empty.into_text(), "");
        assert!(ParsedContent::Empty.is_empty());
    }

    #[test]
    fn blocked_content_yields_placeholder_text() {
        let text = ParsedContent::Blocked(BlockReason::Safety).into_text();
        assert_eq!(text, "[响应因安全设置被阻止]");
        assert!(!ParsedContent::Blocked(BlockReason::Safety).is_empty());
    }

    #[test]
    fn prompt_block_embeds_vendor_reason() {
        let reason = BlockReason::PromptBlocked("SAFETY".to_string());
        assert_eq!(reason.placeholder(), "[请求因 SAFETY 被阻止]");
    }
}
