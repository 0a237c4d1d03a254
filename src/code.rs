//! Code detection in chat message bodies.
//!
//! Messages are scanned for Markdown fences (```` ``` ````) and inline
//! `<code>` tags. Fenced regions are extracted verbatim, fences included,
//! in the order they appear. Fences do not nest: each opening fence pairs
//! with the next closing fence.

use regex::Regex;
use std::sync::OnceLock;

const FENCE: &str = "```";

fn fence_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\s\S]*?```").unwrap())
}

/// Returns `true` when the content carries a fence or an inline code tag.
pub fn contains_code(content: &str) -> bool {
    content.contains(FENCE) || content.contains("<code")
}

/// Extracts every fenced code region.
///
/// An unterminated trailing fence is not a region and is ignored.
pub fn extract_code_blocks(content: &str) -> Vec<String> {
    fence_pattern()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_fenced_regions() {
        let content = "Try this:\n```rust\nfn main() {}\n```\nthen\n```sh\ncargo run\n```\n";
        assert!(contains_code(content));
        let blocks = extract_code_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "```rust\nfn main() {}\n```");
        assert_eq!(blocks[1], "```sh\ncargo run\n```");
    }

    #[test]
    fn test_plain_text_has_no_code() {
        let content = "Just a normal answer with `single backticks` only.";
        assert!(!contains_code(content));
        assert!(extract_code_blocks(content).is_empty());
    }

    #[test]
    fn test_inline_code_tag_without_fence() {
        let content = "Use <code>ls -la</code> to list files.";
        assert!(contains_code(content));
        assert!(extract_code_blocks(content).is_empty());
    }

    #[test]
    fn test_unterminated_fence() {
        let content = "```python\nprint('hi')\n";
        assert!(contains_code(content));
        assert!(extract_code_blocks(content).is_empty());
    }

    #[test]
    fn test_fences_pair_lazily() {
        // Three fences: the first two pair up, the third is left open.
        let content = "```a``` middle ```b";
        assert_eq!(extract_code_blocks(content), vec!["```a```".to_string()]);
    }

    #[test]
    fn test_empty_content() {
        assert!(!contains_code(""));
        assert!(extract_code_blocks("").is_empty());
    }
}
