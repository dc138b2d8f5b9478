//! Formatting of retrieved chunks into a bounded prompt context.

use crate::document::SearchResult;

/// Returned by [`assemble_context`] when there are no results to format.
pub const NO_CONTEXT: &str = "No relevant context found in knowledge base.";

/// Separator placed between consecutive source blocks.
const BLOCK_SEPARATOR: &str = "\n";

/// Format one numbered source block. `number` starts at 1.
pub fn source_block(number: usize, text: &str) -> String {
    format!("[Source {number}]: {text}\n")
}

/// Compose ranked results into a single context string of at most
/// `max_length` characters.
///
/// Blocks are added whole, in rank order, while the running length
/// (separators included) stays within `max_length`; assembly stops at the
/// first block that would not fit. An empty `results` slice yields
/// [`NO_CONTEXT`]. If results exist but even the first block is too long,
/// the returned string is empty.
pub fn assemble_context(results: &[SearchResult], max_length: usize) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let mut context = String::new();
    let mut length = 0;

    for (i, result) in results.iter().enumerate() {
        let block = source_block(i + 1, &result.chunk.text);
        let separator_len = if context.is_empty() { 0 } else { BLOCK_SEPARATOR.len() };
        let block_len = block.chars().count() + separator_len;
        if length + block_len > max_length {
            break;
        }
        if separator_len > 0 {
            context.push_str(BLOCK_SEPARATOR);
        }
        context.push_str(&block);
        length += block_len;
    }

    context
}
