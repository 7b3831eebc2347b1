//! Prompt assembly for grounded, cited answers.

use super::types::Citation;
use std::fmt::Write;

const INSTRUCTIONS: &str = "\
You are a question answering assistant. Answer the question using only the numbered context \
blocks below.
Cite the blocks that support each statement inline with their numbers in square brackets, \
for example [1] or [1][2]. Only use numbers that appear in the context.
If the context does not contain enough information to answer, say that you cannot answer from \
the provided documents. Do not guess and do not use outside knowledge.";

/// Build the generation prompt from the question and the citations in rank order.
///
/// Every citation becomes one context block labelled with its sequence number, so the markers the
/// model writes can be checked against the final citations message.
pub fn build_prompt(question: &str, citations: &[Citation]) -> String {
    let mut prompt = String::with_capacity(
        INSTRUCTIONS.len()
            + question.len()
            + citations
                .iter()
                .map(|citation| citation.source_text.len() + 64)
                .sum::<usize>(),
    );
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nContext:\n");
    for (index, citation) in citations.iter().enumerate() {
        if index > 0 {
            prompt.push_str("---\n");
        }
        // Writing into a String cannot fail.
        let _ = writeln!(prompt, "[{}] (source: {})", citation.id, citation.source);
        prompt.push_str(citation.source_text.trim_end());
        prompt.push('\n');
    }
    let _ = write!(prompt, "\nQuestion: {}\nAnswer:", question.trim());
    prompt
}
