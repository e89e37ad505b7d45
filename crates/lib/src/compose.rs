//! Reply composer: turns a translation into the text sent back to the user.

use crate::translate::TranslationResult;

/// First line of the reply when the provider produced nothing.
pub const NO_TRANSLATION_NOTICE: &str = "(no translation was produced)";

/// The text reply for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedReply {
    pub display_text: String,
}

/// One item per line: target text, transliteration (when present), source text.
pub fn compose(result: &TranslationResult) -> ComposedReply {
    let target = result.target_text.trim();
    let mut lines: Vec<&str> = Vec::with_capacity(3);
    lines.push(if target.is_empty() {
        NO_TRANSLATION_NOTICE
    } else {
        target
    });
    if let Some(t) = result.transliteration.as_deref().map(str::trim) {
        if !t.is_empty() {
            lines.push(t);
        }
    }
    lines.push(result.source_text.trim());
    ComposedReply {
        display_text: lines.join("\n"),
    }
}
