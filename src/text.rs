//! Context bounding for provider prompts.
//!
//! Documents often carry their key material at both ends (introductions
//! and conclusions), so long contexts keep a head and a tail rather than
//! just a prefix. Lengths are counted in `char`s.

/// Token budget used when the caller gives none.
pub const DEFAULT_MAX_TOKENS: usize = 30_000;

/// Characters per token in the budget heuristic.
pub const CHARS_PER_TOKEN: usize = 4;

/// Share of the budget taken from the start of the text, in percent.
const HEAD_SHARE_PERCENT: usize = 70;

/// Budgets at or below this many chars use plain head truncation.
const MIN_SPLIT_BUDGET: usize = 200;

const MIDDLE_MARKER: &str = "\n\n[... content truncated ...]\n\n";
const TAIL_MARKER: &str = "\n\n[... truncated]";

/// Bound `text` to a character budget.
///
/// `max_length` wins when given; otherwise the budget is
/// `max_tokens * 4`. Text that fits is returned unchanged. The result
/// never exceeds the budget.
pub fn truncate_context(text: &str, max_length: Option<usize>, max_tokens: usize) -> String {
    let budget = max_length.unwrap_or_else(|| max_tokens.saturating_mul(CHARS_PER_TOKEN));
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }

    let middle = MIDDLE_MARKER.chars().count();
    if budget > MIN_SPLIT_BUDGET && budget > middle {
        let available = budget - middle;
        let head = available * HEAD_SHARE_PERCENT / 100;
        let tail = available - head;
        let mut out = String::with_capacity(text.len().min(budget * 4));
        out.push_str(prefix(text, head));
        out.push_str(MIDDLE_MARKER);
        out.push_str(suffix(text, total, tail));
        return out;
    }

    let marker = TAIL_MARKER.chars().count();
    if budget > marker {
        format!("{}{TAIL_MARKER}", prefix(text, budget - marker))
    } else {
        prefix(text, budget).to_string()
    }
}

/// First `n` chars of `text`.
fn prefix(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// Last `n` chars of `text`, which holds `total` chars.
fn suffix(text: &str, total: usize, n: usize) -> &str {
    let skip = total.saturating_sub(n);
    match text.char_indices().nth(skip) {
        Some((i, _)) => &text[i..],
        None => "",
    }
}
