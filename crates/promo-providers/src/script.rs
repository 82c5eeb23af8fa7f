//! Avatar script length policy.
//!
//! Provider A enforces script length bounds. Submission must never fail
//! solely for length, so scripts are clamped here: short scripts get a
//! closing sentence appended, long scripts are truncated at a word boundary
//! with an ellipsis.

/// Minimum accepted script length, in characters.
pub const MIN_SCRIPT_CHARS: usize = 40;

/// Maximum accepted script length, in characters.
pub const MAX_SCRIPT_CHARS: usize = 1500;

/// Appended to scripts below the minimum.
const CLOSING_SENTENCE: &str = " Check out this product today and see the difference for yourself.";

/// Clamp a script into the provider's accepted length range.
pub fn clamp_script(script: &str) -> String {
    let mut script = script.trim().to_string();

    if script.chars().count() < MIN_SCRIPT_CHARS {
        script.push_str(CLOSING_SENTENCE);
        return script;
    }

    if script.chars().count() > MAX_SCRIPT_CHARS {
        return truncate_with_ellipsis(&script, MAX_SCRIPT_CHARS);
    }

    script
}

/// Truncate to at most `max_chars` characters (ellipsis included), breaking
/// at a word boundary when one exists.
fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let budget = max_chars.saturating_sub(1);
    let cut: String = s.chars().take(budget).collect();

    let trimmed = match cut.rfind(char::is_whitespace) {
        // Keep the boundary cut unless it would throw away most of the text.
        Some(idx) if idx > budget / 2 => cut[..idx].trim_end().to_string(),
        _ => cut,
    };

    format!("{}…", trimmed)
}
