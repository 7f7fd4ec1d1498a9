//! Length caps applied to free-text inputs as the user types.

pub const TITLE_MAX_CHARS: usize = 100;
pub const CONDITION_MAX_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const TRADE_MESSAGE_MAX_CHARS: usize = 500;

/// Keeps at most `max` characters (not bytes) of `value`.
pub fn clamp_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
