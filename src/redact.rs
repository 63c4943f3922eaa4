//! Log-safe renderings of identifiers and secrets.
//!
//! Request ids double as correlation secrets, so log lines only ever carry a
//! short suffix of them.

const VISIBLE_SUFFIX: usize = 4;

/// Keep only the last few characters of an identifier: `…a1b2`.
pub fn mask_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= VISIBLE_SUFFIX * 2 {
        return "****".to_string();
    }
    let suffix: String = chars[chars.len() - VISIBLE_SUFFIX..].iter().collect();
    format!("…{}", suffix)
}

/// Secrets never appear in logs, not even partially.
pub fn mask_secret(_secret: &str) -> &'static str {
    "****"
}
