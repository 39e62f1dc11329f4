//! Utility functions for identifiers and text

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{MarketError, MarketResult};

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Same as [`new_uuid_to_bech32`] for the fixed prefixes the engine uses.
pub(crate) fn new_id(hrp: &str) -> MarketResult<String> {
    new_uuid_to_bech32(hrp).map_err(|e| MarketError::Codec(format!("id generation: {e}")))
}

/// Cut `text` to at most `budget` characters, appending an ellipsis when cut.
pub fn preview(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("camión", 10), "camión");
        assert_eq!(preview("camión grande", 6), "camión...");
        assert_eq!(preview("", 3), "");
    }
}
