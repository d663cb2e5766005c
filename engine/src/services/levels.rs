// Lenient scan for price levels in free-form agent output.
use std::sync::LazyLock;

use regex::Regex;

// A number directly followed by a colon, e.g. "142.5: double bottom".
static RE_LEVEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?):").unwrap());

/// Price levels in text order. Malformed or absent levels are skipped; no match is not an error.
pub fn extract_price_levels(text: &str) -> Vec<f64> {
    RE_LEVEL
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}
