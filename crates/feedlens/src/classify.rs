//! Status classification over entry text and markup.
//!
//! Classification is transient by design: the host can rewrite an entry's
//! content between renders, so results are recomputed on every scan and
//! never cached.

use regex::Regex;
use std::sync::LazyLock;

/// Pattern tables for one status word. Each pattern is tried against both
/// the flattened text and the raw markup; any single hit counts.
fn status_patterns(word: &str) -> Vec<Regex> {
    let sources = [
        // "<word> · $30": the status label directly adjacent to a price
        // separator.
        format!(r"(?i)\b{word}\s*[·•]\s*\$"),
        // Trailing status label.
        format!(r"(?i)\b{word}\s*$"),
        // Leading status label.
        format!(r"(?i)^{word}\b"),
        // Status rendered as an isolated inline element; invisible once the
        // markup is flattened next to unrelated text.
        format!(r"(?i)<[^>]*>\s*{word}\s*<"),
    ];
    sources
        .iter()
        .map(|src| Regex::new(src).expect("static status pattern"))
        .collect()
}

static SOLD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| status_patterns("sold"));
static PENDING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| status_patterns("pending"));

/// Currency-shaped token, e.g. `$1,250` or `$19.99`.
static CURRENCY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[\d,]+(\.\d{2})?").expect("static currency pattern"));

/// Outcome of classifying one entry's current content.
///
/// The booleans are independent: both may be true when an entry's text and
/// markup match conflicting patterns. Only the visibility rule order
/// arbitrates between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub is_sold: bool,
    pub is_pending: bool,
}

impl Classification {
    pub fn is_clean(&self) -> bool {
        !self.is_sold && !self.is_pending
    }
}

/// Classify an entry from its flattened text and raw markup.
pub fn classify(text: &str, markup: &str) -> Classification {
    let hit = |patterns: &[Regex]| {
        patterns
            .iter()
            .any(|p| p.is_match(text) || p.is_match(markup))
    };
    Classification {
        is_sold: hit(&SOLD_PATTERNS),
        is_pending: hit(&PENDING_PATTERNS),
    }
}

/// Whether the text contains a currency-shaped token. Part of the "looks
/// like a whole entry" signature used by the locator.
pub fn has_price_token(text: &str) -> bool {
    CURRENCY_TOKEN.is_match(text)
}

/// Derive a searchable title: strip currency tokens, collapse whitespace.
pub fn display_title(text: &str) -> String {
    let stripped = CURRENCY_TOKEN.replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the first currency token out of the text, e.g. `$1,250` -> 1250.0.
pub fn first_price(text: &str) -> Option<f64> {
    let token = CURRENCY_TOKEN.find(text)?;
    token
        .as_str()
        .trim_start_matches('$')
        .replace(',', "")
        .parse()
        .ok()
}
