use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

pub const DEFAULT_FROM_TOKEN: &str = "HBAR";
pub const DEFAULT_TO_TOKEN: &str = "USDC";

/// Token symbols the query parser recognizes
pub const KNOWN_TOKENS: &[&str] = &[
    "HBAR", "WHBAR", "USDC", "USDT", "DAI", "SAUCE", "XSAUCE", "HBARX", "WETH", "WBTC",
];

/// Decimal places used for synthetic route outputs
pub const OUTPUT_DECIMALS: u32 = 6;

static AMOUNT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9]+\.?[0-9]*)\s*([A-Z]{2,6})\b").expect("valid regex"));

static TARGET_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:to|for|into)\s+([A-Z]{2,6})\b").expect("valid regex"));

/// Swap parameters extracted from free text
#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuery {
    pub amount: Decimal,
    pub from: String,
    pub to: String,
}

impl Default for SwapQuery {
    fn default() -> Self {
        Self {
            amount: Decimal::ONE,
            from: DEFAULT_FROM_TOKEN.to_string(),
            to: DEFAULT_TO_TOKEN.to_string(),
        }
    }
}

/// Best-effort parse of a request like "swap 10 HBAR to USDC".
///
/// Unknown symbols, a missing amount, or a pair that collapses to a single
/// token fall back to the defaults (1 HBAR -> USDC).
pub fn parse_swap_query(query: &str) -> SwapQuery {
    let mut parsed = SwapQuery::default();

    if let Some(caps) = AMOUNT_TOKEN.captures(query) {
        if let Ok(amount) = Decimal::from_str(caps[1].trim_end_matches('.')) {
            if amount > Decimal::ZERO {
                parsed.amount = amount;
            }
        }
        if let Some(symbol) = known_token(&caps[2]) {
            parsed.from = symbol;
        }
    }

    if let Some(symbol) = TARGET_TOKEN
        .captures(query)
        .and_then(|caps| known_token(&caps[1]))
    {
        parsed.to = symbol;
    }

    if parsed.from == parsed.to {
        parsed.from = DEFAULT_FROM_TOKEN.to_string();
        parsed.to = DEFAULT_TO_TOKEN.to_string();
    }

    parsed
}

fn known_token(symbol: &str) -> Option<String> {
    let upper = symbol.to_ascii_uppercase();
    KNOWN_TOKENS.contains(&upper.as_str()).then_some(upper)
}

/// `amount * factor` rounded half away from zero to six decimal places,
/// keeping trailing zeros so it prints as e.g. "9.850000".
/// Products beyond the decimal range saturate at `Decimal::MAX` / `Decimal::MIN`.
pub fn scale_amount(amount: Decimal, factor: Decimal) -> Decimal {
    let mut scaled = amount
        .saturating_mul(factor)
        .round_dp_with_strategy(OUTPUT_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    scaled.rescale(OUTPUT_DECIMALS);
    scaled
}

/// Read a decimal from a JSON number or numeric string
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// Read an f64 from a JSON number or numeric string
pub fn f64_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First present, non-null field among `keys`
pub fn first_field<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_structured_sentence() {
        let query = parse_swap_query("swap 10 HBAR to USDC");
        assert_eq!(query.amount, dec("10"));
        assert_eq!(query.from, "HBAR");
        assert_eq!(query.to, "USDC");
    }

    #[test]
    fn test_parse_decimal_and_case() {
        let query = parse_swap_query("please trade 2.5 sauce into hbar");
        assert_eq!(query.amount, dec("2.5"));
        assert_eq!(query.from, "SAUCE");
        assert_eq!(query.to, "HBAR");
    }

    #[test]
    fn test_parse_unrecognized_defaults() {
        assert_eq!(parse_swap_query("what's up"), SwapQuery::default());
        assert_eq!(parse_swap_query(""), SwapQuery::default());
    }

    #[test]
    fn test_parse_unknown_symbol_keeps_amount() {
        let query = parse_swap_query("swap 7 FOOBAR");
        assert_eq!(query.amount, dec("7"));
        assert_eq!(query.from, "HBAR");
        assert_eq!(query.to, "USDC");
    }

    #[test]
    fn test_parse_same_token_falls_back() {
        let query = parse_swap_query("swap 3 USDC to USDC");
        assert_eq!(query.amount, dec("3"));
        assert_eq!(query.from, "HBAR");
        assert_eq!(query.to, "USDC");
    }

    #[test]
    fn test_parse_zero_amount() {
        assert_eq!(parse_swap_query("swap 0 HBAR to USDC").amount, Decimal::ONE);
    }

    #[test]
    fn test_scale_amount() {
        assert_eq!(scale_amount(dec("10"), dec("0.985")).to_string(), "9.850000");
        assert_eq!(scale_amount(dec("10"), dec("0.98")).to_string(), "9.800000");
        assert_eq!(scale_amount(dec("0.0000015"), dec("1")).to_string(), "0.000002");
        assert_eq!(scale_amount(Decimal::MAX, dec("2")), Decimal::MAX);
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!(9.8)), Some(dec("9.8")));
        assert_eq!(decimal_from_json(&json!("9.850000")), Some(dec("9.85")));
        assert_eq!(decimal_from_json(&json!("1e-3")), Some(dec("0.001")));
        assert_eq!(decimal_from_json(&json!(null)), None);
        assert_eq!(decimal_from_json(&json!("lots")), None);
    }

    #[test]
    fn test_first_field() {
        let record = json!({"output": null, "out": "5"});
        assert_eq!(first_field(&record, &["estimatedOut", "output", "out"]), Some(&json!("5")));
        assert_eq!(first_field(&record, &["missing"]), None);
    }
}
