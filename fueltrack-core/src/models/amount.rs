use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a user-supplied amount. Returns `None` for empty, non-numeric or
/// non-finite input.
pub fn parse_amount(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads a numeric document field leniently.
///
/// Numbers and numeric strings are accepted; `null`, missing, unparseable and
/// non-finite values read as 0.
pub(crate) fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let amount = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_amount(&s).unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(if amount.is_finite() { amount } else { 0.0 })
}
