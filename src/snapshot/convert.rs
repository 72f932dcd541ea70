use bigdecimal::BigDecimal;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Rewrites one field of the output payload, addressed by a dotted path
/// from the payload root ("secureCollateralThreshold",
/// "pricing.info.maturityDate", array steps by index).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversionRule {
    pub path: String,
    #[serde(flatten)]
    pub op: Converter,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Converter {
    /// Hex-encoded bytes to the text they spell.
    HexToUtf8,
    /// Hex (or decimal) integer to a decimal string, shifted down by
    /// `scale` digits.
    HexToDecimal {
        #[serde(default)]
        scale: u32,
    },
    /// Unix seconds to a `YYYY-MM-DD` date.
    UnixToIsoDate,
}

/// Apply the profile's conversion rules to a payload. A field a rule
/// cannot convert (wrong type, malformed hex) is left as it was; a rule
/// whose path never matches simply does nothing.
pub fn apply_conversions(payload: &mut Value, rules: &[ConversionRule]) {
    if rules.is_empty() {
        return;
    }
    walk(payload, rules, "");
}

fn walk(value: &mut Value, rules: &[ConversionRule], path: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                visit(child, rules, &child_path(path, key));
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                visit(child, rules, &child_path(path, &index.to_string()));
            }
        }
        _ => {}
    }
}

fn visit(value: &mut Value, rules: &[ConversionRule], path: &str) {
    if let Some(rule) = rules.iter().find(|rule| rule.path == path) {
        match convert(&rule.op, value) {
            Some(converted) => *value = converted,
            None => {
                tracing::debug!(path, "Conversion did not apply, leaving field unchanged");
            }
        }
    } else {
        walk(value, rules, path);
    }
}

fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn convert(op: &Converter, value: &Value) -> Option<Value> {
    match op {
        Converter::HexToUtf8 => hex_to_utf8(value),
        Converter::HexToDecimal { scale } => hex_to_decimal(value, *scale),
        Converter::UnixToIsoDate => unix_to_iso_date(value),
    }
}

fn hex_to_utf8(value: &Value) -> Option<Value> {
    let text = value.as_str()?.strip_prefix("0x")?;
    let bytes = hex::decode(text).ok()?;
    Some(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

fn hex_to_decimal(value: &Value, scale: u32) -> Option<Value> {
    let raw = match value {
        Value::String(text) => match text.strip_prefix("0x") {
            Some(digits) => BigDecimal::from(u128::from_str_radix(digits, 16).ok()?),
            None => BigDecimal::from_str(text).ok()?,
        },
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok()?,
        _ => return None,
    };
    let scaled = match scale {
        0 => raw,
        _ => raw / BigDecimal::from(10u128.checked_pow(scale)?),
    };
    Some(Value::String(scaled.normalized().to_string()))
}

fn unix_to_iso_date(value: &Value) -> Option<Value> {
    let secs = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.parse().ok()?,
        _ => return None,
    };
    let timestamp = DateTime::from_timestamp(secs, 0)?;
    Some(Value::String(
        timestamp.date_naive().format("%Y-%m-%d").to_string(),
    ))
}
