use serde_json::Value;

/// Unit convention of a raw price field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceUnit {
    Cents,
    Units,
}

impl PriceUnit {
    pub fn from_cents_flag(divide_by_100: bool) -> Self {
        if divide_by_100 {
            Self::Cents
        } else {
            Self::Units
        }
    }
}

/// Renders a raw price as a decimal string, or empty when the value is absent
/// or not numeric. Arithmetic is done on the decimal text, never on floats.
pub fn normalize_price(raw: Option<&Value>, unit: PriceUnit) -> String {
    let Some(text) = raw.and_then(decimal_text) else {
        return String::new();
    };
    match unit {
        PriceUnit::Units => text,
        PriceUnit::Cents => shift_left(&text, 2).unwrap_or_default(),
    }
}

fn decimal_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Number(n) if n.is_f64() => format!("{:?}", n.as_f64()?),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    is_decimal(&text).then_some(text)
}

pub fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let mut parts = body.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match frac_part {
        Some(frac) => !frac.is_empty() && frac.chars().all(|c| c.is_ascii_digit()),
        None => true,
    }
}

/// Moves the decimal point `places` digits to the left, keeping at least one
/// fractional digit and no trailing zeros beyond it (`1000` -> `10.0`).
fn shift_left(text: &str, places: usize) -> Option<String> {
    if !is_decimal(text) {
        return None;
    }
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let mut digits = format!("{int_part}{frac_part}");
    let mut point = int_part.len();
    while point < places + 1 {
        digits.insert(0, '0');
        point += 1;
    }
    point -= places;

    let int_digits = digits[..point].trim_start_matches('0');
    let int_digits = if int_digits.is_empty() { "0" } else { int_digits };
    let frac_digits = digits[point..].trim_end_matches('0');
    let frac_digits = if frac_digits.is_empty() { "0" } else { frac_digits };

    let sign = if negative && (int_digits != "0" || frac_digits != "0") {
        "-"
    } else {
        ""
    };
    Some(format!("{sign}{int_digits}.{frac_digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cents_integer_becomes_decimal_units() {
        assert_eq!(normalize_price(Some(&json!(1000)), PriceUnit::Cents), "10.0");
        assert_eq!(normalize_price(Some(&json!(1234)), PriceUnit::Cents), "12.34");
        assert_eq!(normalize_price(Some(&json!(5)), PriceUnit::Cents), "0.05");
        assert_eq!(normalize_price(Some(&json!(0)), PriceUnit::Cents), "0.0");
    }

    #[test]
    fn cents_float_and_string_inputs() {
        assert_eq!(normalize_price(Some(&json!(99.5)), PriceUnit::Cents), "0.995");
        assert_eq!(normalize_price(Some(&json!("250000")), PriceUnit::Cents), "2500.0");
    }

    #[test]
    fn units_pass_through_as_decimal_text() {
        assert_eq!(normalize_price(Some(&json!(1000)), PriceUnit::Units), "1000");
        assert_eq!(normalize_price(Some(&json!(10.5)), PriceUnit::Units), "10.5");
        assert_eq!(normalize_price(Some(&json!(" 42.10 ")), PriceUnit::Units), "42.10");
    }

    #[test]
    fn invalid_or_missing_prices_are_empty() {
        assert_eq!(normalize_price(None, PriceUnit::Cents), "");
        assert_eq!(normalize_price(Some(&json!(null)), PriceUnit::Units), "");
        assert_eq!(normalize_price(Some(&json!("n/a")), PriceUnit::Units), "");
        assert_eq!(normalize_price(Some(&json!("12.")), PriceUnit::Cents), "");
        assert_eq!(normalize_price(Some(&json!(true)), PriceUnit::Units), "");
    }

    #[test]
    fn negative_amounts_keep_sign() {
        assert_eq!(normalize_price(Some(&json!(-150)), PriceUnit::Cents), "-1.5");
    }
}
