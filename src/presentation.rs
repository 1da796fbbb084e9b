//! Storage-side recoding of raw registry values.
//!
//! Everything here runs after fingerprinting and never feeds back into a key.

use std::str::FromStr;

use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{
    data::{Value, parse_naive_date},
    normalize::non_null,
    schema::Presentation,
};

pub fn present(presentation: Presentation, raw: Option<&str>) -> Option<Value> {
    match presentation {
        Presentation::Text => non_null(raw).map(Value::Text),
        Presentation::Sex => sex_code(raw).map(Value::Char),
        Presentation::Age => parse_age(raw).map(Value::Integer),
        Presentation::MaritalStatus => marital_status(raw).map(Value::Text),
        Presentation::Flag => tri_state(raw).map(Value::Boolean),
        Presentation::Integer => parse_integer(raw).map(Value::Integer),
        Presentation::Date => non_null(raw)
            .and_then(|v| parse_naive_date(&v).ok())
            .map(Value::Date),
    }
}

/// `M`/`F` by substring on the uppercased value.
pub fn sex_code(raw: Option<&str>) -> Option<char> {
    let upper = non_null(raw)?.to_uppercase();
    if upper.contains("MASC") {
        Some('M')
    } else if upper.contains("FEM") {
        Some('F')
    } else {
        None
    }
}

/// Registry ages; the infant bucket `0-1` counts as zero.
pub fn parse_age(raw: Option<&str>) -> Option<i64> {
    let value = non_null(raw)?;
    if value == "0-1" {
        return Some(0);
    }
    parse_integer(Some(&value))
}

/// `0` encodes "no information" in the marital status code list.
pub fn marital_status(raw: Option<&str>) -> Option<String> {
    non_null(raw).filter(|value| value != "0")
}

pub fn tri_state(raw: Option<&str>) -> Option<bool> {
    let upper = non_null(raw)?.to_uppercase();
    if upper.contains("SIM") || upper == "1" {
        Some(true)
    } else if upper.contains("NAO") || upper.contains("NÃO") || upper == "2" {
        Some(false)
    } else {
        None
    }
}

/// Integers, also accepting integral decimal renderings such as `45.0`.
pub fn parse_integer(raw: Option<&str>) -> Option<i64> {
    let value = non_null(raw)?;
    if let Ok(parsed) = value.parse::<i64>() {
        return Some(parsed);
    }
    let decimal = Decimal::from_str(&value).ok()?;
    if decimal.fract().is_zero() {
        decimal.to_i64()
    } else {
        None
    }
}

/// Monetary amounts; a lone comma is read as the decimal separator.
pub fn parse_money(raw: Option<&str>) -> Option<Decimal> {
    let value = non_null(raw)?;
    let candidate = if value.contains(',') && !value.contains('.') {
        value.replace(',', ".")
    } else {
        value
    };
    Decimal::from_str(&candidate)
        .or_else(|_| Decimal::from_scientific(&candidate))
        .ok()
}

pub fn multiple_tumors(raw: Option<&str>) -> Option<bool> {
    match non_null(raw)?.as_str() {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}
