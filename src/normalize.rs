//! Conversions from raw listing text to canonical numeric values.
//!
//! Every function here is total: malformed input yields `None`, never a
//! panic or an error.

use std::sync::LazyLock;

use regex::Regex;

/// Values at or below this are read as millions of rupees.
const PRICE_SHORTHAND_LIMIT: f64 = 10_000.0;
const MILLION: f64 = 1_000_000.0;

const SQFT_PER_PERCH: f64 = 272.25;
const PERCHES_PER_ACRE: f64 = 40.0;
const PERCHES_PER_HECTARE: f64 = 395.37;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex is valid"));
static NEGOTIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)negotiable").expect("negotiable regex is valid"));
static MILLIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\s*[Mm](?:n|illion)?\b").expect("millions regex is valid")
});

/// Parse a displayed price into rupees plus the "negotiable" marker.
///
/// `"Rs 65,000,000Negotiable"` gives `(Some(65000000.0), true)` and
/// `"Rs 15.5 Mn"` gives `(Some(15500000.0), false)`.
pub fn parse_price(raw: &str) -> (Option<f64>, bool) {
    if raw.trim().is_empty() {
        return (None, false);
    }
    let s = raw.replace(',', "");
    let negotiable = NEGOTIABLE.is_match(&s);
    let s = NEGOTIABLE.replace_all(&s, "");
    let s = s.trim();

    if let Some(value) = MILLIONS
        .captures(s)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .filter(|v| v.is_finite())
    {
        return (Some(value * MILLION), negotiable);
    }

    let price = first_number(s).map(|value| {
        if value > PRICE_SHORTHAND_LIMIT {
            value
        } else {
            value * MILLION
        }
    });
    (price, negotiable)
}

/// First numeric token of the text, ignoring thousands separators.
/// `"4,500.0 sqft"` gives `4500.0`.
pub fn extract_numeric(raw: &str) -> Option<f64> {
    first_number(&raw.replace(',', ""))
}

fn first_number(s: &str) -> Option<f64> {
    NUMBER
        .find(s)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Land extent in perches. Acres, hectares and square units are converted;
/// untagged numbers are taken as perches already.
pub fn parse_land_size(raw: &str) -> Option<f64> {
    let value = extract_numeric(raw)?;
    let unit = raw.to_lowercase();

    let perches = if unit.contains("acre") {
        value * PERCHES_PER_ACRE
    } else if unit.contains("sq") || unit.contains("square") {
        value / SQFT_PER_PERCH
    } else if unit.contains("hectare") {
        value * PERCHES_PER_HECTARE
    } else {
        value
    };
    Some(round4(perches))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

const STOREY_PHRASES: [(u32, &[&str]); 4] = [
    (1, &["single story", "single storey", "1 story", "1 storey"]),
    (
        2,
        &["two story", "two storey", "2 story", "2 storey", "double story", "double storey"],
    ),
    (3, &["three story", "three storey", "3 story", "3 storey"]),
    (4, &["four story", "four storey", "4 story", "4 storey"]),
];

/// Storey count from the structured field, else inferred from the title.
pub fn parse_storeys(raw: &str, title: &str) -> Option<u32> {
    if let Some(n) = extract_numeric(raw).filter(|n| *n >= 1.0) {
        return Some(n as u32);
    }

    let title = title.to_lowercase();
    STOREY_PHRASES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| title.contains(p)))
        .map(|(count, _)| *count)
}

/// `"Piliyandala,"` becomes `"Piliyandala"`.
pub fn clean_location(raw: &str) -> String {
    raw.trim().trim_end_matches(',').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_with_negotiable_marker() {
        assert_eq!(parse_price("Rs 65,000,000Negotiable"), (Some(65_000_000.0), true));
        assert_eq!(parse_price("Rs 65,000,000 NEGOTIABLE"), (Some(65_000_000.0), true));
        assert_eq!(parse_price("Rs 92,500,000"), (Some(92_500_000.0), false));
    }

    #[test]
    fn price_in_millions() {
        assert_eq!(parse_price("Rs 15.5 Mn"), (Some(15_500_000.0), false));
        assert_eq!(parse_price("Rs 8 million negotiable"), (Some(8_000_000.0), true));
        assert_eq!(parse_price("Rs 12M"), (Some(12_000_000.0), false));
    }

    #[test]
    fn small_bare_price_is_treated_as_millions() {
        assert_eq!(parse_price("Rs 45"), (Some(45_000_000.0), false));
        assert_eq!(parse_price("Rs 10,000"), (Some(10_000_000_000.0), false));
        assert_eq!(parse_price("Rs 10,001"), (Some(10_001.0), false));
    }

    #[test]
    fn month_is_not_a_millions_suffix() {
        assert_eq!(parse_price("Rs 150,000 monthly"), (Some(150_000.0), false));
    }

    #[test]
    fn price_without_digits() {
        assert_eq!(parse_price(""), (None, false));
        assert_eq!(parse_price("Negotiable"), (None, true));
        assert_eq!(parse_price("Call for price"), (None, false));
    }

    #[test]
    fn land_size_conversions() {
        assert_eq!(parse_land_size("0.25 acres"), Some(10.0));
        assert_eq!(parse_land_size("2722.5 sqft"), Some(10.0));
        assert_eq!(parse_land_size("2,722.5 square feet"), Some(10.0));
        assert_eq!(parse_land_size("1 hectare"), Some(395.37));
        assert_eq!(parse_land_size("10.6 perches"), Some(10.6));
        assert_eq!(parse_land_size("1000 sq ft"), Some(3.6731));
    }

    #[test]
    fn land_size_without_number() {
        assert_eq!(parse_land_size(""), None);
        assert_eq!(parse_land_size("ask owner"), None);
    }

    #[test]
    fn numeric_extraction() {
        assert_eq!(extract_numeric("4,500.0 sqft"), Some(4500.0));
        assert_eq!(extract_numeric("4"), Some(4.0));
        assert_eq!(extract_numeric("10+"), Some(10.0));
        assert_eq!(extract_numeric("none"), None);
    }

    #[test]
    fn storeys_prefer_structured_field() {
        assert_eq!(parse_storeys("3", "Single story house"), Some(3));
        assert_eq!(parse_storeys("2.0", ""), Some(2));
    }

    #[test]
    fn storeys_inferred_from_title() {
        assert_eq!(parse_storeys("", "Brand new Two Storey house in Kottawa"), Some(2));
        assert_eq!(parse_storeys("", "Double story luxury villa"), Some(2));
        assert_eq!(parse_storeys("0", "Single storey house"), Some(1));
        assert_eq!(parse_storeys("", "3 story commercial building"), Some(3));
        assert_eq!(parse_storeys("", "Land for sale"), None);
    }

    #[test]
    fn location_cleanup() {
        assert_eq!(clean_location("  Piliyandala, "), "Piliyandala");
        assert_eq!(clean_location("Colombo 7,,"), "Colombo 7");
        assert_eq!(clean_location(""), "");
    }
}
