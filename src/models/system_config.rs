use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub const TAX_RATE_KEY: &str = "tax.rate";
pub const TAX_INCLUDED_KEY: &str = "tax.included";

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Store-wide tax defaults used when a sale request leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxDefaults {
    pub tax_included: bool,
    pub tax_rate: crate::money::TaxRate,
}

impl Default for TaxDefaults {
    fn default() -> Self {
        Self { tax_included: true, tax_rate: crate::money::TaxRate::ZERO }
    }
}

impl TaxDefaults {
    /// Unparseable values fall back to the defaults with a warning.
    pub fn from_values(rate: Option<&str>, included: Option<&str>) -> Self {
        let mut defaults = Self::default();

        if let Some(raw) = rate {
            match parse_tax_rate(raw) {
                Some(parsed) => defaults.tax_rate = parsed,
                None => tracing::warn!(value = raw, "Ignoring invalid {TAX_RATE_KEY} setting"),
            }
        }

        if let Some(raw) = included {
            match parse_tax_included(raw) {
                Some(parsed) => defaults.tax_included = parsed,
                None => tracing::warn!(value = raw, "Ignoring invalid {TAX_INCLUDED_KEY} setting"),
            }
        }

        defaults
    }
}

/// `tax.rate` is stored as a fraction, e.g. `0.19`.
pub fn parse_tax_rate(raw: &str) -> Option<crate::money::TaxRate> {
    raw.trim().parse::<f64>().ok().and_then(crate::money::TaxRate::from_fraction)
}

pub fn parse_tax_included(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::TaxRate;

    #[test]
    fn parses_stored_tax_settings() {
        let d = TaxDefaults::from_values(Some("0.19"), Some("false"));
        assert_eq!(d.tax_rate, TaxRate::from_bps(1900));
        assert!(!d.tax_included);
    }

    #[test]
    fn falls_back_on_garbage() {
        let d = TaxDefaults::from_values(Some("nineteen"), Some("maybe"));
        assert_eq!(d, TaxDefaults::default());
        let d = TaxDefaults::from_values(Some("1.5"), None);
        assert_eq!(d.tax_rate, TaxRate::ZERO);
    }

    #[test]
    fn tax_value_parsers() {
        assert_eq!(parse_tax_rate(" 0.16 "), Some(TaxRate::from_bps(1600)));
        assert_eq!(parse_tax_rate("19%"), None);
        assert_eq!(parse_tax_included("YES"), Some(true));
        assert_eq!(parse_tax_included("si"), None);
    }

    #[test]
    fn missing_settings_use_defaults() {
        assert_eq!(TaxDefaults::from_values(None, None), TaxDefaults::default());
    }
}
