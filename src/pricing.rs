// src/pricing.rs
//! Cart pricing shared by sale registration and the quote endpoint.

use serde::Serialize;
use crate::dtos::sale::SaleLineRequest;
use crate::error::AppError;
use crate::money::{compute_tax, Money, TaxBreakdown, TaxRate};

/// Largest accepted gap between a client-side price and the catalog price.
pub const PRICE_TOLERANCE: Money = Money::from_cents(1);

/// The authoritative catalog data for one product at sale time.
#[derive(Debug, Clone)]
pub struct CatalogPrice {
    pub product_id: i64,
    pub name: String,
    pub sale_price: Money,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Money,
    pub discount: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub lines: Vec<PricedLine>,
    /// Sum of line totals before any tax treatment.
    pub gross_lines: Money,
    pub tax_included: bool,
    pub tax_rate: TaxRate,
    #[serde(flatten)]
    pub breakdown: TaxBreakdown,
}

/// Shape checks that need no catalog lookup.
pub fn validate_cart(items: &[SaleLineRequest]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::validation("Sale must contain at least one item"));
    }
    for (idx, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(AppError::validation(format!("Line {}: quantity must be greater than 0", idx + 1)));
        }
        if item.discount.is_some_and(Money::is_negative) {
            return Err(AppError::validation(format!("Line {}: discount cannot be negative", idx + 1)));
        }
    }
    Ok(())
}

/// Prices one line from the catalog, rejecting stale or tampered client prices.
pub fn price_line(line: &SaleLineRequest, catalog: &CatalogPrice) -> Result<PricedLine, AppError> {
    if !catalog.is_active {
        return Err(AppError::validation(format!("Product '{}' is inactive", catalog.name)));
    }

    let unit_price = catalog.sale_price;
    if let Some(submitted) = line.price {
        if submitted.abs_diff(unit_price) > PRICE_TOLERANCE.cents() {
            return Err(AppError::validation(format!(
                "Price for '{}' changed: submitted {}, current {}",
                catalog.name, submitted, unit_price
            )));
        }
    }

    let discount = line.discount.unwrap_or(Money::ZERO);
    if discount > unit_price {
        return Err(AppError::validation(format!(
            "Discount for '{}' exceeds its price",
            catalog.name
        )));
    }

    let line_total = (unit_price - discount)
        .checked_mul(line.quantity)
        .ok_or_else(amount_too_large)?;

    Ok(PricedLine {
        product_id: catalog.product_id,
        quantity: line.quantity,
        unit_price,
        discount,
        line_total,
    })
}

pub fn build_quote(lines: Vec<PricedLine>, tax_included: bool, tax_rate: TaxRate) -> Result<Quote, AppError> {
    let gross_lines = Money::checked_sum(lines.iter().map(|l| l.line_total)).ok_or_else(amount_too_large)?;
    let breakdown = compute_tax(gross_lines, tax_included, tax_rate).ok_or_else(amount_too_large)?;
    Ok(Quote {
        breakdown,
        lines,
        gross_lines,
        tax_included,
        tax_rate,
    })
}

pub fn amount_too_large() -> AppError {
    AppError::validation("Amount too large")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: i64, quantity: i32, price: Option<i64>, discount: Option<i64>) -> SaleLineRequest {
        SaleLineRequest {
            product_id,
            quantity,
            price: price.map(Money::from_cents),
            discount: discount.map(Money::from_cents),
        }
    }

    fn catalog(product_id: i64, cents: i64) -> CatalogPrice {
        CatalogPrice {
            product_id,
            name: format!("Product {product_id}"),
            sale_price: Money::from_cents(cents),
            is_active: true,
        }
    }

    #[test]
    fn rejects_empty_cart() {
        let err = validate_cart(&[]).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert!(validate_cart(&[line(1, 0, None, None)]).is_err());
        assert!(validate_cart(&[line(1, -2, None, None)]).is_err());
        assert!(validate_cart(&[line(1, 1, None, None)]).is_ok());
    }

    #[test]
    fn rejects_negative_discount() {
        assert!(validate_cart(&[line(1, 1, None, Some(-100))]).is_err());
    }

    #[test]
    fn uses_catalog_price_not_client_price() {
        let priced = price_line(&line(1, 2, None, None), &catalog(1, 15_000)).unwrap();
        assert_eq!(priced.unit_price, Money::from_cents(15_000));
        assert_eq!(priced.line_total, Money::from_cents(30_000));
    }

    #[test]
    fn accepts_client_price_within_a_cent() {
        assert!(price_line(&line(1, 1, Some(14_999), None), &catalog(1, 15_000)).is_ok());
        let err = price_line(&line(1, 1, Some(100), None), &catalog(1, 15_000)).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn rejects_inactive_product_and_oversized_discount() {
        let mut inactive = catalog(1, 1_000);
        inactive.is_active = false;
        assert!(price_line(&line(1, 1, None, None), &inactive).is_err());
        assert!(price_line(&line(1, 1, None, Some(1_001)), &catalog(1, 1_000)).is_err());
    }

    #[test]
    fn subtotal_is_sum_of_discounted_lines() {
        let lines = vec![
            price_line(&line(1, 3, None, Some(500)), &catalog(1, 2_000)).unwrap(),
            price_line(&line(2, 1, None, None), &catalog(2, 1_250)).unwrap(),
        ];
        let quote = build_quote(lines, false, TaxRate::ZERO).unwrap();
        // 3 * (20.00 - 5.00) + 12.50
        assert_eq!(quote.gross_lines, Money::from_cents(5_750));
        assert_eq!(quote.breakdown.total, Money::from_cents(5_750));
    }

    #[test]
    fn receipt_example_with_tax_included() {
        let lines = vec![
            price_line(&line(1, 1, Some(15_000), Some(0)), &catalog(1, 15_000)).unwrap(),
            price_line(&line(2, 1, Some(12_000), Some(0)), &catalog(2, 12_000)).unwrap(),
        ];
        let quote = build_quote(lines, true, TaxRate::from_bps(1900)).unwrap();
        assert_eq!(quote.breakdown.total, Money::from_cents(27_000));
        assert_eq!(quote.breakdown.tax_amount, Money::from_cents(4_311));
        assert_eq!(quote.breakdown.subtotal, Money::from_cents(22_689));
    }

    #[test]
    fn oversized_line_is_a_validation_error() {
        let mut pricey = catalog(1, 0);
        pricey.sale_price = Money::from_decimal(5e13).unwrap();
        let err = price_line(&line(1, 2000, None, None), &pricey).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref m) if m == "Amount too large"));
    }

    #[test]
    fn oversized_cart_total_is_a_validation_error() {
        let big = Money::from_cents(i64::MAX / 2 + 1);
        let lines = (1..=2)
            .map(|id| PricedLine { product_id: id, quantity: 1, unit_price: big, discount: Money::ZERO, line_total: big })
            .collect();
        assert!(matches!(build_quote(lines, true, TaxRate::ZERO), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn quote_serializes_flat_totals() {
        let lines = vec![price_line(&line(1, 1, None, None), &catalog(1, 10_000)).unwrap()];
        let quote = build_quote(lines, false, TaxRate::from_bps(1900)).unwrap();
        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["taxAmount"], 19.0);
        assert_eq!(json["total"], 119.0);
        assert_eq!(json["taxRate"], 0.19);
        assert_eq!(json["lines"][0]["productId"], 1);
    }
}
