//! Line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on an invoice. `amount` is always the stored product of
/// `quantity * unit_price`; caller-supplied amounts are discarded.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub amount: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for a line item on create/update.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub sort_order: i32,
}

impl NewLineItem {
    /// The stored amount, recomputed from quantity and unit price.
    pub fn amount(&self) -> Decimal {
        self.quantity * self.unit_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_is_quantity_times_unit_price() {
        let item = NewLineItem {
            description: "Rent".to_string(),
            quantity: Decimal::from(2),
            unit_price: "499.50".parse().unwrap(),
            tax_rate: Decimal::ZERO,
            sort_order: 0,
        };
        assert_eq!(item.amount(), "999.00".parse::<Decimal>().unwrap());
    }
}
