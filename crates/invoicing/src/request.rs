use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice data supplied by the caller for one document.
///
/// Identifiers and dates are carried as opaque display strings; the pipeline
/// never interprets them beyond rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub organization_name: String,
    pub customer_id: String,
    pub customer_name: String,
    pub employee_id: String,
    pub employee_name: String,
    pub order_id: String,
    pub order_date: String,
    pub deadline: String,
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

/// One ordered line of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: String,
    pub item_name: String,
    pub quantity: u64,
    /// Unit price in major currency units (e.g. rupees, not paise).
    pub cost_per_unit: Decimal,
}

impl LineItem {
    /// `quantity × cost_per_unit`, or `None` when the product does not fit a `Decimal`.
    pub fn total(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.cost_per_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_is_quantity_times_unit_cost() {
        let item = LineItem {
            item_id: "I1".into(),
            item_name: "Widget".into(),
            quantity: 3,
            cost_per_unit: Decimal::from(50),
        };
        assert_eq!(item.total(), Some(Decimal::from(150)));
    }

    #[test]
    fn line_total_overflow_is_reported() {
        let item = LineItem {
            item_id: "I1".into(),
            item_name: "Widget".into(),
            quantity: u64::MAX,
            cost_per_unit: Decimal::from(10_000_000_000u64),
        };
        assert_eq!(item.total(), None);
    }

    #[test]
    fn request_uses_camel_case_field_names() {
        let request = InvoiceRequest {
            organization_name: "Acme".into(),
            customer_id: "C1".into(),
            customer_name: "Jane".into(),
            employee_id: "E1".into(),
            employee_name: "Sam".into(),
            order_id: "O1".into(),
            order_date: "2024-01-01".into(),
            deadline: "2024-01-15".into(),
            items: vec![],
            additional_notes: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["organizationName"], "Acme");
        assert_eq!(json["orderId"], "O1");
        assert!(json.get("additionalNotes").is_none());
    }
}
