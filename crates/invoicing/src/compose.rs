//! Template composition: builds the render context and resolves the template.

use rust_decimal::Decimal;
use serde_json::{Map, Value, json};

use nightshift_core::PipelineResult;

use crate::money::{format_amount, format_money};
use crate::normalize::NormalizedInvoice;
use crate::template::{Part, Placeholder, Template};

/// What to do when a scalar placeholder has no (or a blank) backing value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MissingValuePolicy {
    /// Substitute an empty string.
    #[default]
    RenderEmpty,
    /// Fail the request with a composition error naming the placeholder.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionOptions {
    pub currency_symbol: String,
    pub missing_values: MissingValuePolicy,
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            currency_symbol: "₹".to_string(),
            missing_values: MissingValuePolicy::RenderEmpty,
        }
    }
}

/// Resolves a [`Template`] against one invoice.
///
/// Every interpolated value is HTML-escaped by the template engine; caller
/// text never reaches the markup raw.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    options: CompositionOptions,
}

impl Compositor {
    pub fn new(options: CompositionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompositionOptions {
        &self.options
    }

    /// Produce fully resolved markup.
    ///
    /// Under [`MissingValuePolicy::Fail`] blank values are left out of the
    /// context, so the strict-mode registry refuses any placeholder that uses one.
    pub fn compose(&self, template: &Template, invoice: &NormalizedInvoice) -> PipelineResult<String> {
        let rows: Vec<Value> = invoice
            .lines
            .iter()
            .map(|line| {
                json!({
                    "itemId": line.item.item_id,
                    "itemName": line.item.item_name,
                    "quantity": line.item.quantity.to_string(),
                    "costPerUnit": self.money(line.item.cost_per_unit),
                    "itemTotal": self.money(line.item_total),
                })
            })
            .collect();

        let notes = match invoice.notes() {
            Some(notes) => template.render(Part::NotesSection, &json!({ "notes": notes }))?,
            None => String::new(),
        };

        let mut data = Map::new();
        for placeholder in Placeholder::ALL {
            match scalar_value(invoice, placeholder) {
                Some(value) => {
                    data.insert(placeholder.token().to_string(), Value::String(value.to_string()));
                }
                None if self.options.missing_values == MissingValuePolicy::RenderEmpty => {
                    data.insert(placeholder.token().to_string(), Value::String(String::new()));
                }
                None => {}
            }
        }
        data.insert(
            Placeholder::Items.token().to_string(),
            Value::String(template.render(Part::ItemRows, &json!({ "lines": rows }))?),
        );
        data.insert(
            Placeholder::TotalAmount.token().to_string(),
            Value::String(self.money(invoice.total_amount)),
        );
        data.insert(Placeholder::NotesSection.token().to_string(), Value::String(notes));

        template.render(Part::Document, &Value::Object(data))
    }

    fn money(&self, amount: Decimal) -> String {
        if self.options.currency_symbol.is_empty() {
            format_amount(amount)
        } else {
            format_money(&self.options.currency_symbol, amount)
        }
    }
}

/// Backing value of a scalar placeholder; blank values count as missing.
fn scalar_value(invoice: &NormalizedInvoice, placeholder: Placeholder) -> Option<&str> {
    let r = &invoice.request;
    let value = match placeholder {
        Placeholder::OrganizationName => &r.organization_name,
        Placeholder::CustomerId => &r.customer_id,
        Placeholder::CustomerName => &r.customer_name,
        Placeholder::EmployeeId => &r.employee_id,
        Placeholder::EmployeeName => &r.employee_name,
        Placeholder::OrderId => &r.order_id,
        Placeholder::OrderDate => &r.order_date,
        Placeholder::Deadline => &r.deadline,
        Placeholder::Items | Placeholder::TotalAmount | Placeholder::NotesSection => return None,
    };
    Some(value.as_str()).filter(|v| !v.trim().is_empty())
}
