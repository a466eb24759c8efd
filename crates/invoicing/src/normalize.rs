//! Payload validation and total computation.
//!
//! Works on the raw `serde_json::Value` rather than deserializing straight into
//! [`InvoiceRequest`] so that every failure names the exact offending field
//! (`orderId`, `items[2].quantity`).

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

use nightshift_core::{PipelineError, PipelineResult};

use crate::request::{InvoiceRequest, LineItem};

/// A line item with its computed total.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLine {
    pub item: LineItem,
    pub item_total: Decimal,
}

/// Validated invoice data plus derived monetary totals.
///
/// Lives for a single request only.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedInvoice {
    pub request: InvoiceRequest,
    pub lines: Vec<NormalizedLine>,
    /// Always the exact sum of `lines[..].item_total`.
    pub total_amount: Decimal,
}

impl NormalizedInvoice {
    /// Build from an already-typed request, computing totals.
    ///
    /// Totals that cannot be held exactly are rejected rather than rounded.
    pub fn from_request(request: InvoiceRequest) -> PipelineResult<Self> {
        let mut lines = Vec::with_capacity(request.items.len());
        let mut total_amount = Decimal::ZERO;

        for (idx, item) in request.items.iter().enumerate() {
            let item_total = item.total().ok_or_else(|| {
                PipelineError::validation(format!("items[{idx}]"), "line total is too large")
            })?;
            total_amount = total_amount
                .checked_add(item_total)
                .ok_or_else(|| PipelineError::validation("items", "invoice total is too large"))?;
            lines.push(NormalizedLine {
                item: item.clone(),
                item_total,
            });
        }

        Ok(Self {
            request,
            lines,
            total_amount,
        })
    }

    pub fn order_id(&self) -> &str {
        &self.request.order_id
    }

    /// Additional notes, or `None` when absent or whitespace-only.
    pub fn notes(&self) -> Option<&str> {
        self.request
            .additional_notes
            .as_deref()
            .filter(|n| !n.trim().is_empty())
    }
}

/// Validate a raw payload and compute totals.
pub fn normalize(payload: &Value) -> PipelineResult<NormalizedInvoice> {
    let obj = payload
        .as_object()
        .ok_or_else(|| PipelineError::validation("payload", "must be a JSON object"))?;

    let request = InvoiceRequest {
        organization_name: text(obj, None, "organizationName")?,
        customer_id: text(obj, None, "customerId")?,
        customer_name: text(obj, None, "customerName")?,
        employee_id: text(obj, None, "employeeId")?,
        employee_name: text(obj, None, "employeeName")?,
        order_id: text(obj, None, "orderId")?,
        order_date: text(obj, None, "orderDate")?,
        deadline: text(obj, None, "deadline")?,
        items: items(obj)?,
        additional_notes: notes(obj)?,
    };

    NormalizedInvoice::from_request(request)
}

fn items(obj: &Map<String, Value>) -> PipelineResult<Vec<LineItem>> {
    let raw = required(obj, None, "items")?
        .as_array()
        .ok_or_else(|| PipelineError::validation("items", "must be an array"))?;

    raw.iter()
        .enumerate()
        .map(|(idx, value)| {
            let prefix = format!("items[{idx}]");
            let item = value
                .as_object()
                .ok_or_else(|| PipelineError::validation(prefix.as_str(), "must be an object"))?;

            Ok(LineItem {
                item_id: text(item, Some(&prefix), "itemId")?,
                item_name: text(item, Some(&prefix), "itemName")?,
                quantity: quantity(item, &prefix)?,
                cost_per_unit: cost_per_unit(item, &prefix)?,
            })
        })
        .collect()
}

fn notes(obj: &Map<String, Value>) -> PipelineResult<Option<String>> {
    match obj.get("additionalNotes") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PipelineError::validation(
            "additionalNotes",
            "must be a string",
        )),
    }
}

fn path(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{p}.{key}"),
        None => key.to_string(),
    }
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    prefix: Option<&str>,
    key: &str,
) -> PipelineResult<&'a Value> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(PipelineError::validation(path(prefix, key), "is required")),
        Some(v) => Ok(v),
    }
}

/// Text-like field: a JSON string, or a number rendered in its JSON form.
fn text(obj: &Map<String, Value>, prefix: Option<&str>, key: &str) -> PipelineResult<String> {
    match required(obj, prefix, key)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(PipelineError::validation(
            path(prefix, key),
            "must be a string",
        )),
    }
}

fn number<'a>(obj: &'a Map<String, Value>, prefix: &str, key: &str) -> PipelineResult<&'a Number> {
    match required(obj, Some(prefix), key)? {
        Value::Number(n) => Ok(n),
        _ => Err(PipelineError::validation(path(Some(prefix), key), "must be a number")),
    }
}

fn quantity(obj: &Map<String, Value>, prefix: &str) -> PipelineResult<u64> {
    let field = || path(Some(prefix), "quantity");
    let n = number(obj, prefix, "quantity")?;

    if let Some(q) = n.as_u64() {
        return Ok(q);
    }
    if n.as_i64().is_some() {
        return Err(PipelineError::validation(field(), "must not be negative"));
    }

    let f = n
        .as_f64()
        .ok_or_else(|| PipelineError::validation(field(), "must be a number"))?;
    if f < 0.0 {
        return Err(PipelineError::validation(field(), "must not be negative"));
    }
    if f.fract() != 0.0 {
        return Err(PipelineError::validation(field(), "must be a whole number"));
    }
    if f >= u64::MAX as f64 {
        return Err(PipelineError::validation(field(), "is too large"));
    }
    Ok(f as u64)
}

/// Unit cost as an exact decimal of the number as written in the payload.
fn cost_per_unit(obj: &Map<String, Value>, prefix: &str) -> PipelineResult<Decimal> {
    let field = || path(Some(prefix), "costPerUnit");
    let n = number(obj, prefix, "costPerUnit")?;

    if let Some(c) = n.as_u64() {
        return Ok(Decimal::from(c));
    }
    if n.as_i64().is_some() {
        return Err(PipelineError::validation(field(), "must not be negative"));
    }

    let f = n
        .as_f64()
        .ok_or_else(|| PipelineError::validation(field(), "must be a number"))?;
    if !f.is_finite() {
        return Err(PipelineError::validation(field(), "must be finite"));
    }
    if f < 0.0 {
        return Err(PipelineError::validation(field(), "must not be negative"));
    }

    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(|cost| cost.abs())
        .map_err(|_| PipelineError::validation(field(), "cannot be represented exactly"))
}
