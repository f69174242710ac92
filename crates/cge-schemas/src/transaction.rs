use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Inbound transaction envelope.
///
/// Only `transaction_id` and `occurred_at` are required; every other field is
/// optional and typed. Fields we do not model are preserved verbatim in
/// `extra` so conditions can still reference them — an unknown field is never
/// a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub occurred_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    /// Monitoring path only: the decision already taken upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    /// Untyped passthrough for fields we do not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Transaction {
    /// Minimal envelope for programmatic construction (tests, replay tooling).
    pub fn new(transaction_id: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            occurred_at,
            amount: None,
            currency: None,
            country_code: None,
            merchant_id: None,
            merchant_name: None,
            merchant_category_code: None,
            card_hash: None,
            device_id: None,
            transaction_type: None,
            decision: None,
            extra: BTreeMap::new(),
        }
    }

    /// Three-valued field lookup. Absence and type mismatch are distinct from
    /// `false`; the operator layer decides what to do with each.
    pub fn lookup_field(&self, field: &str) -> FieldLookup {
        match field {
            "transaction_id" => FieldLookup::Present(FieldValue::Text(self.transaction_id.clone())),
            "amount" => match self.amount {
                Some(a) => FieldLookup::Present(FieldValue::Number(a)),
                None => FieldLookup::Absent,
            },
            "currency" => text_lookup(&self.currency),
            "country_code" => text_lookup(&self.country_code),
            "merchant_id" => text_lookup(&self.merchant_id),
            "merchant_name" => text_lookup(&self.merchant_name),
            "merchant_category_code" => text_lookup(&self.merchant_category_code),
            "card_hash" => text_lookup(&self.card_hash),
            "device_id" => text_lookup(&self.device_id),
            "transaction_type" => text_lookup(&self.transaction_type),
            "decision" => text_lookup(&self.decision),
            other => match self.extra.get(other) {
                None | Some(Value::Null) => FieldLookup::Absent,
                Some(v) => FieldValue::from_json(v)
                    .map(FieldLookup::Present)
                    .unwrap_or(FieldLookup::Mismatch),
            },
        }
    }

    /// String form of a field, used for velocity dimension values.
    /// Numbers are rendered in their canonical decimal form.
    pub fn field_text(&self, field: &str) -> Option<String> {
        match self.lookup_field(field) {
            FieldLookup::Present(FieldValue::Text(s)) => Some(s),
            FieldLookup::Present(FieldValue::Number(n)) => Some(n.normalize().to_string()),
            FieldLookup::Present(FieldValue::Flag(b)) => Some(b.to_string()),
            FieldLookup::Absent | FieldLookup::Mismatch => None,
        }
    }
}

fn text_lookup(slot: &Option<String>) -> FieldLookup {
    match slot {
        Some(s) => FieldLookup::Present(FieldValue::Text(s.clone())),
        None => FieldLookup::Absent,
    }
}

// ---------------------------------------------------------------------------
// FieldLookup / FieldValue
// ---------------------------------------------------------------------------

/// Result of extracting one field from a transaction.
///
/// `Absent` covers both "key missing" and explicit JSON null. `Mismatch`
/// means the value exists but has no usable scalar form (object/array).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLookup {
    Present(FieldValue),
    Absent,
    Mismatch,
}

impl FieldLookup {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// Typed scalar extracted from a transaction field. Integer and floating
/// inputs are widened to `Decimal` at the boundary so every numeric compare
/// downstream is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Number(Decimal),
    Text(String),
    Flag(bool),
}

impl FieldValue {
    /// Scalar conversion from untyped JSON. Objects and arrays have no
    /// scalar form and yield `None` (the caller reports a mismatch).
    pub fn from_json(v: &Value) -> Option<FieldValue> {
        match v {
            Value::Number(n) => n.to_string().parse::<Decimal>().ok().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Bool(b) => Some(FieldValue::Flag(*b)),
            Value::Null | Value::Object(_) | Value::Array(_) => None,
        }
    }

    /// JSON rendering of the extracted value, used by debug capture.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => {
                serde_json::to_value(n).unwrap_or_else(|_| Value::String(n.to_string()))
            }
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Flag(b) => Value::Bool(*b),
        }
    }
}
