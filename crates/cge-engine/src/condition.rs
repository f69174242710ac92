//! Condition operator algebra: pure predicates over extracted field values.
//!
//! The absent-field rule is enforced here, at operator dispatch: every
//! operator except `exists` returns false on an absent or mismatched field.
//! Extraction itself stays three-valued so this policy lives in one place.

use rust_decimal::Decimal;
use serde_json::Value;

use cge_schemas::{Condition, ConditionOperator, FieldLookup, FieldValue, Transaction};

/// Result of evaluating one condition, with the extracted input kept so
/// debug capture can record it without a second lookup.
#[derive(Debug, Clone)]
pub struct ConditionOutcome {
    pub result: bool,
    pub input: FieldLookup,
}

/// Evaluate a single condition against a transaction. Pure; no side effects.
pub fn evaluate(cond: &Condition, tx: &Transaction) -> ConditionOutcome {
    let input = tx.lookup_field(&cond.field);

    let result = match (&cond.op, &input) {
        (ConditionOperator::Exists, _) => input.is_present(),
        (_, FieldLookup::Present(value)) => apply(cond, value),
        // Absent or mismatched field: every non-exists operator is false.
        (_, FieldLookup::Absent | FieldLookup::Mismatch) => false,
    };

    ConditionOutcome { result, input }
}

fn apply(cond: &Condition, value: &FieldValue) -> bool {
    match cond.op {
        ConditionOperator::Eq => scalar(cond).map_or(false, |rhs| semantic_eq(value, rhs)),
        ConditionOperator::Ne => scalar(cond).map_or(false, |rhs| !semantic_eq(value, rhs)),

        ConditionOperator::Gt => numeric_cmp(cond, value, |l, r| l > r),
        ConditionOperator::Gte => numeric_cmp(cond, value, |l, r| l >= r),
        ConditionOperator::Lt => numeric_cmp(cond, value, |l, r| l < r),
        ConditionOperator::Lte => numeric_cmp(cond, value, |l, r| l <= r),

        ConditionOperator::In => list(cond).map_or(false, |vs| {
            vs.iter().any(|rhs| semantic_eq(value, rhs))
        }),
        ConditionOperator::NotIn => list(cond).map_or(false, |vs| {
            !vs.iter().any(|rhs| semantic_eq(value, rhs))
        }),

        ConditionOperator::Between => between(cond, value),

        ConditionOperator::Contains => text_op(cond, value, |s, r| s.contains(r)),
        ConditionOperator::StartsWith => text_op(cond, value, |s, r| s.starts_with(r)),
        ConditionOperator::EndsWith => text_op(cond, value, |s, r| s.ends_with(r)),

        // Dispatched before apply(); present field means exists holds.
        ConditionOperator::Exists => true,
    }
}

fn scalar(cond: &Condition) -> Option<&Value> {
    cond.value.as_ref()
}

fn list(cond: &Condition) -> Option<&[Value]> {
    cond.values.as_deref()
}

/// Semantic equality per field kind: decimals by value, strings
/// case-sensitive, booleans exact. Kind mismatch is inequality.
fn semantic_eq(lhs: &FieldValue, rhs: &Value) -> bool {
    match lhs {
        FieldValue::Number(n) => json_decimal(rhs).map_or(false, |d| *n == d),
        FieldValue::Text(s) => rhs.as_str().map_or(false, |r| s == r),
        FieldValue::Flag(b) => rhs.as_bool().map_or(false, |r| *b == r),
    }
}

fn numeric_cmp(
    cond: &Condition,
    value: &FieldValue,
    cmp: impl Fn(Decimal, Decimal) -> bool,
) -> bool {
    let FieldValue::Number(lhs) = value else {
        return false;
    };
    scalar(cond)
        .and_then(json_decimal)
        .map_or(false, |rhs| cmp(*lhs, rhs))
}

/// Inclusive on both bounds. Requires exactly two monotone bounds; anything
/// else evaluates to false rather than erroring mid-request.
fn between(cond: &Condition, value: &FieldValue) -> bool {
    let FieldValue::Number(n) = value else {
        return false;
    };
    let Some([lo, hi]) = list(cond).and_then(|vs| <&[Value; 2]>::try_from(vs).ok()) else {
        return false;
    };
    let (Some(lo), Some(hi)) = (json_decimal(lo), json_decimal(hi)) else {
        return false;
    };
    if lo > hi {
        return false;
    }
    lo <= *n && *n <= hi
}

fn text_op(cond: &Condition, value: &FieldValue, op: impl Fn(&str, &str) -> bool) -> bool {
    let FieldValue::Text(s) = value else {
        return false;
    };
    scalar(cond)
        .and_then(Value::as_str)
        .map_or(false, |rhs| op(s, rhs))
}

/// Numeric coercion: integers and floats widen to decimal; numeric strings
/// parse. Non-numeric shapes do not coerce.
fn json_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tx() -> Transaction {
        let mut t = Transaction::new("tx-1", Utc::now());
        t.amount = Some("100.00".parse().unwrap());
        t.country_code = Some("US".to_string());
        t.merchant_name = Some("ACME Coffee #12".to_string());
        t
    }

    fn check(field: &str, op: ConditionOperator, value: Value) -> bool {
        evaluate(&Condition::new(field, op, value), &tx()).result
    }

    fn check_values(field: &str, op: ConditionOperator, values: Vec<Value>) -> bool {
        evaluate(&Condition::with_values(field, op, values), &tx()).result
    }

    #[test]
    fn numeric_operators_coerce_to_decimal() {
        assert!(check("amount", ConditionOperator::Eq, json!(100)));
        assert!(check("amount", ConditionOperator::Eq, json!("100.0")));
        assert!(check("amount", ConditionOperator::Gte, json!(100)));
        assert!(check("amount", ConditionOperator::Gt, json!(99.99)));
        assert!(!check("amount", ConditionOperator::Gt, json!(100)));
        assert!(check("amount", ConditionOperator::Lte, json!("100.00")));
    }

    #[test]
    fn string_equality_is_case_sensitive() {
        assert!(check("country_code", ConditionOperator::Eq, json!("US")));
        assert!(!check("country_code", ConditionOperator::Eq, json!("us")));
        assert!(check("country_code", ConditionOperator::Ne, json!("NG")));
    }

    #[test]
    fn between_is_inclusive_on_both_bounds() {
        let bounds = vec![json!(100), json!(200)];
        assert!(check_values("amount", ConditionOperator::Between, bounds.clone()));
        assert!(!check_values(
            "amount",
            ConditionOperator::Between,
            vec![json!(100.01), json!(200)]
        ));
        assert!(!check_values(
            "amount",
            ConditionOperator::Between,
            vec![json!(0), json!(99.99)]
        ));
    }

    #[test]
    fn between_rejects_bad_arity_and_inverted_bounds() {
        assert!(!check_values("amount", ConditionOperator::Between, vec![json!(1)]));
        assert!(!check_values(
            "amount",
            ConditionOperator::Between,
            vec![json!(200), json!(100)]
        ));
    }

    #[test]
    fn in_and_not_in_scan_the_list() {
        assert!(check_values(
            "country_code",
            ConditionOperator::In,
            vec![json!("NG"), json!("US")]
        ));
        assert!(!check_values(
            "country_code",
            ConditionOperator::NotIn,
            vec![json!("US")]
        ));
        assert!(check_values(
            "country_code",
            ConditionOperator::NotIn,
            vec![json!("NG"), json!("RU")]
        ));
    }

    #[test]
    fn text_operators_are_case_sensitive() {
        assert!(check("merchant_name", ConditionOperator::Contains, json!("Coffee")));
        assert!(!check("merchant_name", ConditionOperator::Contains, json!("coffee")));
        assert!(check("merchant_name", ConditionOperator::StartsWith, json!("ACME")));
        assert!(check("merchant_name", ConditionOperator::EndsWith, json!("#12")));
    }

    #[test]
    fn absent_field_is_false_for_everything_but_exists() {
        assert!(!check("device_id", ConditionOperator::Eq, json!("d-1")));
        assert!(!check("device_id", ConditionOperator::Ne, json!("d-1")));
        assert!(!check_values(
            "device_id",
            ConditionOperator::NotIn,
            vec![json!("d-1")]
        ));
        assert!(!check("device_id", ConditionOperator::Exists, Value::Null));
        assert!(check("country_code", ConditionOperator::Exists, Value::Null));
    }

    #[test]
    fn kind_mismatch_never_matches() {
        // amount is numeric; text operators on it are false, not errors.
        assert!(!check("amount", ConditionOperator::Contains, json!("10")));
        // country_code is text; numeric compare on it is false.
        assert!(!check("country_code", ConditionOperator::Gt, json!(1)));
    }
}
