//! Choice normalization
//!
//! Declared choices are either bare scalars (`["a", "b"]`) or `[value, label]`
//! pairs (`[["a", "Label A"], ["b", "Label B"]]`). Both normalize to an
//! ordered list of `(value, label)`. Order is preserved and duplicates are
//! kept; lookups return the first match.

use serde_json::Value;

/// One canonical `(value, label)` choice
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub value: Value,
    pub label: Value,
}

impl Choice {
    pub fn new(value: Value, label: Value) -> Self {
        Self { value, label }
    }
}

/// Normalizes a declared choice list.
pub fn normalize(choices: &[Value]) -> Result<Vec<Choice>, String> {
    if choices.is_empty() {
        return Err("'choices' must not be empty".into());
    }

    choices
        .iter()
        .enumerate()
        .map(|(i, choice)| match choice {
            Value::Array(pair) if pair.len() == 2 => {
                Ok(Choice::new(pair[0].clone(), pair[1].clone()))
            }
            Value::Array(pair) => Err(format!(
                "choice #{} must be a [value, label] pair, got {} elements",
                i,
                pair.len()
            )),
            Value::Object(_) => Err(format!(
                "choice #{} must be a scalar or a [value, label] pair",
                i
            )),
            scalar => Ok(Choice::new(scalar.clone(), scalar.clone())),
        })
        .collect()
}

/// Index of the first choice whose value equals `value`.
pub fn position(choices: &[Choice], value: &Value) -> Option<usize> {
    choices.iter().position(|c| values_equal(&c.value, value))
}

/// Label of the first choice whose value equals `value`.
pub fn label_for<'a>(choices: &'a [Choice], value: &Value) -> Option<&'a Value> {
    position(choices, value).map(|i| &choices[i].label)
}

/// Canonical values in declared order
pub fn values(choices: &[Choice]) -> Vec<&Value> {
    choices.iter().map(|c| &c.value).collect()
}

/// JSON equality with numbers compared numerically, so `1` matches `1.0`.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => x == y,
            },
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_become_pairs() {
        let out = normalize(&[json!("a"), json!("b")]).unwrap();
        assert_eq!(
            out,
            vec![
                Choice::new(json!("a"), json!("a")),
                Choice::new(json!("b"), json!("b")),
            ]
        );
    }

    #[test]
    fn test_pairs_kept_as_is() {
        let out = normalize(&[json!(["a", "Label A"]), json!(["b", "Label B"])]).unwrap();
        assert_eq!(
            out,
            vec![
                Choice::new(json!("a"), json!("Label A")),
                Choice::new(json!("b"), json!("Label B")),
            ]
        );
    }

    #[test]
    fn test_mixed_list() {
        let out = normalize(&[json!(1), json!([2, "two"])]).unwrap();
        assert_eq!(out[0].label, json!(1));
        assert_eq!(out[1].label, json!("two"));
    }

    #[test]
    fn test_order_preserved_and_duplicates_kept() {
        let out = normalize(&[json!(["x", "first"]), json!("y"), json!(["x", "second"])]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(values(&out), vec![&json!("x"), &json!("y"), &json!("x")]);
        // first match wins
        assert_eq!(position(&out, &json!("x")), Some(0));
        assert_eq!(label_for(&out, &json!("x")), Some(&json!("first")));
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(normalize(&[]).is_err());
        assert!(normalize(&[json!(["a", "b", "c"])]).is_err());
        assert!(normalize(&[json!({"a": 1})]).is_err());
    }

    #[test]
    fn test_numeric_equality() {
        let out = normalize(&[json!(1), json!(2.5)]).unwrap();
        assert_eq!(position(&out, &json!(1.0)), Some(0));
        assert_eq!(position(&out, &json!(2.5)), Some(1));
        assert_eq!(position(&out, &json!("1")), None);
    }
}
