//! Input validation: structural (serde) first, then [`Validate`] rules.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{FieldIssue, RpcError, RpcResult};

/// Business rules checked after an input deserializes.
pub trait Validate {
    fn validate(&self, _issues: &mut Issues) {}
}

impl Validate for () {}

#[derive(Debug, Default)]
pub struct Issues {
    items: Vec<FieldIssue>,
}

impl Issues {
    pub fn add(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.items.push(FieldIssue {
            field: field.to_string(),
            code: code.to_string(),
            message: message.into(),
        });
    }

    pub fn check(&mut self, ok: bool, field: &str, code: &str, message: &str) {
        if !ok {
            self.add(field, code, message);
        }
    }

    pub fn require_non_empty(&mut self, field: &str, value: &str) {
        self.check(!value.trim().is_empty(), field, "required", "must be non-empty");
    }

    pub fn max_chars(&mut self, field: &str, value: &str, max: usize) {
        let len = value.chars().count();
        if len > max {
            self.add(
                field,
                "too_long",
                format!("must be at most {max} characters (got {len})"),
            );
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_result(self) -> RpcResult<()> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(RpcError::invalid_input(self.items))
        }
    }
}

/// A missing input arrives as `null`; inputs that are objects with only
/// defaulted fields accept it as `{}`.
pub fn parse_input<I: DeserializeOwned + Validate>(raw: Value) -> RpcResult<I> {
    let parsed = match raw {
        Value::Null => serde_json::from_value::<I>(Value::Null)
            .or_else(|_| serde_json::from_value::<I>(Value::Object(Map::new()))),
        raw => serde_json::from_value::<I>(raw),
    };
    let input = parsed.map_err(|err| {
        RpcError::invalid_input(vec![FieldIssue {
            field: "input".to_string(),
            code: "schema".to_string(),
            message: err.to_string(),
        }])
    })?;
    let mut issues = Issues::default();
    input.validate(&mut issues);
    issues.into_result()?;
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_protocol::ErrorCode;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Rename {
        name: String,
    }

    impl Validate for Rename {
        fn validate(&self, issues: &mut Issues) {
            issues.require_non_empty("name", &self.name);
            issues.max_chars("name", &self.name, 8);
        }
    }

    #[test]
    fn structural_mismatch_is_bad_request() {
        let err = parse_input::<Rename>(json!({ "name": 3 })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);

        let err = parse_input::<Rename>(json!({ "name": "ok", "extra": true })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
    }

    #[test]
    fn rule_violations_are_collected() {
        let err = parse_input::<Rename>(json!({ "name": "   " })).unwrap_err();
        let RpcError::Rejected { issues, .. } = err else {
            panic!("expected rejection");
        };
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "required");

        assert!(parse_input::<Rename>(json!({ "name": "kata" })).is_ok());
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Filters {
        #[serde(default)]
        tag: Option<String>,
    }

    impl Validate for Filters {}

    #[test]
    fn unit_input_accepts_null() {
        parse_input::<()>(Value::Null).unwrap();
    }

    #[test]
    fn missing_input_means_empty_object_for_defaulted_structs() {
        assert_eq!(parse_input::<Filters>(Value::Null).unwrap(), Filters::default());

        let err = parse_input::<Rename>(Value::Null).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert!(err.to_envelope().message.contains("missing field `name`"));
    }
}
