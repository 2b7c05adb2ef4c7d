//! Response schemas.
//!
//! A schema turns raw provider text into trusted data. It separates two
//! failures: text that is not data at all ([`SchemaError::Malformed`]) and
//! data that does not satisfy the declared shape ([`SchemaError::Violation`]).

use regex::Regex;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::OnceLock;
use thiserror::Error;

/// Failure to turn raw content into validated data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The content is not parseable data.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The content parsed but does not satisfy the schema.
    #[error("{0}")]
    Violation(String),
}

/// Semantic checks that run after deserialization.
pub trait Validate {
    /// Returns a description of the first violated rule.
    fn validate(&self) -> Result<(), String>;
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), String> {
        self.iter()
            .enumerate()
            .try_for_each(|(i, item)| item.validate().map_err(|e| format!("[{i}]: {e}")))
    }
}

/// Declares how to parse and validate a provider response.
pub trait ResponseSchema: Send + Sync {
    /// The validated output type.
    type Output: Send + 'static;

    /// Schema name used in errors and logs.
    fn name(&self) -> &str;

    /// Whether providers should be asked for JSON-only output.
    fn expects_json(&self) -> bool {
        true
    }

    /// Parses and validates raw content.
    fn parse(&self, raw: &str) -> Result<Self::Output, SchemaError>;
}

/// JSON schema backed by a serde type plus its [`Validate`] rules.
pub struct JsonSchema<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSchema<T> {
    /// Creates a schema named after `T`.
    #[must_use]
    pub fn new() -> Self {
        let full = std::any::type_name::<T>();
        let name = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self::named(name)
    }

    /// Creates a schema with an explicit name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchema").field("name", &self.name).finish()
    }
}

impl<T> ResponseSchema for JsonSchema<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, raw: &str) -> Result<T, SchemaError> {
        let json = extract_json(raw)
            .ok_or_else(|| SchemaError::Malformed("no JSON object or array found".to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        let data: T =
            serde_json::from_value(value).map_err(|e| SchemaError::Violation(e.to_string()))?;
        data.validate().map_err(SchemaError::Violation)?;
        Ok(data)
    }
}

/// Free text. Only rejects empty responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl ResponseSchema for PlainText {
    type Output = String;

    fn name(&self) -> &str {
        "PlainText"
    }

    fn expects_json(&self) -> bool {
        false
    }

    fn parse(&self, raw: &str) -> Result<String, SchemaError> {
        let text = raw.trim();
        if text.is_empty() {
            Err(SchemaError::Violation("empty response".to_string()))
        } else {
            Ok(text.to_string())
        }
    }
}

fn fence_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").ok())
        .as_ref()
}

/// Locates the JSON payload in model output.
///
/// Accepts bare JSON, JSON inside a markdown code fence, or JSON surrounded
/// by prose. Returns `None` when no object or array is present.
#[must_use]
pub fn extract_json(raw: &str) -> Option<&str> {
    let fenced = fence_pattern()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str());
    let text = fenced.trim();
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Score {
        score: f64,
    }

    impl Validate for Score {
        fn validate(&self) -> Result<(), String> {
            if (0.0..=100.0).contains(&self.score) {
                Ok(())
            } else {
                Err(format!("score {} outside [0, 100]", self.score))
            }
        }
    }

    #[test]
    fn test_schema_name_defaults_to_type() {
        assert_eq!(JsonSchema::<Score>::new().name(), "Score");
        assert_eq!(JsonSchema::<Vec<Score>>::new().name(), "Vec");
        assert_eq!(JsonSchema::<Score>::named("quality").name(), "quality");
    }

    #[test]
    fn test_parses_fenced_json() {
        let schema = JsonSchema::<Score>::new();
        let raw = "Here you go:\n```json\n{\"score\": 91}\n```\nThanks";
        assert_eq!(schema.parse(raw).unwrap(), Score { score: 91.0 });
    }

    #[test]
    fn test_parses_json_in_prose() {
        let schema = JsonSchema::<Score>::new();
        assert_eq!(
            schema.parse("The result is {\"score\": 12.5}.").unwrap(),
            Score { score: 12.5 }
        );
    }

    #[test]
    fn test_not_json_is_malformed() {
        let schema = JsonSchema::<Score>::new();
        assert!(matches!(schema.parse("no data here"), Err(SchemaError::Malformed(_))));
        assert!(matches!(schema.parse("{ broken"), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn test_wrong_shape_is_violation() {
        let schema = JsonSchema::<Score>::new();
        assert!(matches!(
            schema.parse(r#"{"points": 3}"#),
            Err(SchemaError::Violation(_))
        ));
        let err = schema.parse(r#"{"score": 140}"#).unwrap_err();
        assert_eq!(err, SchemaError::Violation("score 140 outside [0, 100]".to_string()));
    }

    #[test]
    fn test_vec_validation_reports_index() {
        let schema = JsonSchema::<Vec<Score>>::new();
        let err = schema.parse(r#"[{"score": 1}, {"score": -1}]"#).unwrap_err();
        assert!(err.to_string().starts_with("[1]:"));
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(PlainText.parse("  hi \n").unwrap(), "hi");
        assert!(PlainText.parse("   ").is_err());
        assert!(!PlainText.expects_json());
    }
}
