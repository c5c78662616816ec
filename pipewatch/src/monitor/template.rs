//! Alert message templates with named placeholders.
//!
//! Templates use `{name}` placeholders with an optional numeric format spec:
//! `{name:.1f}` renders a fixed-point number and `{name:.1%}` renders a
//! ratio as a percentage. `{{` and `}}` are literal braces. A number with no
//! spec renders in its shortest form, keeping one decimal place for
//! integral floats (`3600.0`).

use crate::errors::TemplateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static FORMAT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\.(\d{1,2}))?([f%])$").expect("format spec pattern is valid")
});

const DEFAULT_PRECISION: usize = 6;

/// A value available to a message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// An integral count.
    Integer(i64),
    /// A measurement or ratio.
    Number(f64),
    /// Free text (e.g., a run status).
    Text(String),
}

impl ContextValue {
    /// Returns the value as a float, if numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e16 => {
                write!(f, "{n:.1}")
            }
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Named values that caused an alert to trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertContext(BTreeMap<String, ContextValue>);

impl AlertContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a float value.
    #[must_use]
    pub fn with_number(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), ContextValue::Number(value));
        self
    }

    /// Adds an integral value.
    #[must_use]
    pub fn with_integer(mut self, name: impl Into<String>, value: i64) -> Self {
        self.0.insert(name.into(), ContextValue::Integer(value));
        self
    }

    /// Adds a text value.
    #[must_use]
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), ContextValue::Text(value.into()));
        self
    }

    /// Returns a value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.0.get(name)
    }

    /// Returns the value names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the context has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatSpec {
    Plain,
    Fixed(usize),
    Percent(usize),
}

impl FormatSpec {
    fn parse(name: &str, spec: &str) -> Result<Self, TemplateError> {
        if spec.is_empty() {
            return Ok(Self::Plain);
        }
        let unsupported = || TemplateError::UnsupportedFormat {
            name: name.to_string(),
            spec: spec.to_string(),
        };
        let caps = FORMAT_SPEC.captures(spec).ok_or_else(unsupported)?;
        let precision = match caps.get(1) {
            Some(m) => m.as_str().parse().map_err(|_| unsupported())?,
            None => DEFAULT_PRECISION,
        };
        match caps.get(2).map(|m| m.as_str()) {
            Some("f") => Ok(Self::Fixed(precision)),
            Some("%") => Ok(Self::Percent(precision)),
            _ => Err(unsupported()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder {
        name: String,
        spec: FormatSpec,
        raw_spec: String,
    },
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns an error for unbalanced braces, empty placeholder names or
    /// unsupported format specs.
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnbalancedBrace { position: pos }),
                '{' => {
                    let mut body = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        match n {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(TemplateError::UnbalancedBrace { position: pos }),
                            other => body.push(other),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::UnbalancedBrace { position: pos });
                    }

                    let (name, raw_spec) = match body.split_once(':') {
                        Some((name, spec)) => (name.trim(), spec.trim()),
                        None => (body.trim(), ""),
                    };
                    if name.is_empty() {
                        return Err(TemplateError::UnbalancedBrace { position: pos });
                    }
                    let spec = FormatSpec::parse(name, raw_spec)?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder {
                        name: name.to_string(),
                        spec,
                        raw_spec: raw_spec.to_string(),
                    });
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// Returns the template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the distinct placeholder names, in order of first use.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder { name, .. } = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Checks that every placeholder is one of `available`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingPlaceholder`] for the first name that
    /// would never have a value.
    pub fn validate_against(&self, available: &[&str]) -> Result<(), TemplateError> {
        match self.placeholders().into_iter().find(|n| !available.contains(n)) {
            Some(name) => Err(TemplateError::MissingPlaceholder {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Renders the template with values from `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder has no value or a numeric spec is
    /// applied to text.
    pub fn render(&self, context: &AlertContext) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder {
                    name,
                    spec,
                    raw_spec,
                } => {
                    let value = context
                        .get(name)
                        .ok_or_else(|| TemplateError::MissingPlaceholder { name: name.clone() })?;
                    let not_numeric = || TemplateError::NotNumeric {
                        name: name.clone(),
                        spec: raw_spec.clone(),
                    };
                    match spec {
                        FormatSpec::Plain => out.push_str(&value.to_string()),
                        FormatSpec::Fixed(p) => {
                            let n = value.as_f64().ok_or_else(not_numeric)?;
                            out.push_str(&format!("{n:.prec$}", prec = *p));
                        }
                        FormatSpec::Percent(p) => {
                            let n = value.as_f64().ok_or_else(not_numeric)?;
                            out.push_str(&format!("{:.prec$}%", n * 100.0, prec = *p));
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl TryFrom<String> for MessageTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MessageTemplate> for String {
    fn from(template: MessageTemplate) -> Self {
        template.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percent_format() {
        let template =
            MessageTemplate::parse("High failure rate: {failure_rate:.1%} (threshold: {threshold:.1%})")
                .unwrap();
        let context = AlertContext::new()
            .with_number("failure_rate", 0.25)
            .with_number("threshold", 0.1);

        assert_eq!(
            template.render(&context).unwrap(),
            "High failure rate: 25.0% (threshold: 10.0%)"
        );
    }

    #[test]
    fn test_fixed_and_plain_formats() {
        let template = MessageTemplate::parse(
            "Pipeline took {execution_time:.1f} seconds (threshold: {threshold}s)",
        )
        .unwrap();
        let context = AlertContext::new()
            .with_number("execution_time", 4000.25)
            .with_number("threshold", 3600.0);

        assert_eq!(
            template.render(&context).unwrap(),
            "Pipeline took 4000.2 seconds (threshold: 3600.0s)"
        );
    }

    #[test]
    fn test_integer_and_text_values() {
        let template =
            MessageTemplate::parse("Low data volume: {records_processed} records, last {status}")
                .unwrap();
        let context = AlertContext::new()
            .with_integer("records_processed", 50)
            .with_text("status", "FAILED");

        assert_eq!(
            template.render(&context).unwrap(),
            "Low data volume: 50 records, last FAILED"
        );
    }

    #[test]
    fn test_escaped_braces() {
        let template = MessageTemplate::parse("{{literal}} {value}").unwrap();
        let context = AlertContext::new().with_integer("value", 1);
        assert_eq!(template.render(&context).unwrap(), "{literal} 1");
        assert_eq!(template.placeholders(), vec!["value"]);
    }

    #[test]
    fn test_missing_placeholder_at_render() {
        let template = MessageTemplate::parse("Rate {failure_rate}").unwrap();
        let err = template.render(&AlertContext::new()).unwrap_err();

        assert_eq!(
            err,
            TemplateError::MissingPlaceholder {
                name: "failure_rate".into()
            }
        );
    }

    #[test]
    fn test_validate_against_available_names() {
        let template = MessageTemplate::parse("{hours_since_last_run:.1f} > {threshold}").unwrap();
        assert!(template
            .validate_against(&["hours_since_last_run", "threshold"])
            .is_ok());

        let err = template.validate_against(&["threshold"]).unwrap_err();
        assert!(matches!(err, TemplateError::MissingPlaceholder { name } if name == "hours_since_last_run"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            MessageTemplate::parse("open {brace"),
            Err(TemplateError::UnbalancedBrace { position: 5 })
        ));
        assert!(matches!(
            MessageTemplate::parse("stray } brace"),
            Err(TemplateError::UnbalancedBrace { .. })
        ));
        assert!(matches!(
            MessageTemplate::parse("{value:>10}"),
            Err(TemplateError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_numeric_spec_on_text_fails() {
        let template = MessageTemplate::parse("{status:.1f}").unwrap();
        let context = AlertContext::new().with_text("status", "FAILED");

        assert!(matches!(
            template.render(&context),
            Err(TemplateError::NotNumeric { .. })
        ));
    }

    #[test]
    fn test_default_precision() {
        let template = MessageTemplate::parse("{x:f} {x:%}").unwrap();
        let context = AlertContext::new().with_number("x", 0.5);
        assert_eq!(template.render(&context).unwrap(), "0.500000 50.000000%");
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let template: MessageTemplate = serde_json::from_str("\"Data is {hours:.1f}h old\"").unwrap();
        assert_eq!(template.placeholders(), vec!["hours"]);
        assert_eq!(
            serde_json::to_string(&template).unwrap(),
            "\"Data is {hours:.1f}h old\""
        );

        assert!(serde_json::from_str::<MessageTemplate>("\"{bad\"").is_err());
    }
}
