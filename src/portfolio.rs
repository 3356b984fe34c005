//! Portfolio project model and the sources that supply it.
//!
//! Projects arrive as loosely-typed custom-field lists. They are validated
//! into [`FieldValue`] variants at deserialization so the rest of the
//! pipeline only ever sees typed values looked up by field name.

use crate::error::{ReportError, Result};
use crate::util::{parse_date_safe, parse_f64_safe};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Date(Option<NaiveDate>),
    Enum(Option<String>),
    Number(Option<f64>),
    Text(Option<String>),
    /// Field types the reports never read (people, multi-enum, ...).
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomField {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub gid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_custom_fields")]
    pub custom_fields: Vec<CustomField>,
}

impl Project {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.custom_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.field(name)? {
            FieldValue::Date(d) => *d,
            FieldValue::Text(Some(s)) => parse_date_safe(Some(s)),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.field(name)? {
            FieldValue::Number(n) => *n,
            FieldValue::Text(Some(s)) => parse_f64_safe(Some(s)),
            _ => None,
        }
    }

    /// Text of a text or enum field.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.field(name)? {
            FieldValue::Text(v) | FieldValue::Enum(v) => v.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCustomField {
    name: String,
    #[serde(flatten)]
    value: RawFieldValue,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawFieldValue {
    Date {
        #[serde(default)]
        date_value: Option<RawDate>,
    },
    Enum {
        #[serde(default)]
        enum_value: Option<RawEnum>,
    },
    Number {
        #[serde(default)]
        number_value: Option<f64>,
    },
    Text {
        #[serde(default)]
        text_value: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawDate {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnum {
    name: Option<String>,
}

impl From<RawCustomField> for CustomField {
    fn from(raw: RawCustomField) -> Self {
        let value = match raw.value {
            RawFieldValue::Date { date_value } => FieldValue::Date(
                date_value.and_then(|d| parse_date_safe(d.date.as_deref())),
            ),
            RawFieldValue::Enum { enum_value } => {
                FieldValue::Enum(enum_value.and_then(|e| e.name))
            }
            RawFieldValue::Number { number_value } => FieldValue::Number(number_value),
            RawFieldValue::Text { text_value } => FieldValue::Text(text_value),
            RawFieldValue::Other => FieldValue::Other,
        };
        CustomField {
            name: raw.name,
            value,
        }
    }
}

fn de_custom_fields<'de, D>(deserializer: D) -> std::result::Result<Vec<CustomField>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<RawCustomField>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(CustomField::from).collect())
}

/// Exports come either as a bare array or wrapped in a `data` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectPayload {
    Envelope { data: Vec<Project> },
    Bare(Vec<Project>),
}

/// Parse a portfolio payload, rejecting anything that is not a project list.
pub fn parse_projects(json: &str) -> Result<Vec<Project>> {
    let payload: ProjectPayload = serde_json::from_str(json)
        .map_err(|e| ReportError::upstream(format!("malformed project payload: {}", e)))?;
    Ok(match payload {
        ProjectPayload::Envelope { data } => data,
        ProjectPayload::Bare(projects) => projects,
    })
}

/// Anything that can hand over the projects of a portfolio.
pub trait PortfolioSource {
    fn fetch_projects(&self) -> Result<Vec<Project>>;
}

/// Projects previously exported from the portfolio API to a JSON file.
#[derive(Debug, Clone)]
pub struct JsonExportSource {
    path: PathBuf,
}

impl JsonExportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PortfolioSource for JsonExportSource {
    fn fetch_projects(&self) -> Result<Vec<Project>> {
        let body = fs::read_to_string(&self.path).map_err(|e| {
            let message = format!("reading {}: {}", self.path.display(), e);
            match e.kind() {
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                    ReportError::transient(message)
                }
                _ => ReportError::upstream(message),
            }
        })?;
        let projects = parse_projects(&body)?;
        info!(path = %self.path.display(), count = projects.len(), "loaded portfolio projects");
        Ok(projects)
    }
}

/// Bounded exponential backoff around upstream calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "transient upstream failure, retrying");
                    thread::sleep(backoff);
                    backoff *= self.multiplier;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn fetch(&self, source: &dyn PortfolioSource) -> Result<Vec<Project>> {
        self.run(|_| source.fetch_projects())
    }
}
