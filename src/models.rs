use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Full English weekday name, the key used by weekly plans.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Three letter abbreviation used by the completion matrix and daily series.
pub fn short_day(day: Weekday) -> &'static str {
    &weekday_name(day)[..3]
}

pub fn parse_weekday(value: &str) -> Option<Weekday> {
    value.trim().parse::<Weekday>().ok()
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Percent,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Percent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Percent => "percent",
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "percent" => Ok(FieldType::Percent),
            other => Err(format!("unknown field type `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub slug: String,
    pub label: String,
    pub field_type: FieldType,
    pub is_default: bool,
    pub is_active: bool,
    pub readonly: bool,
}

impl TaskDefinition {
    /// Custom text tasks make up the planned-vs-completed matrix.
    pub fn is_custom_text(&self) -> bool {
        self.is_active && !self.is_default && self.field_type == FieldType::Text
    }
}

/// A single entered value. Absence ("not entered") is modelled as `Option::None`
/// around this type, never as an empty string or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Numeric reading of the value. Text that does not parse is absent.
    pub fn as_number(&self) -> Option<f64> {
        let number = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        number.is_finite().then_some(number)
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Number(_) => false,
            FieldValue::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) if n.fract() == 0.0 => write!(f, "{}", *n as i64),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub values: BTreeMap<String, Option<FieldValue>>,
}

impl DailyReport {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, slug: &str, value: FieldValue) -> Self {
        self.values.insert(slug.to_string(), Some(value));
        self
    }

    /// Entered value for `slug`; blank text counts as not entered.
    pub fn value(&self, slug: &str) -> Option<&FieldValue> {
        self.values
            .get(slug)
            .and_then(|value| value.as_ref())
            .filter(|value| !value.is_blank())
    }

    pub fn number(&self, slug: &str) -> Option<f64> {
        self.value(slug).and_then(FieldValue::as_number)
    }

    pub fn text(&self, slug: &str) -> Option<String> {
        self.value(slug).map(|value| value.to_string().trim().to_string())
    }

    pub fn is_filled(&self, slug: &str) -> bool {
        self.value(slug).is_some()
    }
}

/// Emails are matched case-insensitively; this is the stored and compared form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct Learner {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyResult {
    pub learner_id: Uuid,
    pub week_start: NaiveDate,
    pub overall_pct: f64,
    pub tier: String,
}
