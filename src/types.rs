//! Core types for Report Forge.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named SQL query bound to one `[$name]` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sql: String,
}

/// User-editable fields of a parameter (add/edit payload, YAML entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sql: String,
}

impl ParameterInput {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sql: sql.into(),
        }
    }
}

impl From<&Parameter> for ParameterInput {
    fn from(p: &Parameter) -> Self {
        Self {
            name: p.name.clone(),
            description: p.description.clone(),
            sql: p.sql.clone(),
        }
    }
}

/// Returns true if `name` can be used as a placeholder key.
pub fn is_valid_parameter_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Year-month a report is generated for, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportDate {
    year: i32,
    month: u32,
}

impl ReportDate {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        // Reject anything chrono would not accept as a calendar month.
        NaiveDate::from_ymd_opt(year, month, 1)?;
        if !(0..=9999).contains(&year) {
            return None;
        }
        Some(Self { year, month })
    }

    /// The current month in local time.
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Error returned when a report date is not `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid report date '{0}': expected YYYY-MM")]
pub struct ReportDateError(pub String);

impl FromStr for ReportDate {
    type Err = ReportDateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ReportDateError(s.to_string());
        let (year, month) = trimmed.split_once('-').ok_or_else(err)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !digits(year) || !digits(month) {
            return Err(err());
        }
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        ReportDate::new(year, month).ok_or_else(err)
    }
}

impl Serialize for ReportDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
