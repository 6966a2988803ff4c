//! Report generation: run every parameter query for a month and patch the
//! results into the template.

use crate::config::ReportConfig;
use crate::db::Database;
use crate::db::query::{QueryOutcome, substitute_date};
use crate::docx::{Substitution, Substitutions, Template, TemplateError};
use crate::types::{Parameter, ReportDate};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Errors that abort a generation run. Per-parameter query failures are not
/// errors; they become inline markers in the document.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("database unavailable: {0:#}")]
    Database(anyhow::Error),
}

/// How a single parameter resolved during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterOutcome {
    pub name: String,
    /// SQL actually executed, after date substitution.
    pub sql: String,
    pub outcome: QueryOutcome,
}

/// A finished document plus what went into it.
#[derive(Debug)]
pub struct GeneratedReport {
    pub content: Vec<u8>,
    pub substitutions: Substitutions,
    pub outcomes: Vec<ParameterOutcome>,
    /// Placeholder occurrences replaced in the document.
    pub replaced: usize,
}

/// Runs parameter queries against an injected database handle.
pub struct ReportGenerator<'a> {
    db: &'a Database,
    settings: &'a ReportConfig,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(db: &'a Database, settings: &'a ReportConfig) -> Self {
        Self { db, settings }
    }

    /// Execute each parameter's query for `date` and map the results to
    /// substitutions, in parameter order.
    ///
    /// When two parameters share a name the first one is used and the rest
    /// are skipped with a warning.
    pub fn resolve(
        &self,
        parameters: &[Parameter],
        date: &ReportDate,
    ) -> Result<(Substitutions, Vec<ParameterOutcome>), ReportError> {
        let mut subs = Substitutions::new();
        let mut outcomes = Vec::with_capacity(parameters.len());

        for param in parameters {
            if subs.contains(&param.name) {
                warn!(parameter = %param.name, id = %param.id, "Duplicate parameter name; skipping");
                continue;
            }

            let sql = substitute_date(&param.sql, &self.settings.date_token, date);
            let outcome = self
                .db
                .query_first_value(&sql)
                .map_err(ReportError::Database)?;

            let substitution = match &outcome {
                QueryOutcome::Value(text) => Substitution::Value(text.clone()),
                QueryOutcome::NoData => Substitution::Value(self.settings.no_data_text.clone()),
                QueryOutcome::Failed(err) => {
                    warn!(parameter = %param.name, error = %err, "Error executing query for parameter");
                    Substitution::Error(self.settings.error_marker.clone())
                }
            };
            debug!(parameter = %param.name, value = %substitution.text(), "Resolved parameter");

            subs.insert(param.name.clone(), substitution);
            outcomes.push(ParameterOutcome {
                name: param.name.clone(),
                sql,
                outcome,
            });
        }

        Ok((subs, outcomes))
    }

    /// Resolve all parameters and patch them into `template`.
    pub fn generate(
        &self,
        template: &Template,
        parameters: &[Parameter],
        date: &ReportDate,
    ) -> Result<GeneratedReport, ReportError> {
        let start = Instant::now();
        let (substitutions, outcomes) = self.resolve(parameters, date)?;
        let patched = template.patch(&substitutions)?;

        info!(
            report_date = %date,
            parameters = outcomes.len(),
            failed = substitutions.error_count(),
            replaced = patched.replaced,
            duration_ms = start.elapsed().as_millis() as u64,
            "Report generated"
        );

        Ok(GeneratedReport {
            content: patched.bytes,
            substitutions,
            outcomes,
            replaced: patched.replaced,
        })
    }
}

/// Download name for a generated report: `<template stem>-<YYYY-MM>.docx`.
pub fn output_file_name(template_name: Option<&str>, date: &ReportDate) -> String {
    let stem = template_name
        .map(|name| {
            Path::new(name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "report".to_string());
    format!("{}-{}.docx", stem, date)
}
