//! JSON Schema (Draft 2020-12) checks for decisions, summaries and exports.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::Value;

const DAILY_DECISIONS_SCHEMA: &str = include_str!("../../schemas/daily_decisions.schema.json");
const WEEKLY_SUMMARY_SCHEMA: &str = include_str!("../../schemas/weekly_summary.schema.json");
const EXPORT_SCHEMA: &str = include_str!("../../schemas/export.schema.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    DailyDecisions,
    WeeklySummary,
    Export,
}

impl SchemaKind {
    fn name(self) -> &'static str {
        match self {
            SchemaKind::DailyDecisions => "daily decisions",
            SchemaKind::WeeklySummary => "weekly summary",
            SchemaKind::Export => "export",
        }
    }

    fn validator(self) -> &'static Validator {
        static DAILY: LazyLock<Validator> = LazyLock::new(|| compile(DAILY_DECISIONS_SCHEMA));
        static WEEKLY: LazyLock<Validator> = LazyLock::new(|| compile(WEEKLY_SUMMARY_SCHEMA));
        static EXPORT: LazyLock<Validator> = LazyLock::new(|| compile(EXPORT_SCHEMA));
        match self {
            SchemaKind::DailyDecisions => LazyLock::force(&DAILY),
            SchemaKind::WeeklySummary => LazyLock::force(&WEEKLY),
            SchemaKind::Export => LazyLock::force(&EXPORT),
        }
    }
}

fn compile(raw: &str) -> Validator {
    let schema: Value = serde_json::from_str(raw).expect("bundled schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("bundled schema should compile")
}

/// Validate a JSON instance, joining every violation into one error.
pub fn validate_value(kind: SchemaKind, instance: &Value) -> Result<()> {
    let messages: Vec<String> = kind
        .validator()
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("{} schema validation failed: {}", kind.name(), messages.join("; "));
    }
    Ok(())
}

/// Serialize `value` and validate it.
pub fn validate<T: Serialize>(kind: SchemaKind, value: &T) -> Result<()> {
    let instance = serde_json::to_value(value)
        .with_context(|| format!("serialize {} for validation", kind.name()))?;
    validate_value(kind, &instance)
}
