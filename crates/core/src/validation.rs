//! Field-name and field-value checks applied before any write reaches Salesforce.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::picklist::{implementation_picklist, is_updatable, Picklist, PicklistKind};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Cannot update field(s): {}. Not in the allowed update list.", .fields.join(", "))]
    UnknownFields { fields: Vec<String> },
    #[error("Invalid value '{value}' for {field}. Valid values: {}", .allowed.join(", "))]
    InvalidValue { field: &'static str, value: String, allowed: &'static [&'static str] },
    #[error(
        "Invalid value(s) [{}] for {field}. Valid values: {}",
        quote_list(.invalid),
        .allowed.join(", ")
    )]
    InvalidValues { field: &'static str, invalid: Vec<String>, allowed: &'static [&'static str] },
    #[error(
        "A {} is required. Please ask the user to select from:\n{}",
        .label.to_lowercase(),
        bullet_list(.allowed)
    )]
    MissingChoice { label: &'static str, allowed: &'static [&'static str] },
    #[error("No fields to update were provided.")]
    EmptyUpdate,
    #[error("Hours must be a positive number, got {0}.")]
    InvalidHours(f64),
    #[error("Invalid date '{0}'. Dates must use the YYYY-MM-DD format.")]
    InvalidDate(String),
    #[error("custom_soql is required when query_type is 'custom'.")]
    QueryRequired,
    #[error("Only SELECT queries are allowed.")]
    ReadOnlyQuery,
    #[error("Invalid query_type '{given}'. Must be one of: {}", .expected.join(", "))]
    UnknownQueryType { given: String, expected: Vec<&'static str> },
}

impl ValidationError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownFields { .. } => "validation.unknown_fields",
            Self::InvalidValue { .. } | Self::InvalidValues { .. } => "validation.invalid_value",
            Self::MissingChoice { .. } => "validation.missing_choice",
            Self::EmptyUpdate => "validation.empty_update",
            Self::InvalidHours(_) => "validation.invalid_hours",
            Self::InvalidDate(_) => "validation.invalid_date",
            Self::QueryRequired => "validation.query_required",
            Self::ReadOnlyQuery => "validation.read_only_query",
            Self::UnknownQueryType { .. } => "validation.unknown_query_type",
        }
    }
}

/// Checks `value` against the `Implementation__c` domain for `field`, if it has one.
pub fn validate_field(field: &str, value: &str) -> Option<ValidationError> {
    implementation_picklist(field).and_then(|picklist| validate_against(picklist, value))
}

pub fn validate_against(picklist: &Picklist, value: &str) -> Option<ValidationError> {
    match picklist.kind {
        PicklistKind::Single if picklist.contains(value) => None,
        PicklistKind::Single => Some(ValidationError::InvalidValue {
            field: picklist.field,
            value: value.to_string(),
            allowed: picklist.values,
        }),
        PicklistKind::Multi => {
            let invalid: Vec<String> = split_multi(value)
                .into_iter()
                .filter(|part| !picklist.contains(part))
                .map(str::to_string)
                .collect();
            if invalid.is_empty() {
                None
            } else {
                Some(ValidationError::InvalidValues {
                    field: picklist.field,
                    invalid,
                    allowed: picklist.values,
                })
            }
        }
    }
}

/// Rejects the whole batch when any name falls outside the updatable field set.
pub fn validate_updatable_fields<'a, I>(fields: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let unknown: Vec<String> =
        fields.into_iter().filter(|field| !is_updatable(field)).map(str::to_string).collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::UnknownFields { fields: unknown })
    }
}

/// A mandatory choice: absent or blank input yields the full list for the user to pick from.
pub fn require_choice<'a>(
    picklist: &Picklist,
    value: Option<&'a str>,
) -> Result<&'a str, ValidationError> {
    let value = value.map(str::trim).filter(|value| !value.is_empty()).ok_or(
        ValidationError::MissingChoice { label: picklist.label, allowed: picklist.values },
    )?;
    match validate_against(picklist, value) {
        Some(error) => Err(error),
        None => Ok(value),
    }
}

pub fn validate_optional(picklist: &Picklist, value: Option<&str>) -> Result<(), ValidationError> {
    match value.and_then(|value| validate_against(picklist, value)) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

pub fn validate_hours(hours: f64) -> Result<(), ValidationError> {
    if hours.is_finite() && hours > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidHours(hours))
    }
}

pub fn parse_task_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

pub fn split_multi(value: &str) -> Vec<&str> {
    value.split(';').map(str::trim).collect()
}

fn quote_list(values: &[String]) -> String {
    values.iter().map(|value| format!("'{value}'")).collect::<Vec<_>>().join(", ")
}

fn bullet_list(values: &[&str]) -> String {
    values.iter().map(|value| format!("  - {value}")).collect::<Vec<_>>().join("\n")
}
