//! The five tool operations over an authenticated Salesforce session.
//!
//! Every check that can reject a request (rate limit, field names, picklist values,
//! ownership) runs before the write it guards, so a rejected request never leaves
//! a partial change behind.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use impltrack_core::domain::picklist::{
    implementation_picklist, Picklist, CONTRACT_TYPE, FEATURES, IMPLEMENTATION_TYPE,
    MIGRATION_TYPE, PROJECT_TASK, PROJECT_TYPE, RECORD_STAGE,
};
use impltrack_core::domain::record::{
    RecordId, UserIdentity, HOURS_OBJECT, IMPLEMENTATION_OBJECT, INITIAL_HEALTH, INITIAL_STAGE,
};
use impltrack_core::errors::{GatewayError, GatewayResult};
use impltrack_core::rate_limit::{Clock, RateLimitPolicy, RateLimiter, SystemClock};
use impltrack_core::validation::{
    parse_task_date, require_choice, validate_against, validate_hours, validate_optional,
    validate_updatable_fields, ValidationError,
};
use impltrack_crm::soql::{self, CannedQuery, IMPLEMENTATION_DETAIL_FIELDS};
use impltrack_crm::{AccessControlPolicy, IdentifierResolver, Record, SalesforceApi};
use serde_json::{json, Value};
use tracing::info;

use crate::format;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateImplementation {
    pub opportunity_id: String,
    pub implementation_type: String,
    pub contract_type: String,
    pub contracted_hours: Option<f64>,
    pub features: Option<String>,
    pub migration_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogHours {
    pub record: String,
    pub hours: f64,
    pub project_task: Option<String>,
    pub notes: Option<String>,
    pub task_date: Option<String>,
    pub project_type: Option<String>,
    pub record_stage: Option<String>,
}

/// Service context built once at startup and shared by every tool call.
pub struct Gateway {
    api: Arc<dyn SalesforceApi>,
    access: AccessControlPolicy,
    resolver: IdentifierResolver,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("access", &self.access)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(
        api: Arc<dyn SalesforceApi>,
        access: AccessControlPolicy,
        policy: RateLimitPolicy,
    ) -> Self {
        Self::with_clock(api, access, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: Arc<dyn SalesforceApi>,
        access: AccessControlPolicy,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver: IdentifierResolver::new(api.clone()),
            limiter: RateLimiter::with_clock(policy, clock.clone()),
            api,
            access,
            clock,
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        self.access.identity()
    }

    pub fn remaining_creates(&self) -> usize {
        self.limiter.remaining()
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&Local).date_naive()
    }

    pub async fn create_implementation(
        &self,
        request: CreateImplementation,
    ) -> GatewayResult<String> {
        let permit = self.limiter.try_acquire()?;

        reject_invalid(&IMPLEMENTATION_TYPE, &request.implementation_type)?;
        reject_invalid(&CONTRACT_TYPE, &request.contract_type)?;
        validate_optional(&MIGRATION_TYPE, non_empty(request.migration_type.as_deref()))?;
        validate_optional(&FEATURES, non_empty(request.features.as_deref()))?;

        let opportunity_id = request.opportunity_id.trim();
        let opportunity = self
            .api
            .query(&soql::opportunity_by_id(opportunity_id))
            .await?
            .records
            .into_iter()
            .next()
            .ok_or_else(|| {
                GatewayError::RecordNotFound(format!(
                    "No Opportunity found with ID: {opportunity_id}"
                ))
            })?;

        let account_name = opportunity
            .get("Account")
            .and_then(|account| account.get("Name"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let name = format!(
            "{account_name} - {} - {}",
            request.implementation_type,
            self.today().format("%Y-%m-%d")
        );

        let mut fields = Record::new();
        fields.insert("Name".into(), json!(name));
        fields.insert("Opportunity__c".into(), json!(opportunity_id));
        let account_id = opportunity.get("AccountId").cloned().unwrap_or(Value::Null);
        fields.insert("Account__c".into(), account_id);
        fields.insert("Type__c".into(), json!(request.implementation_type));
        fields.insert("Contract_Type__c".into(), json!(request.contract_type));
        fields.insert("Implementation_Stage__c".into(), json!(INITIAL_STAGE));
        fields.insert("Program_Health__c".into(), json!(INITIAL_HEALTH));
        fields.insert("In_Production__c".into(), json!(false));
        if let Some(hours) = request.contracted_hours {
            fields.insert("Contracted_Hours__c".into(), json!(hours));
        }
        if let Some(features) = non_empty(request.features.as_deref()) {
            fields.insert("Features__c".into(), json!(features));
        }
        if let Some(migration_type) = non_empty(request.migration_type.as_deref()) {
            fields.insert("Migration_Type__c".into(), json!(migration_type));
        }

        let created = self.api.create_record(IMPLEMENTATION_OBJECT, &fields).await?;
        permit.commit();
        info!(
            event_name = "gateway.implementation_created",
            record_id = %created.id,
            opportunity_id,
            "implementation record created"
        );

        Ok(format!(
            "Implementation created successfully.\n  Record ID: {}\n  Name: {name}\n  \
             Account: {account_name}\n  Type: {}\n  Contract: {}\n  Stage: {INITIAL_STAGE}\n  \
             Health: {INITIAL_HEALTH}",
            created.id, request.implementation_type, request.contract_type
        ))
    }

    pub async fn update_implementation(
        &self,
        name_or_id: &str,
        updates: Record,
    ) -> GatewayResult<String> {
        if updates.is_empty() {
            return Err(ValidationError::EmptyUpdate.into());
        }
        validate_updatable_fields(updates.keys().map(String::as_str))?;
        for (field, value) in &updates {
            check_update_value(field, value)?;
        }

        let record_id = self.resolver.resolve(name_or_id).await?;
        self.access.can_update(&record_id).await?.into_result()?;

        self.api.update_record(IMPLEMENTATION_OBJECT, record_id.as_str(), &updates).await?;
        info!(
            event_name = "gateway.implementation_updated",
            record_id = %record_id,
            field_count = updates.len(),
            "implementation record updated"
        );

        Ok(format!(
            "Updated {name_or_id} (ID: {record_id}): {}",
            format::field_summary(&updates)
        ))
    }

    pub async fn log_hours(&self, request: LogHours) -> GatewayResult<String> {
        let permit = self.limiter.try_acquire()?;

        let task = require_choice(&PROJECT_TASK, request.project_task.as_deref())?;
        validate_hours(request.hours)?;
        let project_type = non_empty(request.project_type.as_deref());
        let record_stage = non_empty(request.record_stage.as_deref());
        validate_optional(&PROJECT_TYPE, project_type)?;
        validate_optional(&RECORD_STAGE, record_stage)?;
        let task_date = match non_empty(request.task_date.as_deref()) {
            Some(raw) => parse_task_date(raw)?,
            None => self.today(),
        };
        let notes = non_empty(request.notes.as_deref());

        let record_id = self.resolver.resolve(&request.record).await?;

        let mut fields = Record::new();
        fields.insert("Implementation__c".into(), json!(record_id.as_str()));
        fields.insert("Hours_Worked__c".into(), json!(request.hours));
        fields.insert("Project_Task__c".into(), json!(task));
        if let Some(notes) = notes {
            fields.insert("Notes__c".into(), json!(notes));
        }
        fields.insert("Task_Date__c".into(), json!(task_date.format("%Y-%m-%d").to_string()));
        if let Some(project_type) = project_type {
            fields.insert("Project_Type__c".into(), json!(project_type));
        }
        if let Some(record_stage) = record_stage {
            fields.insert("Record_Stage__c".into(), json!(record_stage));
        }

        let created = self.api.create_record(HOURS_OBJECT, &fields).await?;
        permit.commit();
        info!(
            event_name = "gateway.hours_logged",
            record_id = %record_id,
            hours_record_id = %created.id,
            hours = request.hours,
            "hours record created"
        );

        let mut message = format!(
            "Hours logged successfully.\n  Hours Record ID: {}\n  Implementation: {} (ID: {record_id})\n  \
             Hours: {}\n  Task: {task}\n  Date: {}",
            created.id,
            request.record,
            request.hours,
            task_date.format("%Y-%m-%d")
        );
        if let Some(notes) = notes {
            message.push_str(&format!("\n  Notes: {notes}"));
        }
        Ok(message)
    }

    pub async fn query_implementations(
        &self,
        query_type: &str,
        custom_soql: Option<&str>,
    ) -> GatewayResult<String> {
        let query_type = query_type.trim();
        let (statement, grouped) = if query_type == "custom" {
            let statement = non_empty(custom_soql).ok_or(ValidationError::QueryRequired)?;
            if !soql::is_read_only(statement) {
                return Err(ValidationError::ReadOnlyQuery.into());
            }
            (statement.to_string(), false)
        } else {
            let canned = CannedQuery::parse(query_type).ok_or_else(|| {
                ValidationError::UnknownQueryType {
                    given: query_type.to_string(),
                    expected: soql::query_type_tags(),
                }
            })?;
            (canned.soql().to_string(), canned.is_grouped())
        };

        let result = self.api.query(&statement).await?;
        let total = result.total_size.max(result.records.len() as u64);
        if total == 0 {
            return Err(GatewayError::RecordNotFound(format!(
                "No results found for query type '{query_type}'."
            )));
        }

        info!(event_name = "gateway.query_completed", query_type, total, "query completed");
        Ok(if grouped {
            format::stage_counts(total, &result.records)
        } else {
            format::record_list(total, &result.records)
        })
    }

    pub async fn get_implementation(&self, name_or_id: &str) -> GatewayResult<String> {
        let record_id = self.resolver.resolve(name_or_id).await?;
        let record = self
            .api
            .get_record(IMPLEMENTATION_OBJECT, record_id.as_str(), IMPLEMENTATION_DETAIL_FIELDS)
            .await
            .map_err(|error| not_found_as_message(error, &record_id))?;
        Ok(format::implementation_summary(&record))
    }
}

/// Blank input counts as absent. Anything else is passed through untouched.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn reject_invalid(picklist: &Picklist, value: &str) -> Result<(), ValidationError> {
    validate_against(picklist, value).map_or(Ok(()), Err)
}

/// Picklist fields take strings (or null to clear). Other fields accept any JSON value.
fn check_update_value(field: &str, value: &Value) -> Result<(), ValidationError> {
    let Some(picklist) = implementation_picklist(field) else {
        return Ok(());
    };
    match value {
        Value::String(text) => reject_invalid(picklist, text),
        Value::Null => Ok(()),
        other => Err(ValidationError::InvalidValue {
            field: picklist.field,
            value: other.to_string(),
            allowed: picklist.values,
        }),
    }
}

fn not_found_as_message(error: GatewayError, record_id: &RecordId) -> GatewayError {
    match error {
        GatewayError::Upstream(upstream) if upstream.is_not_found() => {
            GatewayError::RecordNotFound(format!(
                "No Implementation record found with ID: {record_id}"
            ))
        }
        other => other,
    }
}
