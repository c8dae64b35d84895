//! MCP server exposing the gateway operations as tools over stdio.

use std::future::Future;
use std::sync::Arc;

use impltrack_core::errors::GatewayResult;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::gateway::{CreateImplementation, Gateway, LogHours};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateImplementationInput {
    #[schemars(description = "The 15 or 18-character Salesforce Opportunity ID (starts with 006)")]
    pub opportunity_id: String,
    #[serde(rename = "type")]
    #[schemars(
        description = "Implementation type. One of: Join, Pure Migration, Join - Lite, Join - Quickstart, Other"
    )]
    pub implementation_type: String,
    #[schemars(description = "Contract type. One of: Annual, Free Trial, Pay as you go")]
    pub contract_type: String,
    #[schemars(description = "Number of contracted hours")]
    #[serde(default)]
    pub contracted_hours: Option<f64>,
    #[schemars(
        description = "Semicolon-separated features, e.g. \"Compression;Hypertables\". Valid values: Read Replicas, HA Replicas, Data Tiering, Caggs, Compression, Migration, Vector, Hypertables"
    )]
    #[serde(default)]
    pub features: Option<String>,
    #[schemars(
        description = "Migration type. Valid values: Customer Tooling, Dual-write and backfill, Parallel Copy, pg_dump and pg_restore, NA, TS Tooling, Live Migration"
    )]
    #[serde(default)]
    pub migration_type: Option<String>,
}

impl From<CreateImplementationInput> for CreateImplementation {
    fn from(input: CreateImplementationInput) -> Self {
        Self {
            opportunity_id: input.opportunity_id,
            implementation_type: input.implementation_type,
            contract_type: input.contract_type,
            contracted_hours: input.contracted_hours,
            features: input.features,
            migration_type: input.migration_type,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateImplementationInput {
    #[schemars(description = "Implementation record Name (e.g. \"IMPL-0042\") or Salesforce ID")]
    pub record_name_or_id: String,
    #[schemars(
        description = "Field API names mapped to new values. Updatable fields include Implementation_Stage__c, Program_Health__c, Type__c, Contract_Type__c, Migration_Type__c, Features__c, Contracted_Hours__c, Percent_Complete__c, In_Production__c, Risks__c, Comments__c, Post_Mortem__c, Technical_Win__c, CDE__c, CSM__c, Next_Step_Date__c, Estimated_Graduation_Date__c, Production_Date__c and more. Dates use YYYY-MM-DD."
    )]
    pub updates: Map<String, Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LogHoursInput {
    #[schemars(description = "Implementation record Name (e.g. \"IMPL-0042\") or Salesforce ID")]
    pub record_name_or_id: String,
    #[schemars(description = "Number of hours worked")]
    pub hours: f64,
    #[schemars(
        description = "Task category, confirmed by the user. Valid values: CAGG, Case work, Compression, Connection Pooling, HA Replica, Hypershift, Ingest, Internal Meetings - Non Customer, Internal Testing, Migration, POC, Project Plan, Query Optimization, Read Replica, Replica, Retention, CNS, Sales, Sales Call, Schema Design, Security, Sizing, Troubleshooting, VPC. Multiple values can be semicolon-separated."
    )]
    #[serde(default)]
    pub project_task: Option<String>,
    #[schemars(description = "Description of the work done")]
    #[serde(default)]
    pub notes: Option<String>,
    #[schemars(description = "Date in YYYY-MM-DD format. Defaults to today")]
    #[serde(default)]
    pub task_date: Option<String>,
    #[schemars(
        description = "Project type. Valid values: Churn, Implementation, Internal Meetings, Join, Join - Lite, Join - QS, Pre-Sales, Pre-Sales (Discover Call), Projects, Support, Training"
    )]
    #[serde(default)]
    pub project_type: Option<String>,
    #[schemars(description = "Record stage. Valid values: Trial, Pre-Production, Production")]
    #[serde(default)]
    pub record_stage: Option<String>,
}

impl From<LogHoursInput> for LogHours {
    fn from(input: LogHoursInput) -> Self {
        Self {
            record: input.record_name_or_id,
            hours: input.hours,
            project_task: input.project_task,
            notes: input.notes,
            task_date: input.task_date,
            project_type: input.project_type,
            record_stage: input.record_stage,
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryImplementationsInput {
    #[schemars(
        description = "One of: at_risk (health Risk, High Risk or Churn), active (not Complete, Passive or Unsuccessful), bandwidth (hours remaining on active implementations), stale (Stale_Days > 14), by_stage (count grouped by stage), custom (run custom_soql)"
    )]
    pub query_type: String,
    #[schemars(description = "Required when query_type is \"custom\". A SOQL SELECT query")]
    #[serde(default)]
    pub custom_soql: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetImplementationInput {
    #[schemars(description = "Implementation record Name (e.g. \"IMPL-0042\") or Salesforce ID")]
    pub record_name_or_id: String,
}

#[derive(Clone)]
pub struct ImpltrackMcpServer {
    gateway: Arc<Gateway>,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for ImpltrackMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpltrackMcpServer").field("gateway", &self.gateway).finish_non_exhaustive()
    }
}

#[tool_router]
impl ImpltrackMcpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway, tool_router: Self::tool_router() }
    }

    #[tool(
        name = "create_implementation",
        description = "Create a new Implementation__c record from an Opportunity ID. The record starts at stage 00 - Kick Off Call with health Healthy."
    )]
    async fn create_implementation(
        &self,
        Parameters(input): Parameters<CreateImplementationInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("create_implementation", self.gateway.create_implementation(input.into()))
            .await
    }

    #[tool(
        name = "update_implementation",
        description = "Update fields on an existing Implementation__c record. Only the assigned CDE, admins, or the manager can update a record."
    )]
    async fn update_implementation(
        &self,
        Parameters(input): Parameters<UpdateImplementationInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation =
            self.gateway.update_implementation(&input.record_name_or_id, input.updates);
        respond("update_implementation", operation).await
    }

    #[tool(
        name = "log_hours",
        description = "Log hours on an Implementation by creating an Implementation_Hours__c record. IMPORTANT: do NOT call this tool until you have asked the user to select a project_task from the valid values. Always present the list and let the user choose, even if they mentioned a task in their request."
    )]
    async fn log_hours(
        &self,
        Parameters(input): Parameters<LogHoursInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("log_hours", self.gateway.log_hours(input.into())).await
    }

    #[tool(
        name = "query_implementations",
        description = "Query Implementation__c records with a canned report (at_risk, active, bandwidth, stale, by_stage) or a custom SELECT statement."
    )]
    async fn query_implementations(
        &self,
        Parameters(input): Parameters<QueryImplementationsInput>,
    ) -> Result<CallToolResult, McpError> {
        let operation =
            self.gateway.query_implementations(&input.query_type, input.custom_soql.as_deref());
        respond("query_implementations", operation).await
    }

    #[tool(
        name = "get_implementation",
        description = "Get full details of a single Implementation__c record by Name or ID."
    )]
    async fn get_implementation(
        &self,
        Parameters(input): Parameters<GetImplementationInput>,
    ) -> Result<CallToolResult, McpError> {
        respond("get_implementation", self.gateway.get_implementation(&input.record_name_or_id))
            .await
    }
}

impl ImpltrackMcpServer {
    pub async fn run_stdio(self) -> anyhow::Result<()> {
        info!(event_name = "mcp.server.start", transport = "stdio", "serving MCP over stdio");
        let service = self.serve(rmcp::transport::stdio()).await?;
        let reason = service.waiting().await?;
        info!(event_name = "mcp.server.stop", reason = ?reason, "MCP session ended");
        Ok(())
    }
}

/// Runs one tool call under its own correlation id and turns the outcome into tool text.
async fn respond<F>(tool: &'static str, operation: F) -> Result<CallToolResult, McpError>
where
    F: Future<Output = GatewayResult<String>>,
{
    let correlation_id = Uuid::new_v4();
    let span = info_span!("tool_call", tool, correlation_id = %correlation_id);
    let outcome = operation.instrument(span).await;

    Ok(match outcome {
        Ok(text) => {
            info!(
                event_name = "mcp.tool.completed",
                tool,
                correlation_id = %correlation_id,
                "tool call completed"
            );
            CallToolResult::success(vec![Content::text(text)])
        }
        Err(error) => {
            warn!(
                event_name = "mcp.tool.failed",
                tool,
                correlation_id = %correlation_id,
                reason_code = error.reason_code(),
                rejected = error.is_rejection(),
                error = %error,
                "tool call failed"
            );
            CallToolResult::error(vec![Content::text(error.to_string())])
        }
    })
}

#[tool_handler]
impl ServerHandler for ImpltrackMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Implementation tracking for Salesforce. Create, update, query and log hours \
                 against Implementation__c records as the configured user."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateImplementationInput, LogHoursInput};
    use crate::gateway::{CreateImplementation, LogHours};

    #[test]
    fn create_input_accepts_type_keyword() {
        let input: CreateImplementationInput = serde_json::from_value(json!({
            "opportunity_id": "0065f000001abcD",
            "type": "Join",
            "contract_type": "Annual",
        }))
        .expect("valid input");

        let request = CreateImplementation::from(input);
        assert_eq!(request.implementation_type, "Join");
        assert_eq!(request.contracted_hours, None);
    }

    #[test]
    fn log_hours_input_leaves_task_optional() {
        let input: LogHoursInput = serde_json::from_value(json!({
            "record_name_or_id": "IMPL-0042",
            "hours": 1.5,
        }))
        .expect("valid input");

        let request = LogHours::from(input);
        assert_eq!(request.record, "IMPL-0042");
        assert_eq!(request.project_task, None);
    }
}
