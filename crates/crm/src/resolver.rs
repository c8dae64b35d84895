use std::sync::Arc;

use impltrack_core::domain::record::{parse_record_id, RecordId};
use impltrack_core::errors::{GatewayError, GatewayResult};
use serde_json::Value;
use tracing::debug;

use crate::client::SalesforceApi;
use crate::soql;

/// Turns a record name or id typed by a person into a canonical record id.
pub struct IdentifierResolver {
    api: Arc<dyn SalesforceApi>,
}

impl IdentifierResolver {
    pub fn new(api: Arc<dyn SalesforceApi>) -> Self {
        Self { api }
    }

    /// Canonical ids pass through without a query; anything else is looked up by exact name.
    pub async fn resolve(&self, name_or_id: &str) -> GatewayResult<RecordId> {
        if let Some(id) = parse_record_id(name_or_id) {
            return Ok(id);
        }

        let name = name_or_id.trim();
        let result = self.api.query(&soql::implementation_by_name(name)).await?;
        match result.records.as_slice() {
            [] => Err(GatewayError::RecordNotFound(format!(
                "No Implementation record found with Name: {name}"
            ))),
            [record] => {
                let id = record.get("Id").and_then(Value::as_str).ok_or_else(|| {
                    GatewayError::RecordNotFound(format!(
                        "No Implementation record found with Name: {name}"
                    ))
                })?;
                debug!(event_name = "resolver.name_resolved", name, record_id = id);
                Ok(RecordId(id.to_string()))
            }
            _ => Err(GatewayError::RecordNotFound(format!(
                "Multiple Implementation records match Name: {name}; use the record ID instead"
            ))),
        }
    }
}
