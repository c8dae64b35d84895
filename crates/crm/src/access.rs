use std::sync::Arc;

use impltrack_core::domain::record::{
    normalize_email, RecordId, RecordRef, UserIdentity, IMPLEMENTATION_OBJECT, OWNER_FIELD,
};
use impltrack_core::errors::{GatewayError, GatewayResult};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::SalesforceApi;
use crate::soql;

pub const ACCESS_DENIED_REASON: &str = "Access denied: you are not the assigned CDE on this \
     record. Only the CDE, admins, or the manager can update it.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny { reason: &'static str },
}

impl AccessDecision {
    /// Converts a denial into the error surfaced to the caller.
    pub fn into_result(self) -> GatewayResult<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny { reason } => Err(GatewayError::AccessDenied(reason.to_string())),
        }
    }
}

/// Per-record update authorization for the operating user.
///
/// Admins and the configured manager may update anything. Everyone else may only
/// update records whose `CDE__c` is their own user id. Ownership is read fresh on
/// every check.
pub struct AccessControlPolicy {
    api: Arc<dyn SalesforceApi>,
    identity: UserIdentity,
}

impl std::fmt::Debug for AccessControlPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlPolicy").field("identity", &self.identity).finish()
    }
}

impl AccessControlPolicy {
    /// Looks up the single active user with `email`. Zero or several matches fail.
    pub async fn resolve(
        api: Arc<dyn SalesforceApi>,
        email: &str,
        manager_email: Option<&str>,
    ) -> GatewayResult<Self> {
        let email = normalize_email(email);
        let result = api.query(&soql::active_user_by_email(&email)).await?;

        let user = match result.records.as_slice() {
            [] => {
                return Err(GatewayError::Authentication(format!(
                    "No active Salesforce user found for email: {email}"
                )))
            }
            [user] => user,
            _ => {
                return Err(GatewayError::Authentication(format!(
                    "Multiple active Salesforce users match email: {email}"
                )))
            }
        };

        let user_id = user.get("Id").and_then(Value::as_str).ok_or_else(|| {
            GatewayError::Authentication(format!("User record for {email} has no Id"))
        })?;
        let profile_name = user
            .get("Profile")
            .and_then(|profile| profile.get("Name"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        let identity = UserIdentity::new(&email, user_id, profile_name, manager_email);
        info!(
            event_name = "access.identity_resolved",
            user_id = %identity.user_id,
            profile = %identity.profile_name,
            is_admin = identity.is_admin,
            is_manager = identity.is_manager,
            "resolved operating user"
        );
        Ok(Self::from_identity(api, identity))
    }

    pub fn from_identity(api: Arc<dyn SalesforceApi>, identity: UserIdentity) -> Self {
        Self { api, identity }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub async fn can_update(&self, record_id: &RecordId) -> GatewayResult<AccessDecision> {
        if self.identity.is_privileged() {
            return Ok(AccessDecision::Allow);
        }

        let record = self
            .api
            .get_record(IMPLEMENTATION_OBJECT, record_id.as_str(), &[OWNER_FIELD])
            .await
            .map_err(|error| match error {
                GatewayError::Upstream(upstream) if upstream.is_not_found() => {
                    GatewayError::RecordNotFound(format!(
                        "No Implementation record found with ID: {record_id}"
                    ))
                }
                other => other,
            })?;

        let target = RecordRef {
            id: record_id.clone(),
            owner_id: record.get(OWNER_FIELD).and_then(Value::as_str).map(str::to_string),
        };
        if target.owner_id.as_deref() == Some(self.identity.user_id.as_str()) {
            return Ok(AccessDecision::Allow);
        }

        debug!(
            event_name = "access.denied",
            record_id = %target.id,
            owner = target.owner_id.as_deref().unwrap_or_default(),
            "caller is not the record owner"
        );
        Ok(AccessDecision::Deny { reason: ACCESS_DENIED_REASON })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use impltrack_core::domain::record::{RecordId, UserIdentity};
    use impltrack_core::errors::GatewayError;
    use serde_json::json;

    use super::{AccessControlPolicy, AccessDecision, ACCESS_DENIED_REASON};
    use crate::test_support::FakeSalesforce;

    const RECORD: &str = "a0B5f000001abcD";

    fn record_id() -> RecordId {
        RecordId(RECORD.to_string())
    }

    fn policy(
        fake: &Arc<FakeSalesforce>,
        profile: &str,
        manager: Option<&str>,
    ) -> AccessControlPolicy {
        let identity = UserIdentity::new("cde@example.com", "005CDE", profile, manager);
        AccessControlPolicy::from_identity(fake.clone(), identity)
    }

    #[tokio::test]
    async fn admin_and_manager_are_allowed_without_reading_the_record() {
        let fake = Arc::new(FakeSalesforce::new());
        fake.with_record(RECORD, json!({"CDE__c": "005SOMEONE"}));

        let admin = policy(&fake, "System Administrator", None);
        assert_eq!(admin.can_update(&record_id()).await, Ok(AccessDecision::Allow));

        let manager = policy(&fake, "Standard User", Some("CDE@example.com"));
        assert_eq!(manager.can_update(&record_id()).await, Ok(AccessDecision::Allow));

        assert_eq!(fake.get_count(), 0);
    }

    #[tokio::test]
    async fn owner_is_allowed_after_one_read() {
        let fake = Arc::new(FakeSalesforce::new());
        fake.with_record(RECORD, json!({"CDE__c": "005CDE"}));

        let decision = policy(&fake, "Standard User", None).can_update(&record_id()).await;
        assert_eq!(decision, Ok(AccessDecision::Allow));
        assert_eq!(fake.get_count(), 1);
    }

    #[tokio::test]
    async fn non_owner_is_denied_with_fixed_reason() {
        let fake = Arc::new(FakeSalesforce::new());
        fake.with_record(RECORD, json!({"CDE__c": "005SOMEONE"}));

        let decision = policy(&fake, "Standard User", None)
            .can_update(&record_id())
            .await
            .expect("decision");
        assert_eq!(decision, AccessDecision::Deny { reason: ACCESS_DENIED_REASON });
        assert_eq!(
            decision.into_result(),
            Err(GatewayError::AccessDenied(ACCESS_DENIED_REASON.to_string()))
        );
    }

    #[tokio::test]
    async fn unassigned_record_is_denied() {
        let fake = Arc::new(FakeSalesforce::new());
        fake.with_record(RECORD, json!({"CDE__c": null}));

        let decision = policy(&fake, "Standard User", None).can_update(&record_id()).await;
        assert!(matches!(decision, Ok(AccessDecision::Deny { .. })), "{decision:?}");
    }

    #[tokio::test]
    async fn missing_record_is_reported_as_not_found() {
        let fake = Arc::new(FakeSalesforce::new());

        let error = policy(&fake, "Standard User", None)
            .can_update(&record_id())
            .await
            .expect_err("record does not exist");
        assert_eq!(
            error,
            GatewayError::RecordNotFound(format!("No Implementation record found with ID: {RECORD}"))
        );
    }

    #[tokio::test]
    async fn identity_resolution_requires_exactly_one_active_user() {
        let fake = Arc::new(FakeSalesforce::new());
        fake.on_query(
            "FROM User WHERE Email = 'lead@example.com'",
            vec![json!({"Id": "005LEAD", "Profile": {"Name": "System Administrator"}})],
        );
        fake.on_query(
            "FROM User WHERE Email = 'twin@example.com'",
            vec![json!({"Id": "005A"}), json!({"Id": "005B"})],
        );

        let resolved = AccessControlPolicy::resolve(fake.clone(), " Lead@Example.com", None)
            .await
            .expect("single match");
        assert_eq!(resolved.identity().user_id, "005LEAD");
        assert!(resolved.identity().is_admin);

        let missing = AccessControlPolicy::resolve(fake.clone(), "ghost@example.com", None).await;
        assert!(matches!(missing, Err(GatewayError::Authentication(_))));

        let ambiguous = AccessControlPolicy::resolve(fake.clone(), "twin@example.com", None).await;
        assert!(matches!(ambiguous, Err(GatewayError::Authentication(_))));
    }
}
