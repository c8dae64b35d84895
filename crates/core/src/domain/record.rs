use serde::{Deserialize, Serialize};

pub const IMPLEMENTATION_OBJECT: &str = "Implementation__c";
pub const HOURS_OBJECT: &str = "Implementation_Hours__c";
pub const OPPORTUNITY_OBJECT: &str = "Opportunity";

/// Key prefix shared by every `Implementation__c` record id.
pub const IMPLEMENTATION_ID_PREFIX: &str = "a0";

/// Field holding the assigned CDE, the owner used for update authorization.
pub const OWNER_FIELD: &str = "CDE__c";

pub const ADMIN_PROFILE: &str = "System Administrator";

pub const INITIAL_STAGE: &str = "00 - Kick Off Call";
pub const INITIAL_HEALTH: &str = "Healthy";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Treats `input` as a canonical `Implementation__c` id when it has the shape of one.
///
/// Only the length (15 or 18 characters) and the object prefix are inspected.
/// Existence is not checked here; the operation that uses the id finds out.
pub fn parse_record_id(input: &str) -> Option<RecordId> {
    let trimmed = input.trim();
    let length = trimmed.chars().count();
    if length != 15 && length != 18 {
        return None;
    }

    let prefix: String = trimmed.chars().take(2).collect();
    prefix.eq_ignore_ascii_case(IMPLEMENTATION_ID_PREFIX).then(|| RecordId(trimmed.to_string()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordRef {
    pub id: RecordId,
    pub owner_id: Option<String>,
}

/// The operating user, resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub email: String,
    pub user_id: String,
    pub profile_name: String,
    pub is_admin: bool,
    pub is_manager: bool,
}

impl UserIdentity {
    pub fn new(
        email: &str,
        user_id: impl Into<String>,
        profile_name: impl Into<String>,
        manager_email: Option<&str>,
    ) -> Self {
        let email = normalize_email(email);
        let profile_name = profile_name.into();
        let is_manager = manager_email
            .map(normalize_email)
            .is_some_and(|manager| !manager.is_empty() && manager == email);

        Self {
            is_admin: profile_name == ADMIN_PROFILE,
            is_manager,
            email,
            user_id: user_id.into(),
            profile_name,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.is_admin || self.is_manager
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
