//! SOQL text used by the gateway: literal quoting, lookups, and the canned report queries.

use impltrack_core::domain::record::{IMPLEMENTATION_OBJECT, OPPORTUNITY_OBJECT};

/// Wraps `value` in single quotes, escaping characters SOQL treats specially inside literals.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// Fetches at most two rows so an ambiguous match is observable.
pub fn active_user_by_email(email: &str) -> String {
    format!(
        "SELECT Id, Profile.Name FROM User WHERE Email = {} AND IsActive = true LIMIT 2",
        quote(email)
    )
}

pub fn implementation_by_name(name: &str) -> String {
    format!("SELECT Id FROM {IMPLEMENTATION_OBJECT} WHERE Name = {} LIMIT 2", quote(name))
}

pub fn opportunity_by_id(opportunity_id: &str) -> String {
    format!(
        "SELECT Id, Name, AccountId, Account.Name, Amount, OwnerId FROM {OPPORTUNITY_OBJECT} \
         WHERE Id = {}",
        quote(opportunity_id)
    )
}

/// Caller-supplied statements must be plain SELECTs.
pub fn is_read_only(statement: &str) -> bool {
    statement.trim_start().to_ascii_uppercase().starts_with("SELECT")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CannedQuery {
    AtRisk,
    Active,
    Bandwidth,
    Stale,
    ByStage,
}

impl CannedQuery {
    pub const ALL: [Self; 5] =
        [Self::AtRisk, Self::Active, Self::Bandwidth, Self::Stale, Self::ByStage];

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|query| query.tag() == tag.trim())
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::AtRisk => "at_risk",
            Self::Active => "active",
            Self::Bandwidth => "bandwidth",
            Self::Stale => "stale",
            Self::ByStage => "by_stage",
        }
    }

    /// Aggregate queries return group rows rather than records.
    pub fn is_grouped(&self) -> bool {
        matches!(self, Self::ByStage)
    }

    pub fn soql(&self) -> &'static str {
        match self {
            Self::AtRisk => {
                "SELECT Name, Id, Account__r.Name, Program_Health__c, Risks__c, \
                 Implementation_Stage__c \
                 FROM Implementation__c \
                 WHERE Program_Health__c IN ('Risk', 'High Risk', 'Churn') \
                 ORDER BY Program_Health__c"
            }
            Self::Active => {
                "SELECT Name, Id, Account__r.Name, Implementation_Stage__c, Percent_Complete__c, \
                 Program_Health__c, Stale_Days__c \
                 FROM Implementation__c \
                 WHERE Implementation_Stage__c NOT IN ('05 - Complete', '06 - Passive', '08 - Unsuccessful') \
                 ORDER BY Implementation_Stage__c"
            }
            Self::Bandwidth => {
                "SELECT Name, Id, Contracted_Hours__c, Actual_Hours_Spent__c, \
                 Contracted_Hours_Remaining__c \
                 FROM Implementation__c \
                 WHERE Implementation_Stage__c IN ('01 - Explore', '02 - Planning', '03 - In Progress') \
                 ORDER BY Contracted_Hours_Remaining__c ASC"
            }
            Self::Stale => {
                "SELECT Name, Id, Stale_Days__c, Next_Step_Date__c, Implementation_Stage__c, \
                 Account__r.Name \
                 FROM Implementation__c \
                 WHERE Stale_Days__c > 14 \
                 ORDER BY Stale_Days__c DESC"
            }
            Self::ByStage => {
                "SELECT Implementation_Stage__c, COUNT(Id) total \
                 FROM Implementation__c \
                 GROUP BY Implementation_Stage__c \
                 ORDER BY Implementation_Stage__c"
            }
        }
    }
}

/// Query types accepted by the query operation, canned ones first.
pub fn query_type_tags() -> Vec<&'static str> {
    CannedQuery::ALL.iter().map(CannedQuery::tag).chain(std::iter::once("custom")).collect()
}

/// Fields fetched for a full record view.
pub const IMPLEMENTATION_DETAIL_FIELDS: &[&str] = &[
    "Id",
    "Name",
    "Implementation_Stage__c",
    "Program_Health__c",
    "Type__c",
    "Contract_Type__c",
    "Percent_Complete__c",
    "In_Production__c",
    "Account__c",
    "Opportunity__c",
    "CDE__c",
    "CSM__c",
    "SA__c",
    "Contracted_Hours__c",
    "Actual_Hours_Spent__c",
    "Contracted_Hours_Remaining__c",
    "Days_In_Program__c",
    "Join_Days__c",
    "Contracted_Days_Remaining__c",
    "Stale_Days__c",
    "Features__c",
    "Migration_Type__c",
    "Risks__c",
    "Comments__c",
    "Post_Mortem__c",
    "Technical_Win__c",
    "Customer_Start_Date__c",
    "Implementation_Create_Date__c",
    "Kick_Off_Call__c",
    "Program_Start_Date__c",
    "Estimated_Graduation_Date__c",
    "Calculated_Graduation_Date__c",
    "Production_Date__c",
    "Final_Review_Call__c",
    "Next_Step_Date__c",
    "Potential_ARR__c",
    "Projected_Amount__c",
    "Contract__c",
    "ARR_Start_of_Program__c",
    "ARR_End_of_Program__c",
    "Grafana__c",
    "Project_Doc__c",
    "Migration_Source__c",
    "Support_Tier__c",
];
