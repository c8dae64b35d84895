//! Enumerated field domains and the updatable field set for the tracked objects.
//!
//! These tables are the only schema knowledge the gateway carries. Fields that
//! do not appear here are passed through to Salesforce unvalidated.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PicklistKind {
    /// Exactly one member of the domain.
    Single,
    /// Semicolon-delimited members of the domain.
    Multi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Picklist {
    pub field: &'static str,
    pub label: &'static str,
    pub kind: PicklistKind,
    pub values: &'static [&'static str],
}

impl Picklist {
    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&value)
    }
}

pub const IMPLEMENTATION_STAGE: Picklist = Picklist {
    field: "Implementation_Stage__c",
    label: "Implementation Stage",
    kind: PicklistKind::Single,
    values: &[
        "00 - Kick Off Call",
        "01 - Explore",
        "02 - Planning",
        "03 - In Progress",
        "04 - Final Review",
        "05 - Complete",
        "06 - Passive",
        "07 - Paused",
        "08 - Unsuccessful",
    ],
};

pub const PROGRAM_HEALTH: Picklist = Picklist {
    field: "Program_Health__c",
    label: "Program Health",
    kind: PicklistKind::Single,
    values: &["Healthy", "Passive", "Paused", "Unresponsive", "Risk", "Churn", "High Risk"],
};

pub const CONTRACT_TYPE: Picklist = Picklist {
    field: "Contract_Type__c",
    label: "Contract Type",
    kind: PicklistKind::Single,
    values: &["Annual", "Free Trial", "Pay as you go"],
};

pub const IMPLEMENTATION_TYPE: Picklist = Picklist {
    field: "Type__c",
    label: "Type",
    kind: PicklistKind::Single,
    values: &["Join", "Pure Migration", "Join - Lite", "Join - Quickstart", "Other"],
};

pub const MIGRATION_TYPE: Picklist = Picklist {
    field: "Migration_Type__c",
    label: "Migration Type",
    kind: PicklistKind::Single,
    values: &[
        "Customer Tooling",
        "Dual-write and backfill",
        "Parallel Copy",
        "pg_dump and pg_restore",
        "NA",
        "TS Tooling",
        "Live Migration",
    ],
};

pub const FEATURES: Picklist = Picklist {
    field: "Features__c",
    label: "Features",
    kind: PicklistKind::Multi,
    values: &[
        "Read Replicas",
        "HA Replicas",
        "Data Tiering",
        "Caggs",
        "Compression",
        "Migration",
        "Vector",
        "Hypertables",
    ],
};

pub const PROJECT_TASK: Picklist = Picklist {
    field: "Project_Task__c",
    label: "Project Task",
    kind: PicklistKind::Multi,
    values: &[
        "CAGG",
        "Case work",
        "Compression",
        "Connection Pooling",
        "HA Replica",
        "Hypershift",
        "Ingest",
        "Internal Meetings - Non Customer",
        "Internal Testing",
        "Migration",
        "POC",
        "Project Plan",
        "Query Optimization",
        "Read Replica",
        "Replica",
        "Retention",
        "CNS",
        "Sales",
        "Sales Call",
        "Schema Design",
        "Security",
        "Sizing",
        "Troubleshooting",
        "VPC",
    ],
};

pub const PROJECT_TYPE: Picklist = Picklist {
    field: "Project_Type__c",
    label: "Project Type",
    kind: PicklistKind::Single,
    values: &[
        "Churn",
        "Implementation",
        "Internal Meetings",
        "Join",
        "Join - Lite",
        "Join - QS",
        "Pre-Sales",
        "Pre-Sales (Discover Call)",
        "Projects",
        "Support",
        "Training",
    ],
};

pub const RECORD_STAGE: Picklist = Picklist {
    field: "Record_Stage__c",
    label: "Record Stage",
    kind: PicklistKind::Single,
    values: &["Trial", "Pre-Production", "Production"],
};

/// Domains enforced on `Implementation__c` writes.
pub static IMPLEMENTATION_PICKLISTS: &[Picklist] = &[
    IMPLEMENTATION_STAGE,
    PROGRAM_HEALTH,
    CONTRACT_TYPE,
    IMPLEMENTATION_TYPE,
    MIGRATION_TYPE,
    FEATURES,
];

pub fn implementation_picklist(field: &str) -> Option<&'static Picklist> {
    IMPLEMENTATION_PICKLISTS.iter().find(|picklist| picklist.field == field)
}

/// Fields an update request may target on `Implementation__c`.
pub static UPDATABLE_FIELDS: &[&str] = &[
    "Implementation_Stage__c",
    "Program_Health__c",
    "Type__c",
    "Contract_Type__c",
    "Migration_Type__c",
    "Features__c",
    "Contracted_Hours__c",
    "Percent_Complete__c",
    "In_Production__c",
    "Risks__c",
    "Comments__c",
    "Post_Mortem__c",
    "Technical_Win__c",
    "Migration_Source__c",
    "Support_Tier__c",
    "Grafana__c",
    "Project_Doc__c",
    "CDE__c",
    "CSM__c",
    "Customer_Start_Date__c",
    "Kick_Off_Call__c",
    "Estimated_Graduation_Date__c",
    "Production_Date__c",
    "Final_Review_Call__c",
    "Next_Step_Date__c",
    "X3_Month_Check_In__c",
    "Adjustment_Days__c",
    "ARR_Start_of_Program__c",
    "ARR_End_of_Program__c",
    "Hypertables_Start_of_Program__c",
    "Hypertables_End_of_Program__c",
    "Caggs_Start_of_Program__c",
    "Caggs_End_of_Program__c",
    "Compression_Ratio_Start_of_Program__c",
    "Compression_Ratio_End_of_Program__c",
    "DUM_Start_of_Program__c",
    "DUM_End_of_Program__c",
    "Number_of_Services_Start_of_Program__c",
    "Number_of_Services_End_of_Program__c",
    "Tiered_Data_Start_of_Program__c",
    "Tiered_Data_End_of_Program__c",
    "Contract__c",
    "Billing_Category__c",
];

pub fn is_updatable(field: &str) -> bool {
    UPDATABLE_FIELDS.contains(&field)
}
