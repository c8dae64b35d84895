//! Plain-text rendering of Salesforce rows for tool responses.

use impltrack_crm::Record;
use serde_json::Value;

const DETAIL_LABELS: &[(&str, &str)] = &[
    ("Implementation_Stage__c", "Stage"),
    ("Program_Health__c", "Health"),
    ("Type__c", "Type"),
    ("Contract_Type__c", "Contract"),
    ("Percent_Complete__c", "% Complete"),
    ("In_Production__c", "In Production"),
    ("Contracted_Hours__c", "Contracted Hours"),
    ("Actual_Hours_Spent__c", "Hours Spent"),
    ("Contracted_Hours_Remaining__c", "Hours Remaining"),
    ("Days_In_Program__c", "Days In Program"),
    ("Stale_Days__c", "Stale Days"),
    ("Features__c", "Features"),
    ("Migration_Type__c", "Migration Type"),
    ("Risks__c", "Risks"),
    ("Comments__c", "Comments"),
    ("Next_Step_Date__c", "Next Step Date"),
    ("Estimated_Graduation_Date__c", "Graduation Date"),
    ("Production_Date__c", "Production Date"),
    ("Potential_ARR__c", "Potential ARR"),
    ("Projected_Amount__c", "Projected Amount"),
    ("Grafana__c", "Grafana"),
    ("Project_Doc__c", "Exec Summary"),
];

const RELATIONSHIPS: &[(&str, &str)] =
    &[("Account__r", "Account"), ("Opportunity__r", "Opportunity")];

/// Renders a JSON scalar the way a person would type it. Strings lose their quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Name header followed by every populated labelled field and related record names.
pub fn implementation_summary(record: &Record) -> String {
    let name = record.get("Name").and_then(Value::as_str).unwrap_or("Unknown");
    let id = record.get("Id").and_then(Value::as_str).unwrap_or("N/A");
    let mut lines = vec![format!("**{name}** (ID: {id})")];

    for (field, label) in DETAIL_LABELS {
        if let Some(value) = record.get(*field).filter(|value| !is_blank(value)) {
            lines.push(format!("  {label}: {}", display_value(value)));
        }
    }

    for (relationship, label) in RELATIONSHIPS {
        if let Some(related) = record.get(*relationship).and_then(Value::as_object) {
            let related_name = related.get("Name").and_then(Value::as_str).unwrap_or("N/A");
            lines.push(format!("  {label}: {related_name}"));
        }
    }

    lines.join("\n")
}

pub fn record_list(total: u64, records: &[Record]) -> String {
    let mut lines = vec![format!("Found {total} record(s):")];
    for record in records {
        lines.push(String::new());
        lines.push(implementation_summary(record));
    }
    lines.join("\n")
}

/// One line per stage group from an aggregate `GROUP BY Implementation_Stage__c` query.
pub fn stage_counts(total: u64, groups: &[Record]) -> String {
    let mut lines = vec![format!("Implementations by stage ({total} groups):")];
    for group in groups {
        let stage = group
            .get("Implementation_Stage__c")
            .filter(|value| !value.is_null())
            .map(display_value)
            .unwrap_or_else(|| "Unknown".to_string());
        let count = group.get("total").map(display_value).unwrap_or_else(|| "0".to_string());
        lines.push(format!("  {stage}: {count}"));
    }
    lines.join("\n")
}

/// `field = value` pairs in request order.
pub fn field_summary(fields: &Record) -> String {
    fields
        .iter()
        .map(|(field, value)| format!("{field} = {}", display_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use impltrack_crm::Record;
    use serde_json::{json, Value};

    use super::{field_summary, implementation_summary, record_list, stage_counts};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    #[test]
    fn summary_skips_blank_fields_and_shows_relationships() {
        let rendered = implementation_summary(&record(json!({
            "attributes": {"type": "Implementation__c"},
            "Id": "a0B5f000001abcD",
            "Name": "Acme - Join - 2026-01-05",
            "Implementation_Stage__c": "02 - Planning",
            "Program_Health__c": "Risk",
            "Risks__c": "",
            "Comments__c": null,
            "In_Production__c": false,
            "Contracted_Hours__c": 40.5,
            "Project_Doc__c": "https://docs.example.com/acme",
            "Account__r": {"attributes": {"type": "Account"}, "Name": "Acme"},
        })));

        assert_eq!(
            rendered,
            "**Acme - Join - 2026-01-05** (ID: a0B5f000001abcD)\n\
             \x20 Stage: 02 - Planning\n\
             \x20 Health: Risk\n\
             \x20 In Production: false\n\
             \x20 Contracted Hours: 40.5\n\
             \x20 Exec Summary: https://docs.example.com/acme\n\
             \x20 Account: Acme"
        );
    }

    #[test]
    fn missing_name_and_id_fall_back() {
        assert_eq!(implementation_summary(&Record::new()), "**Unknown** (ID: N/A)");
    }

    #[test]
    fn lists_and_groups_carry_their_totals() {
        let rows = vec![record(json!({"Id": "a0B1", "Name": "One"}))];
        assert_eq!(record_list(1, &rows), "Found 1 record(s):\n\n**One** (ID: a0B1)");

        let groups = vec![
            record(json!({"Implementation_Stage__c": "01 - Explore", "total": 3})),
            record(json!({"Implementation_Stage__c": null, "total": 1})),
        ];
        assert_eq!(
            stage_counts(2, &groups),
            "Implementations by stage (2 groups):\n  01 - Explore: 3\n  Unknown: 1"
        );
    }

    #[test]
    fn field_summary_unquotes_strings() {
        let fields = record(json!({"Risks__c": "Schema drift", "Percent_Complete__c": 40}));
        let summary = field_summary(&fields);
        assert!(summary.contains("Risks__c = Schema drift"));
        assert!(summary.contains("Percent_Complete__c = 40"));
    }
}
