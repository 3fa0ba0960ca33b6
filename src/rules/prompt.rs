//! Prompts and response schemas for the two-step rule protocol.
//!
//! Step 1 asks the model to pull rule-specific fields out of the chart.
//! Step 2 asks for a verdict. Both answer with a JSON object described by a
//! schema sent as the last content block.

use serde_json::{json, Map, Value};

use crate::llm::ModelRequest;
use crate::org_config::{FieldToExtract, Rule};

use super::engine::EngineSettings;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a Healthcare Compliance Auditor. You will be given a Rule to validate, the patient Chart Text, and a list of fields to extract from the Chart Text. Your only purpose is to extract the fields, and return them in a JSON object.
Please respond with JSON, with the key: 'fields'. The value should be an object with the field names as keys.";

pub const VERDICT_SYSTEM_PROMPT: &str = "You are a Healthcare Compliance Auditor. You will be given a Rule to validate, the patient Chart Text, and optionally some pre-extracted fields. Validate whether the rule passes or fails.
Please respond with JSON, with the keys: 'status' and 'reasoning'. The status should be one of: 'PASS', 'FAIL', 'SKIP'. The reasoning should be a short explanation of the reason for the status.";

pub const IRP_VERDICT_SYSTEM_PROMPT: &str = "You are a Healthcare Compliance Auditor. You will be given a Rule to validate, the patient Chart Text, the consumer's Individual Recovery Plan (IRP) plan of care, and optionally some pre-extracted fields. Validate whether the services documented in the chart are consistent with the plan of care according to the rule.
Please respond with JSON, with the keys: 'status' and 'reasoning'. The status should be one of: 'PASS', 'FAIL', 'SKIP'. The reasoning should be a short explanation of the reason for the status.";

/// `Rule:` / `Notes:` block. Notes render as `- note` lines, or `None`.
pub fn rule_block(rule_text: &str, notes: &[String]) -> String {
    let notes_text = if notes.is_empty() {
        "None".to_string()
    } else {
        notes
            .iter()
            .map(|n| format!("- {n}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("Rule:\n{rule_text}\n\nNotes:\n{notes_text}")
}

pub fn extraction_schema(fields: &[FieldToExtract]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(
            field.name.clone(),
            json!({"type": field.field_type, "description": field.description}),
        );
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "fields": {
                "type": "object",
                "properties": properties,
                "required": required
            }
        },
        "required": ["fields"]
    })
}

pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "description": "The status of the rule. One of: 'PASS', 'FAIL', 'SKIP'.",
                "enum": ["PASS", "FAIL", "SKIP"]
            },
            "reasoning": {
                "type": "string",
                "description": "The reasoning for the status."
            }
        },
        "required": ["status", "reasoning"]
    })
}

fn schema_block(schema: &Value) -> String {
    format!("JSON schema:\n\n{schema}")
}

pub fn extraction_request(rule: &Rule, chart_text: &str, settings: &EngineSettings) -> ModelRequest {
    ModelRequest {
        system: EXTRACTION_SYSTEM_PROMPT.to_string(),
        content: vec![
            rule_block(&rule.rule_text, &rule.notes),
            format!("Chart text:\n\n{chart_text}"),
            schema_block(&extraction_schema(&rule.fields_to_extract)),
        ],
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

/// Whether step-1 output is worth showing to the model again.
fn has_content(extracted: &Value) -> bool {
    match extracted {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

pub fn verdict_request(
    rule: &Rule,
    chart_text: &str,
    extracted: Option<&Value>,
    irp_plan: Option<&str>,
    settings: &EngineSettings,
) -> ModelRequest {
    let mut content = vec![
        rule_block(&rule.rule_text, &rule.notes),
        format!("Chart text:\n\n{chart_text}"),
    ];
    if let Some(plan) = irp_plan {
        content.push(format!("IRP plan of care:\n\n{plan}"));
    }
    if let Some(fields) = extracted.filter(|v| has_content(v)) {
        content.push(format!("Extracted fields:\n\n{fields}"));
    }
    content.push(schema_block(&verdict_schema()));

    let system = if irp_plan.is_some() {
        IRP_VERDICT_SYSTEM_PROMPT
    } else {
        VERDICT_SYSTEM_PROMPT
    };
    ModelRequest {
        system: system.to_string(),
        content,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(fields: Value, notes: &[&str]) -> Rule {
        serde_json::from_value(json!({
            "id": "r1",
            "name": "Signature",
            "rule_text": "Note must be signed by the clinician",
            "fields_to_extract": fields,
            "notes": notes
        }))
        .unwrap()
    }

    #[test]
    fn rule_block_with_and_without_notes() {
        assert_eq!(rule_block("R", &[]), "Rule:\nR\n\nNotes:\nNone");
        assert_eq!(
            rule_block("R", &["a".to_string(), "b".to_string()]),
            "Rule:\nR\n\nNotes:\n- a\n- b"
        );
    }

    #[test]
    fn extraction_schema_lists_required_fields() {
        let r = rule(
            json!([
                {"name": "signature_date", "description": "Date signed"},
                {"name": "units", "type": "number"}
            ]),
            &[],
        );
        let schema = extraction_schema(&r.fields_to_extract);
        let fields = &schema["properties"]["fields"];
        assert_eq!(fields["required"], json!(["signature_date", "units"]));
        assert_eq!(fields["properties"]["signature_date"]["type"], "string");
        assert_eq!(fields["properties"]["units"]["type"], "number");
        assert_eq!(schema["required"], json!(["fields"]));
    }

    #[test]
    fn extraction_request_blocks_in_order() {
        let r = rule(json!([{"name": "x"}]), &["check page 2"]);
        let req = extraction_request(&r, "CHART", &EngineSettings::default());
        assert_eq!(req.system, EXTRACTION_SYSTEM_PROMPT);
        assert_eq!(req.content.len(), 3);
        assert!(req.content[0].starts_with("Rule:\nNote must be signed"));
        assert!(req.content[0].ends_with("- check page 2"));
        assert_eq!(req.content[1], "Chart text:\n\nCHART");
        assert!(req.content[2].starts_with("JSON schema:\n\n{"));
    }

    #[test]
    fn verdict_request_includes_non_empty_extraction_only() {
        let r = rule(json!([]), &[]);
        let settings = EngineSettings::default();

        let plain = verdict_request(&r, "CHART", None, None, &settings);
        assert_eq!(plain.content.len(), 3);

        let empty = json!({});
        let skipped = verdict_request(&r, "CHART", Some(&empty), None, &settings);
        assert_eq!(skipped.content.len(), 3);

        let fields = json!({"signature_date": "01/02/2026"});
        let with = verdict_request(&r, "CHART", Some(&fields), None, &settings);
        assert_eq!(with.content.len(), 4);
        assert!(with.content[2].starts_with("Extracted fields:\n\n"));
        assert!(with.content[3].contains("\"enum\""));
    }

    #[test]
    fn irp_plan_switches_prompt() {
        let r = rule(json!([]), &[]);
        let req = verdict_request(&r, "CHART", None, Some("Weekly therapy"), &EngineSettings::default());
        assert_eq!(req.system, IRP_VERDICT_SYSTEM_PROMPT);
        assert_eq!(req.content[2], "IRP plan of care:\n\nWeekly therapy");
    }
}
