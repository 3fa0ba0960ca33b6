//! Organization configuration model.
//!
//! Deserialized from JSON. `IndexMap`s keep the document's key order so that
//! field extraction and computed fields run in the order the organization
//! wrote them. Regex patterns compile during deserialization.

use std::fmt;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;

use super::ConfigError;

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

pub const DEFAULT_ENCOUNTER_DELIMITER: &str = "Consumer Service ID:";
pub const DEFAULT_IRP_FOLDER_PATTERN: &str = "irp/";

/// Service types never compared against an IRP unless the rule says otherwise.
pub const DEFAULT_SKIP_SERVICE_TYPES: &[&str] = &[
    "No-Show / Cancel",
    "Suicide Screening",
    "General Note",
    "DLA-20",
    "IRP Prep & FPSA",
];

/// Required IRP fields and their default labels.
pub const IRP_REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("consumer_name", "Consumer Name:"),
    ("irp_start_date", "IRP Start Date:"),
    ("irp_end_date", "IRP End Date:"),
];

// ═══════════════════════════════════════════════════════════
// Patterns
// ═══════════════════════════════════════════════════════════

/// Fallback regex, matched case-insensitively with `^`/`$` at line bounds.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        RegexBuilder::new(source)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map(Self)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: source.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// First capture group if the pattern has one, else the whole match;
    /// trimmed.
    pub fn capture(&self, text: &str) -> Option<String> {
        let caps = self.0.captures(text)?;
        let group = if self.0.captures_len() > 1 { 1 } else { 0 };
        let matched = caps.get(group)?;
        Some(matched.as_str().trim().to_string())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(de::Error::custom)
    }
}

/// Accepts a single pattern string or a list of them.
fn one_or_many_patterns<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Pattern>, D::Error> {
    struct PatternsVisitor;

    impl<'de> Visitor<'de> for PatternsVisitor {
        type Value = Vec<Pattern>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a regex string or a list of regex strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![Pattern::new(v).map_err(E::custom)?])
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::new();
            while let Some(p) = seq.next_element::<Pattern>()? {
                out.push(p);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(PatternsVisitor)
}

#[derive(Deserialize)]
struct PatternList(#[serde(deserialize_with = "one_or_many_patterns")] Vec<Pattern>);

// ═══════════════════════════════════════════════════════════
// Field mappings
// ═══════════════════════════════════════════════════════════

/// Where a field's value comes from: a printed label, plus optional regex
/// fallbacks. JSON form is either `"Label:"` or
/// `{"label": "Label:", "patterns": ["Label:\\s*(.+)"]}`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub label: String,
    pub patterns: Vec<Pattern>,
}

impl FieldSpec {
    pub fn label(label: &str) -> Self {
        Self {
            label: label.to_string(),
            patterns: Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for FieldSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = FieldSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a label string or an object with `label` and `patterns`")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(FieldSpec::label(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut label: Option<String> = None;
                let mut patterns: Vec<Pattern> = Vec::new();
                while let Some(key) = access.next_key::<String>()? {
                    match key.as_str() {
                        "label" => label = Some(access.next_value()?),
                        "patterns" => patterns = access.next_value::<PatternList>()?.0,
                        _ => {
                            access.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                let label = label.ok_or_else(|| de::Error::missing_field("label"))?;
                Ok(FieldSpec { label, patterns })
            }
        }

        deserializer.deserialize_any(SpecVisitor)
    }
}

pub type FieldMapping = IndexMap<String, FieldSpec>;

/// Derived field: first non-empty form value among `priority_fields`,
/// optionally reshaped by `template`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComputedField {
    #[serde(default)]
    pub priority_fields: Vec<String>,
    #[serde(default)]
    pub template: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════

/// Rule `type`, resolved once at load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RuleKind {
    #[default]
    Llm,
    IrpComparison,
    Unsupported(String),
}

impl RuleKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "llm" => Self::Llm,
            "llm_irp" => Self::IrpComparison,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Llm => "llm",
            Self::IrpComparison => "llm_irp",
            Self::Unsupported(raw) => raw,
        }
    }
}

impl<'de> Deserialize<'de> for RuleKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RuleKind::parse(&raw))
    }
}

/// One datum the model should pull out of the chart before judging.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldToExtract {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
}

fn default_field_type() -> String {
    "string".to_string()
}

/// Organization overrides for result messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuleMessages {
    /// Replaces the built-in reason when an IRP comparison is skipped.
    /// `{field}` placeholders expand from the encounter's fields.
    #[serde(default)]
    pub skip: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(alias = "rule_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    #[serde(default)]
    pub rule_text: String,
    #[serde(default)]
    pub fields_to_extract: Vec<FieldToExtract>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default = "default_skip_service_types")]
    pub skip_service_types: Vec<String>,
    #[serde(default)]
    pub messages: RuleMessages,
}

fn default_true() -> bool {
    true
}

fn default_skip_service_types() -> Vec<String> {
    DEFAULT_SKIP_SERVICE_TYPES.iter().map(|s| s.to_string()).collect()
}

/// Ids and versions show up as both `"13"` and `13` in stored configs.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

// ═══════════════════════════════════════════════════════════
// Chart and IRP processing
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FolderConfig {
    pub raw_charts: String,
    pub raw_irp: String,
    pub archive_charts: String,
    pub archive_irp: String,
    pub processed_charts: String,
    pub processed_irp: String,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            raw_charts: "textract-raw/".to_string(),
            raw_irp: "textract-raw/irp/".to_string(),
            archive_charts: "archived/textract/".to_string(),
            archive_irp: "archived/irp/textract/".to_string(),
            processed_charts: "textract-processed/".to_string(),
            processed_irp: "textract-processed/irp/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub encounter_delimiter: String,
    pub encounter_id_field: String,
    pub irp_folder_pattern: String,
    pub folders: FolderConfig,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            encounter_delimiter: DEFAULT_ENCOUNTER_DELIMITER.to_string(),
            encounter_id_field: DEFAULT_ENCOUNTER_DELIMITER.to_string(),
            irp_folder_pattern: DEFAULT_IRP_FOLDER_PATTERN.to_string(),
            folders: FolderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IrpConfig {
    pub field_mappings: FieldMapping,
    /// Extra fallback patterns per field, merged into `field_mappings` at load.
    #[serde(deserialize_with = "pattern_table")]
    pub text_patterns: IndexMap<String, Vec<Pattern>>,
}

fn pattern_table<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<IndexMap<String, Vec<Pattern>>, D::Error> {
    let raw = IndexMap::<String, PatternList>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k, v.0)).collect())
}

impl IrpConfig {
    /// Fill in required fields the organization left out and fold
    /// `text_patterns` into the matching field specs.
    pub fn resolve(&mut self) {
        for (name, label) in IRP_REQUIRED_FIELDS {
            if !self.field_mappings.contains_key(*name) {
                self.field_mappings
                    .insert(name.to_string(), FieldSpec::label(label));
            }
        }
        let extra = std::mem::take(&mut self.text_patterns);
        for (name, patterns) in extra {
            match self.field_mappings.get_mut(&name) {
                Some(spec) => spec.patterns.extend(patterns),
                None => tracing::warn!(field = %name, "Text patterns for unmapped IRP field ignored"),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Organization
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct OrgConfig {
    #[serde(default)]
    pub organization_id: String,
    #[serde(default = "unknown_version", deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub field_mappings: FieldMapping,
    #[serde(default)]
    pub computed_fields: IndexMap<String, ComputedField>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, alias = "chart_config")]
    pub chart: ChartConfig,
    #[serde(default, alias = "irp_config")]
    pub irp: IrpConfig,
}

fn unknown_version() -> String {
    "unknown".to_string()
}

impl OrgConfig {
    /// Configuration used when an organization has none stored: no rules.
    pub fn empty(org_id: &str) -> Self {
        let mut config = Self {
            organization_id: org_id.to_string(),
            version: unknown_version(),
            field_mappings: FieldMapping::default(),
            computed_fields: IndexMap::new(),
            rules: Vec::new(),
            chart: ChartConfig::default(),
            irp: IrpConfig::default(),
        };
        config.irp.resolve();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_mapping_keeps_document_order() {
        let mapping: FieldMapping = serde_json::from_str(
            r#"{"zeta": "Z:", "alpha": "A:", "mid": {"label": "M:", "patterns": ["M\\s*=\\s*(\\d+)"]}}"#,
        )
        .unwrap();
        let keys: Vec<&str> = mapping.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(mapping.get("mid").unwrap().label, "M:");
        assert_eq!(mapping.get("mid").unwrap().patterns.len(), 1);
    }

    #[test]
    fn pattern_is_case_insensitive_and_multiline() {
        let p = Pattern::new(r"^start date:\s*(.+)$").unwrap();
        assert_eq!(
            p.capture("header\nSTART DATE: 01/02/2026\nfooter").as_deref(),
            Some("01/02/2026")
        );
        let whole = Pattern::new(r"\d{4}-\d{2}").unwrap();
        assert_eq!(whole.capture("on 2026-03 ok").as_deref(), Some("2026-03"));
        assert!(whole.capture("nothing").is_none());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(matches!(Pattern::new("(unclosed"), Err(ConfigError::InvalidPattern { .. })));
        let err = serde_json::from_value::<FieldSpec>(json!({"label": "X:", "patterns": ["(bad"]}))
            .unwrap_err();
        assert!(err.to_string().contains("(bad"));
    }

    #[test]
    fn rule_defaults_and_kinds() {
        let rules: Vec<Rule> = serde_json::from_value(json!([
            {"id": "r1", "name": "Signature present", "rule_text": "Chart must be signed"},
            {"rule_id": 7, "name": "IRP alignment", "type": "llm_irp", "enabled": false},
            {"id": "r3", "name": "Legacy", "type": "conditional"}
        ]))
        .unwrap();

        assert_eq!(rules[0].kind, RuleKind::Llm);
        assert!(rules[0].enabled);
        assert!(rules[0].fields_to_extract.is_empty());
        assert_eq!(rules[1].id, "7");
        assert_eq!(rules[1].kind, RuleKind::IrpComparison);
        assert!(!rules[1].enabled);
        assert!(rules[1].skip_service_types.iter().any(|s| s == "DLA-20"));
        assert_eq!(rules[2].kind, RuleKind::Unsupported("conditional".to_string()));
    }

    #[test]
    fn field_to_extract_type_defaults_to_string() {
        let f: FieldToExtract =
            serde_json::from_value(json!({"name": "signature_date"})).unwrap();
        assert_eq!(f.field_type, "string");
        assert_eq!(f.description, "");
    }

    #[test]
    fn chart_config_partial_override_keeps_defaults() {
        let chart: ChartConfig = serde_json::from_value(json!({
            "encounter_delimiter": "Service ID:",
            "folders": {"raw_charts": "raw/"}
        }))
        .unwrap();
        assert_eq!(chart.encounter_delimiter, "Service ID:");
        assert_eq!(chart.encounter_id_field, DEFAULT_ENCOUNTER_DELIMITER);
        assert_eq!(chart.folders.raw_charts, "raw/");
        assert_eq!(chart.folders.archive_irp, "archived/irp/textract/");
    }

    #[test]
    fn irp_resolve_adds_required_fields_and_patterns() {
        let mut irp: IrpConfig = serde_json::from_value(json!({
            "field_mappings": {"consumer_name": "Client:", "case_manager": "Case Manager:"},
            "text_patterns": {"consumer_name": "Client:\\s*(.+)", "irp_start_date": ["Begins\\s+(\\S+)"]}
        }))
        .unwrap();
        irp.resolve();

        assert_eq!(irp.field_mappings.get("consumer_name").unwrap().label, "Client:");
        assert_eq!(irp.field_mappings.get("consumer_name").unwrap().patterns.len(), 1);
        assert_eq!(irp.field_mappings.get("irp_start_date").unwrap().label, "IRP Start Date:");
        assert_eq!(irp.field_mappings.get("irp_start_date").unwrap().patterns.len(), 1);
        assert_eq!(irp.field_mappings.get("irp_end_date").unwrap().label, "IRP End Date:");
        assert!(irp.text_patterns.is_empty());
    }

    #[test]
    fn computed_fields_keep_document_order() {
        let config: OrgConfig = serde_json::from_value(json!({
            "computed_fields": {
                "service_datetime": {"priority_fields": ["Start:"]},
                "author": {"priority_fields": ["Clinician:"]},
                "billing_code": {"template": "{value}"}
            }
        }))
        .unwrap();
        let names: Vec<&str> = config.computed_fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["service_datetime", "author", "billing_code"]);
    }

    #[test]
    fn org_config_version_accepts_number() {
        let config: OrgConfig = serde_json::from_value(json!({"version": 3})).unwrap();
        assert_eq!(config.version, "3");
        assert!(config.rules.is_empty());
    }
}
