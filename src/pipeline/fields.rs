//! Field extraction from encounter text and form pairs.
//!
//! Two paths:
//! - text: label-in-line scan over the transcript (charts)
//! - structured: form dictionary first, then the text scan, then regex
//!   fallbacks (IRP documents)
//!
//! A field that cannot be found maps to `None`; extraction never fails.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::models::FieldValues;
use crate::org_config::{ComputedField, FieldMapping};

use super::ocr::FormDictionary;

/// Remainder of the first line containing `label`, trimmed. Empty → `None`.
fn scan_label(lines: &[&str], label: &str) -> Option<String> {
    let line = lines.iter().find(|line| line.contains(label))?;
    let (_, rest) = line.split_once(label)?;
    let value = rest.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Text path. Every mapped field gets an entry, found or not.
pub fn extract_text_fields(text: &str, mapping: &FieldMapping) -> FieldValues {
    let mut values = FieldValues::new();
    if text.is_empty() || mapping.is_empty() {
        return values;
    }
    let lines: Vec<&str> = text.split('\n').collect();

    for (name, spec) in mapping.iter() {
        let value = scan_label(&lines, &spec.label);
        match &value {
            Some(v) => tracing::debug!(field = name, value = %v, "Extracted field"),
            None => tracing::debug!(field = name, label = %spec.label, "Field not found"),
        }
        values.insert(name.to_string(), value);
    }
    values
}

/// Result of the structured path: values plus the form confidence of each
/// field resolved from a key/value pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredFields {
    pub values: FieldValues,
    pub confidence: BTreeMap<String, f32>,
}

impl StructuredFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }
}

/// Structured path: form pair, then label scan, then regex fallbacks.
pub fn extract_structured_fields(
    forms: &FormDictionary,
    text: &str,
    mapping: &FieldMapping,
) -> StructuredFields {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = StructuredFields::default();

    for (name, spec) in mapping.iter() {
        if let Some(entry) = forms.lookup(&spec.label).filter(|e| !e.value.trim().is_empty()) {
            out.values
                .insert(name.to_string(), Some(entry.value.trim().to_string()));
            out.confidence.insert(name.to_string(), entry.confidence);
            continue;
        }

        let value = scan_label(&lines, &spec.label).or_else(|| {
            spec.patterns.iter().find_map(|p| {
                let hit = p.capture(text).filter(|v| !v.is_empty());
                if hit.is_some() {
                    tracing::debug!(field = name, pattern = p.as_str(), "Field matched fallback pattern");
                }
                hit
            })
        });
        if value.is_none() {
            tracing::debug!(field = name, label = %spec.label, "Field not found");
        }
        out.values.insert(name.to_string(), value);
    }
    out
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// First non-empty form value among `keys`. A key present in the form
/// dictionary is taken as-is; otherwise entries printed with that label are
/// searched.
fn first_priority_value(forms: &FormDictionary, keys: &[String]) -> Option<String> {
    keys.iter().find_map(|key| match forms.get(key) {
        Some(entry) => non_empty(&entry.value),
        None => forms
            .entries()
            .iter()
            .filter(|e| e.original_key == *key)
            .find_map(|e| non_empty(&e.value)),
    })
}

/// Substitute `{field}` and `{value}`. Returns `None` when placeholders
/// remain unresolved.
fn render_template(template: &str, values: &FieldValues, value: &str) -> Option<String> {
    let mut rendered = template.to_string();
    for (name, field_value) in values {
        if let Some(v) = field_value.as_deref().filter(|v| !v.is_empty()) {
            rendered = rendered.replace(&format!("{{{name}}}"), v);
        }
    }
    rendered = rendered.replace("{value}", value);
    (!rendered.contains('{')).then_some(rendered)
}

fn compute_field(spec: &ComputedField, values: &FieldValues, forms: &FormDictionary) -> Option<String> {
    let mut computed = if spec.priority_fields.is_empty() {
        None
    } else {
        first_priority_value(forms, &spec.priority_fields)
    };

    if let Some(template) = &spec.template {
        let current = computed.clone().unwrap_or_default();
        // values that already carry a date separator are left alone
        if !current.contains('/') && !current.contains('-') {
            if let Some(rendered) = render_template(template, values, &current) {
                computed = Some(rendered);
            }
        }
    }

    computed.filter(|v| !v.is_empty())
}

/// Add computed fields in declaration order; later ones may reference
/// earlier ones through their template.
pub fn apply_computed_fields(
    values: &mut FieldValues,
    forms: &FormDictionary,
    computed: &IndexMap<String, ComputedField>,
) {
    for (name, spec) in computed.iter() {
        let value = compute_field(spec, values, forms);
        tracing::debug!(field = name, found = value.is_some(), "Computed field");
        values.insert(name.to_string(), value);
    }
}
