//! Concurrent rule evaluation against one encounter.
//!
//! Each enabled rule runs independently on a bounded scoped-thread pool.
//! A rule that errors or panics produces an ERROR result; its siblings are
//! unaffected. Results come back sorted by `(rule_name, rule_id)`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde_json::{Map, Value};

use crate::config;
use crate::db::IrpLookup;
use crate::llm::{invoke_json, normalize_punctuation, LlmClient, LlmError};
use crate::models::{FieldValues, RuleResult, RuleStatus, RuleSummary};
use crate::org_config::{Rule, RuleKind};

use super::prompt::{extraction_request, verdict_request};

pub const NO_JSON_EXTRACTION: &str = "No JSON found in Claude response (field extraction)";
pub const NO_JSON_VERDICT: &str = "No JSON found in Claude response";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub model: String,
    pub max_workers: usize,
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            model: config::DEFAULT_MODEL.to_string(),
            max_workers: config::DEFAULT_MAX_WORKERS,
            max_retries: config::DEFAULT_MAX_RETRIES,
            max_tokens: config::DEFAULT_MAX_TOKENS,
            temperature: config::DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub results: Vec<RuleResult>,
    pub summary: RuleSummary,
}

/// What one encounter is evaluated against.
pub struct EncounterContext<'a> {
    pub org_id: &'a str,
    pub fields: &'a FieldValues,
    pub document_text: &'a str,
}

impl EncounterContext<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    /// Chart text for prompts; the fields as pretty JSON, in extraction
    /// order, when the text is empty.
    fn chart_text(&self) -> String {
        if !self.document_text.is_empty() {
            return self.document_text.to_string();
        }
        serde_json::to_string_pretty(self.fields).unwrap_or_default()
    }
}

pub struct RuleEngine<'a> {
    client: &'a dyn LlmClient,
    irp: Option<&'a dyn IrpLookup>,
    settings: EngineSettings,
}

impl<'a> RuleEngine<'a> {
    pub fn new(client: &'a dyn LlmClient, settings: EngineSettings) -> Self {
        Self {
            client,
            irp: None,
            settings,
        }
    }

    /// IRP store consulted by `llm_irp` rules.
    pub fn with_irp_lookup(mut self, lookup: &'a dyn IrpLookup) -> Self {
        self.irp = Some(lookup);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Evaluate every enabled rule in `rules` against one encounter.
    pub fn evaluate(&self, rules: &[Rule], ctx: &EncounterContext<'_>) -> EvaluationOutcome {
        let enabled: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();
        if enabled.is_empty() {
            return EvaluationOutcome::default();
        }

        let workers = self.settings.max_workers.max(1).min(enabled.len());
        let chart_text = ctx.chart_text();
        let next = AtomicUsize::new(0);
        let collected: Mutex<Vec<RuleResult>> = Mutex::new(Vec::with_capacity(enabled.len()));
        let started = Instant::now();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(rule) = enabled.get(i) else { break };
                    let result = self.evaluate_isolated(rule, ctx, &chart_text);
                    match collected.lock() {
                        Ok(mut out) => out.push(result),
                        Err(poisoned) => poisoned.into_inner().push(result),
                    }
                });
            }
        });

        let mut results = collected
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        results.sort_by(|a, b| {
            a.rule_name
                .cmp(&b.rule_name)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        let summary = RuleSummary::from_results(&results);

        tracing::info!(
            org_id = ctx.org_id,
            rules = results.len(),
            workers,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            errored = summary.errored(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluated rules"
        );
        EvaluationOutcome { results, summary }
    }

    /// One rule, with panics turned into an ERROR result.
    fn evaluate_isolated(&self, rule: &Rule, ctx: &EncounterContext<'_>, chart_text: &str) -> RuleResult {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.evaluate_rule(rule, ctx, chart_text)))
            .unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(rule_id = %rule.id, %reason, "Rule evaluation panicked");
                RuleResult::error(
                    &rule.id,
                    &rule.name,
                    &rule.category,
                    format!("Exception during parallel execution: {reason}"),
                )
            });
        tracing::debug!(
            rule_id = %rule.id,
            status = %result.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rule evaluated"
        );
        result
    }

    fn evaluate_rule(&self, rule: &Rule, ctx: &EncounterContext<'_>, chart_text: &str) -> RuleResult {
        let (status, message) = match &rule.kind {
            RuleKind::Llm => self.run_llm(rule, chart_text, None),
            RuleKind::IrpComparison => self.run_irp_comparison(rule, ctx, chart_text),
            RuleKind::Unsupported(kind) => (
                RuleStatus::Skip,
                format!("Unsupported rule type: {kind}. Only \"llm\" and \"llm_irp\" are supported."),
            ),
        };
        RuleResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            category: rule.category.clone(),
            status,
            message,
        }
    }

    /// Two-step protocol: optional field extraction, then the verdict.
    fn run_llm(&self, rule: &Rule, chart_text: &str, irp_plan: Option<&str>) -> (RuleStatus, String) {
        let settings = &self.settings;

        let extracted = if rule.fields_to_extract.is_empty() {
            None
        } else {
            let request = extraction_request(rule, chart_text, settings);
            match invoke_json(self.client, &settings.model, &request, settings.max_retries) {
                Ok(value) => Some(
                    value
                        .get("fields")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Map::new())),
                ),
                Err(LlmError::NoJson { .. }) => {
                    return (RuleStatus::Error, NO_JSON_EXTRACTION.to_string());
                }
                Err(e) => return llm_failure(rule, e),
            }
        };

        let request = verdict_request(rule, chart_text, extracted.as_ref(), irp_plan, settings);
        let verdict = match invoke_json(self.client, &settings.model, &request, settings.max_retries) {
            Ok(value) => value,
            Err(LlmError::NoJson { .. }) => return (RuleStatus::Error, NO_JSON_VERDICT.to_string()),
            Err(e) => return llm_failure(rule, e),
        };

        let status = match verdict.get("status").and_then(Value::as_str) {
            Some(raw) => match RuleStatus::parse_verdict(raw) {
                Ok(status) => status,
                Err(e) => {
                    return (RuleStatus::Error, format!("LLM evaluation error: {e}"));
                }
            },
            None => {
                return (
                    RuleStatus::Error,
                    "LLM evaluation error: response has no \"status\"".to_string(),
                )
            }
        };
        let Some(reasoning) = verdict.get("reasoning").and_then(Value::as_str) else {
            return (
                RuleStatus::Error,
                "LLM evaluation error: response has no \"reasoning\"".to_string(),
            );
        };
        (status, format!("{status} - {}", normalize_punctuation(reasoning)))
    }

    fn run_irp_comparison(
        &self,
        rule: &Rule,
        ctx: &EncounterContext<'_>,
        chart_text: &str,
    ) -> (RuleStatus, String) {
        let skip = |default: String| {
            let message = match &rule.messages.skip {
                Some(template) => format_message(template, ctx.fields),
                None => default,
            };
            (RuleStatus::Skip, message)
        };

        if let Some(service_type) = ctx.field("service_type") {
            if rule.skip_service_types.iter().any(|s| s == service_type) {
                return skip(format!(
                    "Service type \"{service_type}\" is excluded from IRP validation"
                ));
            }
        }

        let Some(consumer_name) = ctx.field("consumer_name") else {
            return skip("Consumer name not found in chart".to_string());
        };

        let Some(lookup) = self.irp else {
            return skip(format!("No IRP found for consumer: {consumer_name}"));
        };

        let irp = match lookup.latest_for_consumer(ctx.org_id, consumer_name) {
            Ok(Some(irp)) => irp,
            Ok(None) => return skip(format!("No IRP found for consumer: {consumer_name}")),
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, error = %e, "IRP lookup failed");
                return (RuleStatus::Skip, format!("Error retrieving IRP: {e}"));
            }
        };

        if irp.plan_text.trim().is_empty() {
            return skip("IRP found but plan of care text is empty".to_string());
        }

        tracing::debug!(
            rule_id = %rule.id,
            irp_id = %irp.irp_id,
            start_date = %irp.start_date,
            "Comparing chart against IRP"
        );
        self.run_llm(rule, chart_text, Some(&irp.plan_text))
    }
}

fn llm_failure(rule: &Rule, error: LlmError) -> (RuleStatus, String) {
    tracing::warn!(rule_id = %rule.id, error = %error, "Model invocation failed");
    (RuleStatus::Error, format!("LLM evaluation error: {error}"))
}

/// Expand `{field}` placeholders; missing or empty fields render `N/A`.
pub fn format_message(template: &str, fields: &FieldValues) -> String {
    let mut message = template.to_string();
    for (name, value) in fields {
        let placeholder = format!("{{{name}}}");
        if message.contains(&placeholder) {
            let rendered = value.as_deref().filter(|v| !v.is_empty()).unwrap_or("N/A");
            message = message.replace(&placeholder, rendered);
        }
    }
    message
}
