//! Rule evaluation: prompts for the two-step model protocol and the
//! concurrent engine that runs an organization's rules on one encounter.

pub mod prompt;
pub mod engine;

pub use engine::{
    format_message, EncounterContext, EngineSettings, EvaluationOutcome, RuleEngine,
    NO_JSON_EXTRACTION, NO_JSON_VERDICT,
};
