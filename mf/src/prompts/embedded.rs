//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Use case diagram modeller
pub const USE_CASE: &str = include_str!("../../prompts/use_case.pmt");

/// Scenario extraction from a use case diagram
pub const SCENARIOS: &str = include_str!("../../prompts/scenarios.pmt");

/// Activity and parameter tagging of scenarios
pub const ACTIVITIES: &str = include_str!("../../prompts/activities.pmt");

/// Activity diagram modeller, one control-flow tag per step
pub const ACTIVITY_MODEL: &str = include_str!("../../prompts/activity_model.pmt");

/// Critique of the current input
pub const CRITIC: &str = include_str!("../../prompts/critic.pmt");

/// Closing instruction of a generation step
pub const GENERATE: &str = include_str!("../../prompts/generate.pmt");

/// Repair request after a failed render
pub const CORRECTOR: &str = include_str!("../../prompts/corrector.pmt");

/// Names of every embedded template
pub const NAMES: &[&str] = &[
    "use_case",
    "scenarios",
    "activities",
    "activity_model",
    "critic",
    "generate",
    "corrector",
];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "use_case" => Some(USE_CASE),
        "scenarios" => Some(SCENARIOS),
        "activities" => Some(ACTIVITIES),
        "activity_model" => Some(ACTIVITY_MODEL),
        "critic" => Some(CRITIC),
        "generate" => Some(GENERATE),
        "corrector" => Some(CORRECTOR),
        _ => None,
    };
    if found.is_none() {
        debug!("get_embedded: no match found");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_is_embedded() {
        for name in NAMES {
            assert!(get_embedded(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_use_case_prompt() {
        let prompt = get_embedded("use_case").unwrap();
        assert!(prompt.contains("Use Case Diagram Modeler"));
        assert!(prompt.contains("PlantUML"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
