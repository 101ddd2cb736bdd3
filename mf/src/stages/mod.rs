//! The three modeling stages
//!
//! Each stage is a subgraph turning one artifact into the next:
//!
//! - [`use_case`]: requirement text to a PlantUML use case diagram (UCD)
//! - [`scenario`]: diagram to tagged scenarios and activities (SAD)
//! - [`activity`]: scenarios to an activity model with control-flow tags (ADM)
//!
//! All three follow one pattern: prompt rewrites that add tag vocabulary
//! step by step, optional critique with human clarification, generation,
//! and an acceptance gate that either finishes the stage or sends the
//! corrections back to its first node.

pub mod activity;
mod artifacts;
mod nodes;
pub mod scenario;
pub mod use_case;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use artifacts::{
    ACCEPT, ACCEPTANCE_INSTRUCTIONS, AcceptanceResult, ActivityModelInput, ActivityModelOutput, Artifact,
    ScenarioActivityInput, ScenarioActivityOutput, ScenarioDraft, UseCaseDiagramInput, UseCaseDiagramOutput,
};
pub use nodes::{
    AcceptanceNode, CLARIFY_PREFIX, CorrectorNode, CriticNode, GenerationNode, PromptRewriteNode, RenderNode,
    SelectionNode,
};

/// A stage of the modeling pipeline, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "ucd", alias = "use-case-diagram")]
    UseCaseDiagram,
    #[serde(rename = "sad", alias = "scenario-activity")]
    ScenarioActivity,
    #[serde(rename = "adm", alias = "activity-model")]
    ActivityModel,
}

impl Stage {
    pub fn all() -> [Stage; 3] {
        [Stage::UseCaseDiagram, Stage::ScenarioActivity, Stage::ActivityModel]
    }

    /// Short code used in config files, node ids and on the command line
    pub fn code(&self) -> &'static str {
        match self {
            Stage::UseCaseDiagram => "ucd",
            Stage::ScenarioActivity => "sad",
            Stage::ActivityModel => "adm",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::UseCaseDiagram => "Use Case Diagram",
            Stage::ScenarioActivity => "Scenarios and Activities",
            Stage::ActivityModel => "Activity Model",
        }
    }

    /// The stage after this one, if any
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::UseCaseDiagram => Some(Stage::ScenarioActivity),
            Stage::ScenarioActivity => Some(Stage::ActivityModel),
            Stage::ActivityModel => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ucd" | "use-case-diagram" => Ok(Stage::UseCaseDiagram),
            "sad" | "scenario-activity" => Ok(Stage::ScenarioActivity),
            "adm" | "activity-model" => Ok(Stage::ActivityModel),
            other => Err(format!("unknown stage '{other}' (expected ucd, sad or adm)")),
        }
    }
}
