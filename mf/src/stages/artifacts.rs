//! Artifacts passed between and inside the stages

use serde::{Deserialize, Serialize};

/// A text payload produced or consumed by a stage
pub trait Artifact: Send + Sync + 'static {
    /// Wrap raw text, e.g. the user's input or a correction request
    fn from_text(text: String) -> Self;

    fn text(&self) -> &str;

    fn into_text(self) -> String;
}

macro_rules! artifact {
    ($(#[$meta:meta])* $name:ident { $field:ident }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub $field: String,
        }

        impl Artifact for $name {
            fn from_text(text: String) -> Self {
                Self { $field: text }
            }

            fn text(&self) -> &str {
                &self.$field
            }

            fn into_text(self) -> String {
                self.$field
            }
        }
    };
}

artifact!(
    /// Plain-text description of the system to model
    UseCaseDiagramInput { description }
);
artifact!(
    /// PlantUML source of the accepted use case diagram
    UseCaseDiagramOutput { plantuml }
);
artifact!(
    /// Use case diagram (or raw text) the scenarios are extracted from
    ScenarioActivityInput { diagram }
);
artifact!(
    /// Scenario list before activity tagging
    ScenarioDraft { scenarios }
);
artifact!(
    /// Scenarios with `<A>`/`<P>` tagged activities and parameters
    ScenarioActivityOutput { scenarios }
);
artifact!(
    /// Tagged scenarios the activity model is built from
    ActivityModelInput { scenarios }
);
artifact!(
    /// Activities with control-flow tags (`<SEQ>`, `<COND>`, `<ALT>`, `<LOOP>`, `<PARA>`)
    ActivityModelOutput { model }
);

impl From<UseCaseDiagramOutput> for ScenarioActivityInput {
    fn from(output: UseCaseDiagramOutput) -> Self {
        Self {
            diagram: output.plantuml,
        }
    }
}

impl From<ScenarioActivityOutput> for ActivityModelInput {
    fn from(output: ScenarioActivityOutput) -> Self {
        Self {
            scenarios: output.scenarios,
        }
    }
}

/// Decision that accepts an artifact
pub const ACCEPT: &str = "ACCEPT";

/// Text sent to the human together with the artifact under review
pub const ACCEPTANCE_INSTRUCTIONS: &str =
    "Please answer with either only 'ACCEPT' or instructions on what is missing to ACCEPT.";

/// Outcome of an acceptance gate
///
/// Corrections are present exactly when the artifact was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceResult<T> {
    response: T,
    corrections: Option<String>,
}

impl<T> AcceptanceResult<T> {
    pub fn accepted(response: T) -> Self {
        Self {
            response,
            corrections: None,
        }
    }

    pub fn rejected(response: T, corrections: impl Into<String>) -> Self {
        Self {
            response,
            corrections: Some(corrections.into()),
        }
    }

    /// Interpret a human decision: `ACCEPT` in any case, surrounding
    /// whitespace ignored, accepts; anything else is a correction request
    pub fn from_decision(response: T, decision: &str) -> Self {
        let decision = decision.trim();
        if decision.eq_ignore_ascii_case(ACCEPT) {
            Self::accepted(response)
        } else {
            Self::rejected(response, decision)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.corrections.is_none()
    }

    pub fn response(&self) -> &T {
        &self.response
    }

    pub fn corrections_needed(&self) -> Option<&str> {
        self.corrections.as_deref()
    }

    pub fn into_response(self) -> T {
        self.response
    }
}

impl<T: Artifact> AcceptanceResult<T> {
    /// Input for another pass over the stage: the corrections plus the
    /// artifact they apply to
    pub fn rework<I: Artifact>(self) -> I {
        let corrections = self.corrections.unwrap_or_default();
        I::from_text(format!(
            "Corrections to be done: {corrections}\nCurrent diagram to be improved: {}",
            self.response.text()
        ))
    }
}
