//! PlantUML diagram rendering
//!
//! The workflow only needs to know whether a diagram source renders; the
//! [`DiagramRenderer`] trait is the seam, [`PlantUmlServerRenderer`] the
//! production implementation.

mod plantuml;
#[cfg(any(test, feature = "testing"))]
mod scripted;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub use plantuml::{PlantUmlServerRenderer, encode_plantuml};
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedRenderer;

/// Errors produced while rendering a diagram
#[derive(Debug, Error)]
pub enum RenderError {
    /// The source does not parse; the message is what the corrector sees
    #[error("{0}")]
    Syntax(String),

    #[error("PlantUML server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("PlantUML server unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to write rendered diagram: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a successfully rendered diagram was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDiagram {
    pub path: PathBuf,
}

/// Turns PlantUML source into an image
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, source: &str) -> Result<RenderedDiagram, RenderError>;
}

/// Output of a render node: the source plus whether it rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered { source: String, image: PathBuf },
    Failed { source: String, message: String },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Rendered { .. })
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    pub fn source(&self) -> &str {
        match self {
            RenderOutcome::Rendered { source, .. } | RenderOutcome::Failed { source, .. } => source,
        }
    }
}

const START_MARKER: &str = "@startuml";
const END_MARKER: &str = "@enduml";

/// Pull the `@startuml ... @enduml` block out of an LLM reply
///
/// Replies without a block are returned trimmed, minus any code fence.
pub fn extract_plantuml(reply: &str) -> String {
    if let Some(start) = reply.find(START_MARKER)
        && let Some(len) = reply[start..].find(END_MARKER)
    {
        return reply[start..start + len + END_MARKER.len()].to_string();
    }
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```plantuml")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    unfenced.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plantuml_from_fenced_reply() {
        let reply = "Here is the diagram:\n```plantuml\n@startuml\nactor User\n@enduml\n```\nLet me know.";
        assert_eq!(extract_plantuml(reply), "@startuml\nactor User\n@enduml");
    }

    #[test]
    fn test_extract_plantuml_without_markers() {
        assert_eq!(extract_plantuml("```\nactor User\n```"), "actor User");
        assert_eq!(extract_plantuml("  actor User \n"), "actor User");
    }

    #[test]
    fn test_render_outcome_accessors() {
        let failed = RenderOutcome::Failed {
            source: "@startuml\n@enduml".to_string(),
            message: "Syntax Error?".to_string(),
        };
        assert!(failed.is_failure());
        assert_eq!(failed.source(), "@startuml\n@enduml");
    }
}
