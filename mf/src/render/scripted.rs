//! Renderer test double

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DiagramRenderer, RenderError, RenderedDiagram};

/// Renderer that succeeds unless a failure was queued
#[derive(Default)]
pub struct ScriptedRenderer {
    failures: Mutex<VecDeque<String>>,
    renders: AtomicUsize,
}

impl ScriptedRenderer {
    /// A renderer whose first render fails with `message`
    pub fn failing_once(message: &str) -> Arc<Self> {
        let renderer = Self::default();
        renderer.fail_next(message);
        Arc::new(renderer)
    }

    /// Fail the next render with a syntax error
    pub fn fail_next(&self, message: &str) {
        self.failures().push_back(message.to_string());
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    fn failures(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DiagramRenderer for ScriptedRenderer {
    async fn render(&self, _source: &str) -> Result<RenderedDiagram, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        match self.failures().pop_front() {
            Some(message) => Err(RenderError::Syntax(message)),
            None => Ok(RenderedDiagram {
                path: PathBuf::from("use_case_diagram.png"),
            }),
        }
    }
}
