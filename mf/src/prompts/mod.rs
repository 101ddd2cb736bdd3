//! Prompt Template System
//!
//! Loads and renders the `.pmt` (prompt template) files behind every
//! prompt-rewrite, critic, generation and corrector step.
//!
//! Template loading chain:
//! 1. `.modelflow/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (repo default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
