//! User input and interaction handling.
//! The executor's shell-command safety gate asks through the Prompter trait
//! so tests can substitute a scripted double.

use crate::error::{Error, Result};
use dialoguer::Confirm;

/// Trait for interactive confirmations.
pub trait Prompter {
    /// Asks a yes/no question and returns the answer.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Dialoguer-based prompter used outside of tests.
pub struct DialoguerPrompter;

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for DialoguerPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|e| Error::PromptError(e.to_string()))
    }
}
