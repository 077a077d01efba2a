//! User interface module - interaction (prompts) and formatting.
//!
//! - `formatter` - output formatting
//! - This module - the console [`DecisionSource`]

use console::Term;

use crate::error::Result;
use crate::gate::DecisionSource;

pub mod formatter;

pub use formatter::{
    display_error, display_manual_build_number, display_manual_instruction,
    display_pending_change, display_status, display_success, display_versions, display_warning,
};

/// Reads gate answers from the terminal.
pub struct ConsolePrompt {
    term: Term,
}

impl ConsolePrompt {
    pub fn new() -> Self {
        ConsolePrompt {
            term: Term::stdout(),
        }
    }
}

impl Default for ConsolePrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionSource for ConsolePrompt {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.term.write_str(prompt)?;
        self.term.flush()?;
        Ok(self.term.read_line()?)
    }
}
