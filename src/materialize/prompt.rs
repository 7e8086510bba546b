//! Interactive input for configuration values.

use crate::error::Result;
use console::Term;
use dialoguer::{Input, Password};

/// One value the operator is asked for.
#[derive(Debug, Clone, Copy)]
pub struct Question<'a> {
    pub key: &'a str,
    pub help: &'a str,
    /// Shown to the operator and used when the answer is empty
    pub default: Option<&'a str>,
    pub secret: bool,
    pub choices: Option<&'a [&'static str]>,
}

impl Question<'_> {
    /// Prompt line, e.g. `AGENT_MODE - Ship logs ... (local/opensearch) [opensearch]`.
    pub fn label(&self) -> String {
        let mut label = format!("{} - {}", self.key, self.help);
        if let Some(choices) = self.choices {
            label.push_str(&format!(" ({})", choices.join("/")));
        }
        match (self.default, self.secret) {
            (Some(_), true) => label.push_str(" [press enter to keep current]"),
            (Some(default), false) => label.push_str(&format!(" [{}]", default)),
            (None, _) => {}
        }
        label
    }
}

/// Source of operator answers. Returns the raw answer; empty means
/// "accept the default".
pub trait Prompter {
    fn ask(&mut self, question: &Question<'_>) -> Result<String>;

    /// Tell the operator something without asking.
    fn notify(&mut self, message: &str);
}

/// Prompts on the controlling terminal's stdout.
pub struct TerminalPrompter {
    term: Term,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, question: &Question<'_>) -> Result<String> {
        let label = question.label();
        let answer = if question.secret {
            Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact_on(&self.term)?
        } else {
            Input::<String>::new()
                .with_prompt(label)
                .allow_empty(true)
                .interact_text_on(&self.term)?
        };
        Ok(answer)
    }

    fn notify(&mut self, message: &str) {
        self.term.write_line(message).ok();
    }
}
