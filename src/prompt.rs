//! User prompts.
//!
//! Everything that may need an answer from a person goes through
//! [`Prompter`], so automation and tests can run without a terminal.

use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::IsTerminal;

use crate::error::ImageError;

/// Source of answers to interactive questions.
pub trait Prompter {
    /// Whether a person can answer.
    fn is_interactive(&self) -> bool;

    /// Pick one of `items`, returning its index.
    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize>;

    /// Ask a yes/no question.
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;
}

/// Fails every question.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Prompter for NonInteractive {
    fn is_interactive(&self) -> bool {
        false
    }

    fn choose(&self, prompt: &str, _items: &[String]) -> Result<usize> {
        Err(ImageError::NotInteractive(format!("cannot ask \"{}\" without a terminal", prompt)).into())
    }

    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        Err(ImageError::NotInteractive(format!("cannot ask \"{}\" without a terminal", question)).into())
    }
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(|e| anyhow!("Selection error: {}", e))
    }

    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(|e| anyhow!("Confirm error: {}", e))
    }
}

/// Pre-recorded answers, consumed in order.
///
/// `choose` takes the next index, `confirm` the next boolean. Running out of
/// answers is an error.
#[derive(Debug, Default)]
pub struct Scripted {
    choices: RefCell<VecDeque<usize>>,
    confirmations: RefCell<VecDeque<bool>>,
}

impl Scripted {
    pub fn new(choices: &[usize], confirmations: &[bool]) -> Self {
        Self {
            choices: RefCell::new(choices.iter().copied().collect()),
            confirmations: RefCell::new(confirmations.iter().copied().collect()),
        }
    }
}

impl Prompter for Scripted {
    fn is_interactive(&self) -> bool {
        true
    }

    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize> {
        let index = self
            .choices
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted choice for \"{}\"", prompt))?;
        if index >= items.len() {
            return Err(anyhow!("scripted choice {} out of range for \"{}\"", index, prompt));
        }
        Ok(index)
    }

    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        self.confirmations
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer for \"{}\"", question))
    }
}
