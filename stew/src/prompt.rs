use inquire::Select;

use crate::error::{Result, StewError};

const PAGE_SIZE: usize = 15;

/// Interactive choice among a list of options. Used whenever automatic
/// resolution of a tag, asset or repository fails.
pub trait Prompter: Send + Sync {
    fn select(&self, label: &str, options: &[String]) -> Result<String>;

    /// Same as [`Prompter::select`], shown when something the user asked for
    /// could not be found
    fn warning_select(&self, label: &str, options: &[String]) -> Result<String> {
        tracing::warn!("{}", label);
        self.select(label, options)
    }
}

/// Terminal prompt backed by `inquire`
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn select(&self, label: &str, options: &[String]) -> Result<String> {
        if options.is_empty() {
            return Err(StewError::Prompt(format!("nothing to choose for '{label}'")));
        }
        Select::new(label, options.to_vec())
            .with_page_size(PAGE_SIZE)
            .prompt()
            .map_err(|e| StewError::Prompt(e.to_string()))
    }

    fn warning_select(&self, label: &str, options: &[String]) -> Result<String> {
        self.select(&format!("⚠ {label}"), options)
    }
}
