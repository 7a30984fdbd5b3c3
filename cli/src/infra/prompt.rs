//! `MachinePicker` on top of dialoguer.

use anyhow::{Context, Result};
use dialoguer::Select;

use crate::application::ports::MachinePicker;

/// Terminal selection list. Fails when prompts are disabled.
pub struct DialoguerPicker {
    pub non_interactive: bool,
}

impl MachinePicker for DialoguerPicker {
    fn pick(&self, prompt: &str, options: &[String]) -> Result<usize> {
        if self.non_interactive {
            anyhow::bail!(
                "a machine must be chosen interactively; pass --machine <ID> or --select without --yes"
            );
        }
        Select::new()
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact()
            .context("machine selection")
    }
}
