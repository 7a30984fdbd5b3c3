//! Output styles using owo-colors stylesheet pattern

use flotilla_common::MachineState;
use owo_colors::Style;

/// Centralized stylesheet for CLI output colors.
#[derive(Default, Clone)]
pub struct Styles {
    /// Success messages (green)
    pub success: Style,
    /// Warning messages (yellow)
    pub warning: Style,
    /// Error messages (red)
    pub error: Style,
    /// Info messages (blue)
    pub info: Style,
    /// Dimmed/secondary text
    pub dim: Style,
    /// Bold text
    pub bold: Style,
    /// Headers/section titles
    pub header: Style,
    /// Machine state column
    pub state_live: Style,
    pub state_idle: Style,
    pub state_gone: Style,
}

impl Styles {
    /// Apply colors to the stylesheet.
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.header = Style::new().bold().cyan();
        self.state_live = Style::new().green();
        self.state_idle = Style::new().yellow();
        self.state_gone = Style::new().red().dimmed();
    }

    /// Style for a machine state cell.
    #[must_use]
    pub fn state(&self, state: MachineState) -> Style {
        match state {
            MachineState::Started => self.state_live,
            MachineState::Destroying | MachineState::Destroyed => self.state_gone,
            _ => self.state_idle,
        }
    }
}
