//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` drives a spinner on a TTY, or prints `"  → {message}"`
/// - `success()` settles the spinner, or prints `"  ✓ {message}"`
/// - `warn()` prints `"  ! {message}"` to stderr
///
/// `step()` and `success()` are suppressed when the context is quiet.
/// Warnings never are: they carry cleanup problems the operator must see.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    silent: bool,
    spinner: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            silent: ctx.quiet,
            spinner: RefCell::new(None),
        }
    }

    /// Reporter that only emits warnings, for machine-readable output modes.
    #[must_use]
    pub fn warnings_only(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            silent: true,
            spinner: RefCell::new(None),
        }
    }

    /// Clear any active spinner before handing the terminal to another process.
    pub fn pause(&self) {
        if let Some(pb) = self.spinner.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.silent {
            return;
        }
        if !self.ctx.show_progress() {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
            return;
        }
        let mut slot = self.spinner.borrow_mut();
        match slot.as_ref() {
            Some(pb) => pb.set_message(message.to_string()),
            None => *slot = Some(progress::spinner(message)),
        }
    }

    fn success(&self, message: &str) {
        if self.silent {
            return;
        }
        match self.spinner.borrow_mut().take() {
            Some(pb) => progress::finish_ok(&pb, message),
            None => println!("  {} {message}", "✓".style(self.ctx.styles.success)),
        }
    }

    fn warn(&self, message: &str) {
        let line = format!("  {} {message}", "!".style(self.ctx.styles.warning));
        match self.spinner.borrow().as_ref() {
            Some(pb) => pb.suspend(|| eprintln!("{line}")),
            None => eprintln!("{line}"),
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        self.pause();
    }
}
