//! Application context — unified state passed to every command handler.
//!
//! Built once in `Cli::run()`. Commands pull the output renderer, progress
//! reporter, config store and platform client from here instead of
//! constructing them.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::application::ports::ConfigStore;
use crate::domain::config::{AppConfig, FlotillaConfig};
use crate::domain::ConfigError;
use crate::infra::config::YamlConfigStore;
use crate::infra::platform::HttpPlatformClient;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `FLOTILLA_YES` env vars).
    pub yes: bool,
    /// App named on the command line.
    pub app: Option<String>,
    /// Path of the app config file.
    pub app_config: PathBuf,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// User config store.
    pub config_store: YamlConfigStore,
    /// When `true`, never prompt.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `FLOTILLA_YES`
    /// environment variables are present.
    pub non_interactive: bool,
    /// Fired on Ctrl-C.
    pub cancel: CancellationToken,
    app_override: Option<String>,
    app_config_path: PathBuf,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: AppFlags, cancel: CancellationToken) -> Self {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("FLOTILLA_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            mode,
            config_store: YamlConfigStore,
            non_interactive,
            cancel,
            app_override: flags.behaviour.app,
            app_config_path: flags.behaviour.app_config,
        }
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter; only warnings are shown in JSON mode.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        match self.mode {
            OutputMode::Human => TerminalReporter::new(&self.output),
            OutputMode::Json => TerminalReporter::warnings_only(&self.output),
        }
    }

    /// Path of the app config file.
    #[must_use]
    pub fn app_config_path(&self) -> &Path {
        &self.app_config_path
    }

    /// Load the user config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn config(&self) -> Result<FlotillaConfig> {
        self.config_store.load()
    }

    /// Load the app config.
    ///
    /// # Errors
    ///
    /// Returns an error if the app config exists but cannot be parsed.
    pub fn app_config(&self) -> Result<AppConfig> {
        self.config_store.load_app(&self.app_config_path)
    }

    /// Name of the app to operate on.
    ///
    /// `--app` wins over the app config file, which wins over
    /// `defaults.app`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoApp`] when no source names an app.
    pub fn app_name(&self, config: &FlotillaConfig, app_config: &AppConfig) -> Result<String> {
        if let Some(app) = self
            .app_override
            .clone()
            .or_else(|| app_config.app.clone())
            .or_else(|| config.defaults.app.clone())
        {
            return Ok(app);
        }
        let path = self.config_store.path()?;
        Err(ConfigError::NoApp {
            path: path.display().to_string(),
        }
        .into())
    }

    /// Platform client for `app`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoToken`] when no API token is configured.
    pub fn platform(&self, config: &FlotillaConfig, app: &str) -> Result<HttpPlatformClient> {
        let Some(token) = config.api.token.as_deref() else {
            let path = self.config_store.path()?;
            return Err(ConfigError::NoToken {
                path: path.display().to_string(),
            }
            .into());
        };
        tracing::debug!(base_url = %config.api.base_url, app, "building platform client");
        HttpPlatformClient::new(&config.api.base_url, token, app)
    }
}
