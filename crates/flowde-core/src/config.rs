use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::types::Position;

/// Top-level Flowde configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub deep_dive: DeepDiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file. `~/` is expanded against `$HOME`.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Layout offsets used by the position allocator and the outline seeder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Horizontal offset of a new main step from its reference.
    #[serde(default = "default_main_step_dx")]
    pub main_step_dx: f64,
    /// Vertical offset of a step inserted after its reference.
    #[serde(default = "default_after_dy")]
    pub after_dy: f64,
    /// Horizontal offset of a child from its parent.
    #[serde(default = "default_child_dx")]
    pub child_dx: f64,
    /// Where unanchored steps land when the caller gives no position.
    #[serde(default = "default_unanchored_position")]
    pub default_position: Position,
    /// Position of the first main step of a seeded outline.
    #[serde(default = "default_seed_origin")]
    pub seed_origin: Position,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            main_step_dx: default_main_step_dx(),
            after_dy: default_after_dy(),
            child_dx: default_child_dx(),
            default_position: default_unanchored_position(),
            seed_origin: default_seed_origin(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Re-check the graph invariants after every mutation and log violations.
    #[serde(default)]
    pub verify_invariants: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepDiveConfig {
    /// Upper bound on steps applied from a single breakdown.
    #[serde(default = "default_deep_dive_max_steps")]
    pub max_steps: usize,
}

impl Default for DeepDiveConfig {
    fn default() -> Self {
        Self {
            max_steps: default_deep_dive_max_steps(),
        }
    }
}

fn default_db_path() -> String { "~/.flowde/flowde.db".to_string() }
fn default_main_step_dx() -> f64 { 250.0 }
fn default_after_dy() -> f64 { 80.0 }
fn default_child_dx() -> f64 { 150.0 }
fn default_unanchored_position() -> Position { Position::new(100.0, 100.0) }
fn default_seed_origin() -> Position { Position::new(100.0, 100.0) }
fn default_deep_dive_max_steps() -> usize { 12 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts that would stack new steps on top of their reference.
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        for (name, value) in [
            ("layout.main_step_dx", layout.main_step_dx),
            ("layout.after_dy", layout.after_dy),
            ("layout.child_dx", layout.child_dx),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FlowError::Config(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if self.deep_dive.max_steps == 0 {
            return Err(FlowError::Config(
                "deep_dive.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the database path (expand ~).
    pub fn database_path(&self) -> PathBuf {
        let path = &self.store.path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
