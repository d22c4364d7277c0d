//! Tracker configuration.
//!
//! ```toml
//! transition_state = "Transition"
//! page_size = 100
//! fail_on_error = true
//! ```

use crate::core::TRANSITION_STATE_NAME;
use crate::error::{Result, StsError};
use serde::{Deserialize, Serialize};

/// Runtime settings for a [`crate::Tracker`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Name used when the reserved transitioning state has to be created
    pub transition_state: String,
    /// Rows fetched per page when streaming a history
    pub page_size: usize,
    /// Default for scoped transitions: mark the transition failed when the block errors
    pub fail_on_error: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            transition_state: TRANSITION_STATE_NAME.to_string(),
            page_size: 100,
            fail_on_error: true,
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| StsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transition_state.trim().is_empty() {
            return Err(StsError::Config(
                "transition_state must not be empty".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(StsError::Config("page_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
