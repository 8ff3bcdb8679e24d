use crate::{muted_error, weak_error};
use log::error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;

/// Inspection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectionConfig {
    /// Inspection trace level, zero disables tracing.
    pub trace_level: u8,
    /// Number of processed VM states kept in the state history.
    pub state_history_len: usize,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            trace_level: 1,
            state_history_len: 32,
        }
    }
}

impl InspectionConfig {
    const DEFAULT_PATH: &'static str = ".config/vminspect/config.toml";

    /// Load config from file. Return [`None`] on errors.
    ///
    /// # Arguments
    ///
    /// * `path`: path to config file, if `None` - config from user home directory is used
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!(target: "inspection", "Error while load config file: {err}");
                    return None;
                }
            },
        };

        weak_error!(toml::from_str::<InspectionConfig>(&data))
    }

    /// Load config from file or fall back to default settings.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::from_file(path).unwrap_or_default()
    }
}
