use std::{fs::File, path::Path};

use serde::{Deserialize, Serialize};

use crate::{EnduroError, analysis::DegenerateStintPolicy};

const CONFIG_DIR_NAME: &str = "enduro";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Denominator for race progress, tire age and driver stint features
    pub race_duration_s: f64,
    pub max_pit_stops: u32,
    /// A car is "close ahead" when the next car on the lap is within this gap
    pub close_ahead_gap_s: f64,
    /// Share of a yellow-flag lap that counts towards tire wear
    pub yellow_tire_wear_factor: f64,
    pub huber_epsilon: f64,
    pub huber_max_iterations: usize,
    pub degenerate_stints: DegenerateStintPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            race_duration_s: 90000.,
            max_pit_stops: 25,
            close_ahead_gap_s: 2.,
            yellow_tire_wear_factor: 0.75,
            huber_epsilon: 1.35,
            huber_max_iterations: 100,
            degenerate_stints: DegenerateStintPolicy::Flatten,
        }
    }
}

impl AnalysisConfig {
    /// Reads `config.json` from the user's config directory, if present
    pub fn from_local_file() -> Result<Option<Self>, EnduroError> {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(None);
        };
        let config_path = config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::from_path(&config_path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, EnduroError> {
        let file = File::open(path).map_err(|e| EnduroError::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| EnduroError::ConfigSerializeError { source: e })
    }

    /// Explicit path first, then the local config file, then defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self, EnduroError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::from_local_file()?.unwrap_or_default()),
        }
    }

    pub fn save(&self) -> Result<(), EnduroError> {
        let config_path = dirs::config_dir()
            .ok_or(EnduroError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME);
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), EnduroError> {
        if let Some(parent) = config_path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EnduroError::ConfigIOError { source: e })?;
        }

        let file = File::create(config_path)
            .map_err(|e| EnduroError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| EnduroError::ConfigSerializeError { source: e })
    }
}
