use crate::error::ConfigError;
use crate::types::{ExposureFormat, FieldSpec, RegistrationMarks};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Dots per field edge the XENOS writer supports.
pub const XENOS_DOTS: u32 = 50_000;

/// Parameters of one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub format: ExposureFormat,
    pub field: FieldSpec,
    /// `"layer/datatype"` of the layer holding explicit field rectangles.
    pub field_layer: Option<String>,
    /// Registration marks in µm.
    pub marks: Option<RegistrationMarks>,
    /// Only consume layers that are visible in the host view.
    pub visible_only: bool,
    /// Union all shapes of a field into one group with the default dose.
    pub merge: bool,
    /// Default dose in µs.
    pub dose: f64,
    pub pitch: u32,
    /// Beam current written into the XENOS control header.
    pub beam_current: f64,
    pub log_level: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            format: ExposureFormat::Cabl,
            field: FieldSpec::default(),
            field_layer: None,
            marks: None,
            visible_only: false,
            merge: false,
            dose: 1.0,
            pitch: 1,
            beam_current: 1.0,
            log_level: "info".to_string(),
        }
    }
}

impl JobConfig {
    /// Load a config from the provided path. Missing files yield the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the config to the provided path, ensuring the directory exists.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let data = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(io_err)
    }

    /// Resolve the default config path (`~/.ebl-fracture/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ebl-fracture").join("config.json"))
    }

    /// Field layer name, treating an empty string as "no field layer".
    pub fn field_layer(&self) -> Option<&str> {
        self.field_layer
            .as_deref()
            .map(str::trim)
            .filter(|layer| !layer.is_empty())
    }

    /// Check value ranges the job formats can represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.field.size > 0.0) {
            return Err(invalid("field.size", format!("{} must be positive", self.field.size)));
        }
        if self.field.dots == 0 {
            return Err(invalid("field.dots", "must be positive".to_string()));
        }
        if self.format == ExposureFormat::Xenos && self.field.dots != XENOS_DOTS {
            return Err(invalid(
                "field.dots",
                format!("xenos fields use {XENOS_DOTS} dots, got {}", self.field.dots),
            ));
        }
        if !(0.0..=300.0).contains(&self.dose) {
            return Err(invalid("dose", format!("{} is outside 0..=300 us", self.dose)));
        }
        if !(1..=99).contains(&self.pitch) {
            return Err(invalid("pitch", format!("{} is outside 1..=99", self.pitch)));
        }
        if let Some(marks) = &self.marks {
            let expected = self.format.mark_count();
            if marks.0.len() != expected {
                return Err(invalid(
                    "marks",
                    format!("expected {expected} registration marks, got {}", marks.0.len()),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { key, message }
}
