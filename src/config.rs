//! Configuration for the analyzer.
//!
//! Looked up at `--config <path>`, then `~/.config/soil-analyzer/config.toml`
//! (platform config dir), then built-in defaults. Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisSettings;
use crate::classifier::SessionSettings;
use crate::error::{Error, Result};
use crate::labels::{Attribute, ClassLabelSet};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the model files. Relative to the config file.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// File name of the soil-type model inside `models_dir`.
    #[serde(default = "default_primary_model")]
    pub primary_model: String,

    /// Explicit soil-type labels in model output order.
    /// When absent they are read from `training_dir`.
    #[serde(default)]
    pub primary_labels: Option<Vec<String>>,

    /// Training data directory whose sorted subdirectory names are the soil-type labels.
    #[serde(default = "default_training_dir")]
    pub training_dir: PathBuf,

    #[serde(default)]
    pub attribute_models: AttributeModels,

    /// Minimum primary confidence for an image to be treated as soil.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Run the four attribute models on the rayon pool instead of one after another.
    #[serde(default)]
    pub parallel_attributes: bool,

    /// ONNX Runtime intra-op threads per model session.
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(skip)]
    base_dir: PathBuf,
}

/// Attribute model file names. An empty name disables that model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModels {
    #[serde(default = "default_moisture_model")]
    pub moisture: String,
    #[serde(default = "default_texture_model")]
    pub texture: String,
    #[serde(default = "default_fertility_model")]
    pub fertility: String,
    #[serde(default = "default_organic_matter_model")]
    pub organic_matter: String,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_primary_model() -> String {
    "soil_model.onnx".to_string()
}

fn default_training_dir() -> PathBuf {
    PathBuf::from("training")
}

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_intra_threads() -> usize {
    4
}

fn default_moisture_model() -> String {
    "moisture_model.onnx".to_string()
}

fn default_texture_model() -> String {
    "texture_model.onnx".to_string()
}

fn default_fertility_model() -> String {
    "fertility_model.onnx".to_string()
}

fn default_organic_matter_model() -> String {
    "organic_matter_model.onnx".to_string()
}

impl Default for AttributeModels {
    fn default() -> Self {
        Self {
            moisture: default_moisture_model(),
            texture: default_texture_model(),
            fertility: default_fertility_model(),
            organic_matter: default_organic_matter_model(),
        }
    }
}

impl AttributeModels {
    /// The configured file name for an attribute, or None when it is disabled.
    pub fn file_for(&self, attribute: Attribute) -> Option<&str> {
        let file = match attribute {
            Attribute::Moisture => &self.moisture,
            Attribute::Texture => &self.texture,
            Attribute::Fertility => &self.fertility,
            Attribute::OrganicMatter => &self.organic_matter,
        };
        let file = file.trim();
        if file.is_empty() {
            None
        } else {
            Some(file)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            primary_model: default_primary_model(),
            primary_labels: None,
            training_dir: default_training_dir(),
            attribute_models: AttributeModels::default(),
            confidence_threshold: default_confidence_threshold(),
            parallel_attributes: false,
            intra_threads: default_intra_threads(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Config {
    /// The per-user config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("soil-analyzer").join("config.toml"))
    }

    /// Loads the explicit config file if given, else the per-user file if it exists,
    /// else the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let config = Self::from_toml_str(&contents, base_dir)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses a config; relative paths inside it resolve against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.base_dir = base_dir;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            )));
        }
        if self.intra_threads == 0 {
            return Err(Error::InvalidConfig("intra_threads must be at least 1".to_string()));
        }
        if self.primary_model.trim().is_empty() {
            return Err(Error::InvalidConfig("primary_model must name a model file".to_string()));
        }
        if let Some(labels) = &self.primary_labels {
            ClassLabelSet::new(labels.iter().cloned())?;
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.resolve(&self.models_dir)
    }

    /// Overrides the models directory. The new path is taken as given, not relative to the config file.
    pub fn set_models_dir(&mut self, dir: PathBuf) {
        self.models_dir = std::path::absolute(&dir).unwrap_or(dir);
    }

    pub fn primary_model_path(&self) -> PathBuf {
        self.models_dir().join(&self.primary_model)
    }

    pub fn attribute_model_path(&self, attribute: Attribute) -> Option<PathBuf> {
        self.attribute_models
            .file_for(attribute)
            .map(|file| self.models_dir().join(file))
    }

    pub fn training_dir(&self) -> PathBuf {
        self.resolve(&self.training_dir)
    }

    /// The soil-type label set: explicit labels win over the training directory.
    pub fn primary_labels(&self) -> Result<ClassLabelSet> {
        match &self.primary_labels {
            Some(labels) => ClassLabelSet::new(labels.iter().cloned()),
            None => ClassLabelSet::from_training_dir(&self.training_dir()),
        }
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            confidence_threshold: self.confidence_threshold,
            parallel_attributes: self.parallel_attributes,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            intra_threads: self.intra_threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("", PathBuf::new()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.primary_model_path(), PathBuf::from("models").join("soil_model.onnx"));
        assert_eq!(
            config.attribute_model_path(Attribute::OrganicMatter),
            Some(PathBuf::from("models").join("organic_matter_model.onnx"))
        );
    }

    #[test]
    fn paths_resolve_against_the_config_directory() {
        let config = Config::from_toml_str(
            r#"
            models_dir = "artifacts"
            primary_model = "soil.onnx"
            training_dir = "data/training"
            "#,
            PathBuf::from("/srv/soil"),
        )
        .unwrap();

        assert_eq!(config.primary_model_path(), PathBuf::from("/srv/soil/artifacts/soil.onnx"));
        assert_eq!(config.training_dir(), PathBuf::from("/srv/soil/data/training"));
    }

    #[test]
    fn empty_attribute_entry_disables_that_model() {
        let config = Config::from_toml_str(
            r#"
            [attribute_models]
            texture = ""
            "#,
            PathBuf::new(),
        )
        .unwrap();

        assert_eq!(config.attribute_model_path(Attribute::Texture), None);
        assert!(config.attribute_model_path(Attribute::Moisture).is_some());
    }

    #[test]
    fn explicit_labels_take_precedence() {
        let config = Config::from_toml_str(
            r#"primary_labels = ["Black Soil", "Red soil"]"#,
            PathBuf::from("/nonexistent"),
        )
        .unwrap();

        let labels = config.primary_labels().unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["Black Soil", "Red soil"]);
    }

    #[test]
    fn labels_fall_back_to_the_training_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("training").join("Red soil")).unwrap();
        std::fs::create_dir_all(dir.path().join("training").join("Black Soil")).unwrap();

        let config = Config::from_toml_str("", dir.path().to_path_buf()).unwrap();
        let labels = config.primary_labels().unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["Black Soil", "Red soil"]);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml_str("confidence_threshold = 1.5", PathBuf::new()),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_toml_str("intra_threads = 0", PathBuf::new()),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_toml_str(r#"primary_labels = ["a", "a"]"#, PathBuf::new()),
            Err(Error::InvalidLabels(_))
        ));
        assert!(matches!(
            Config::from_toml_str("confidence_threshold = \"high\"", PathBuf::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn reads_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "parallel_attributes = true\nconfidence_threshold = 0.75\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert!(config.parallel_attributes);
        assert_eq!(config.analysis_settings().confidence_threshold, 0.75);
        assert_eq!(config.models_dir(), dir.path().join("models"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Config::load(Some(dir.path().join("nope.toml").as_path())), Err(Error::Io(_))));
    }
}
