//! Class label sets: the ordered category names each model's output vector is read against.
//!
//! The primary soil-type labels are discovered at startup (explicit configuration, or the
//! sorted subdirectory names of the training data). The attribute labels are fixed here and
//! must follow the index order each attribute model was trained with.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const MOISTURE_LABELS: [&str; 3] = ["seco", "úmido", "encharcado"];
pub const TEXTURE_LABELS: [&str; 3] = ["arenoso", "argiloso", "siltoso"];
pub const FERTILITY_LABELS: [&str; 3] = ["alto", "médio", "baixo"];
pub const ORGANIC_MATTER_LABELS: [&str; 3] = ["alto", "médio", "baixo"];

/// One of the four independent soil attributes, each with its own 3-way classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute
{
    Moisture,
    Texture,
    Fertility,
    OrganicMatter,
}

impl Attribute
{
    pub const ALL: [Attribute; 4] = [
        Attribute::Moisture,
        Attribute::Texture,
        Attribute::Fertility,
        Attribute::OrganicMatter,
    ];

    /// Position in `ALL`.
    pub fn index(self) -> usize
    {
        self as usize
    }

    pub fn name(&self) -> &'static str
    {
        match self
        {
            Attribute::Moisture => "moisture",
            Attribute::Texture => "texture",
            Attribute::Fertility => "fertility",
            Attribute::OrganicMatter => "organic_matter",
        }
    }

    /// The hand-authored labels for this attribute's model, in output index order.
    pub fn labels(&self) -> ClassLabelSet
    {
        let labels: &[&str; 3] = match self
        {
            Attribute::Moisture => &MOISTURE_LABELS,
            Attribute::Texture => &TEXTURE_LABELS,
            Attribute::Fertility => &FERTILITY_LABELS,
            Attribute::OrganicMatter => &ORGANIC_MATTER_LABELS,
        };
        ClassLabelSet(labels.iter().map(|label| label.to_string()).collect())
    }
}

impl Display for Attribute
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Attribute
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        Attribute::ALL
            .into_iter()
            .find(|attribute| attribute.name() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("Unknown attribute {:?}", s)))
    }
}

/// An ordered, index-addressable list of unique, non-empty category names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassLabelSet(Vec<String>);

impl ClassLabelSet
{
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();

        if labels.is_empty() {
            return Err(Error::InvalidLabels("a label set needs at least one label".to_string()));
        }

        let mut seen = HashSet::new();
        for label in &labels
        {
            if label.trim().is_empty() {
                return Err(Error::InvalidLabels("labels must not be blank".to_string()));
            }
            if !seen.insert(label.as_str()) {
                return Err(Error::InvalidLabels(format!("duplicate label {:?}", label)));
            }
        }

        Ok(ClassLabelSet(labels))
    }

    /// Builds the label set from the immediate subdirectories of a training data directory,
    /// sorted by name. This mirrors how the training pipeline assigns class indices.
    pub fn from_training_dir(dir: &Path) -> Result<Self>
    {
        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_str()
                .ok_or_else(|| Error::InvalidLabels(format!("{:?} is not valid UTF-8", entry.path())))?;
            names.push(name.to_string());
        }

        if names.is_empty() {
            return Err(Error::InvalidLabels(format!("no class directories found in {:?}", dir)));
        }

        Self::new(names)
    }

    /// Reads a label sidecar: a JSON array of strings stored next to a model file.
    pub fn from_sidecar(path: &Path) -> Result<Self>
    {
        let contents = std::fs::read_to_string(path)?;
        let labels: Vec<String> = serde_json::from_str(&contents)?;
        Self::new(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str>
    {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize
    {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str>
    {
        self.0.iter().map(String::as_str)
    }
}

/// The sidecar path for a model file: `texture_model.onnx` -> `texture_model.labels.json`.
pub fn sidecar_path(model_path: &Path) -> PathBuf
{
    model_path.with_extension("labels.json")
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn rejects_empty_blank_and_duplicate_labels()
    {
        assert!(matches!(ClassLabelSet::new(Vec::<String>::new()), Err(Error::InvalidLabels(_))));
        assert!(matches!(ClassLabelSet::new(["Black Soil", " "]), Err(Error::InvalidLabels(_))));
        assert!(matches!(ClassLabelSet::new(["Red soil", "Red soil"]), Err(Error::InvalidLabels(_))));
    }

    #[test]
    fn labels_are_index_addressable()
    {
        let labels = ClassLabelSet::new(["Alluvial soil", "Black Soil", "Red soil"]).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.get(1), Some("Black Soil"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn attribute_labels_keep_their_training_order()
    {
        for attribute in Attribute::ALL
        {
            assert_eq!(attribute.labels().len(), 3);
        }
        assert_eq!(Attribute::Moisture.labels().get(0), Some("seco"));
        assert_eq!(Attribute::Moisture.labels().get(2), Some("encharcado"));
        assert_eq!(Attribute::Texture.labels().get(2), Some("siltoso"));
        assert_eq!(Attribute::Fertility.labels().get(0), Some("alto"));
        assert_eq!(Attribute::OrganicMatter.labels().get(1), Some("médio"));
    }

    #[test]
    fn attribute_names_round_trip_through_from_str()
    {
        for attribute in Attribute::ALL
        {
            assert_eq!(attribute.name().parse::<Attribute>().unwrap(), attribute);
        }
        assert!("colour".parse::<Attribute>().is_err());
    }

    #[test]
    fn training_dir_labels_are_sorted_directory_names()
    {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Red soil", "Black Soil", "Alluvial soil", "Clay soil"]
        {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        // Stray files are not classes.
        std::fs::write(dir.path().join("README.txt"), "notes").unwrap();

        let labels = ClassLabelSet::from_training_dir(dir.path()).unwrap();
        let labels: Vec<&str> = labels.iter().collect();
        assert_eq!(labels, vec!["Alluvial soil", "Black Soil", "Clay soil", "Red soil"]);
    }

    #[test]
    fn training_dir_without_classes_is_rejected()
    {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ClassLabelSet::from_training_dir(dir.path()), Err(Error::InvalidLabels(_))));
        assert!(matches!(ClassLabelSet::from_training_dir(&dir.path().join("missing")), Err(Error::Io(_))));
    }

    #[test]
    fn sidecar_is_read_next_to_the_model()
    {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("texture_model.onnx");
        let sidecar = sidecar_path(&model);
        assert_eq!(sidecar, dir.path().join("texture_model.labels.json"));

        std::fs::write(&sidecar, r#"["arenoso", "argiloso", "siltoso"]"#).unwrap();
        assert_eq!(ClassLabelSet::from_sidecar(&sidecar).unwrap(), Attribute::Texture.labels());
    }
}
