use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use log::{error, info, warn};

use crate::classifier::{ClassificationResult, Classifier, OnnxClassifier, SessionSettings};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::labels::{self, Attribute, ClassLabelSet};
use crate::preprocessing::ImageTensor;

/// Lookup name of the soil-type model.
pub const PRIMARY_MODEL_NAME: &str = "soil";

/// A registry entry for an attribute model.
pub enum ModelSlot
{
    Available { model: Box<dyn Classifier>, labels: ClassLabelSet },
    /// The model failed to load or validate. The attribute is reported as unavailable.
    Unavailable { reason: String },
}

impl ModelSlot
{
    pub fn is_available(&self) -> bool
    {
        matches!(self, ModelSlot::Available { .. })
    }
}

/// The loaded classifiers: one mandatory soil-type model and up to four attribute models.
///
/// Built once at startup and never mutated afterwards, so it can be shared between
/// concurrent analyses behind an `Arc` without locking. Concurrent use of a single
/// model additionally relies on the `Classifier` being reentrant.
pub struct ModelRegistry
{
    primary: Box<dyn Classifier>,
    primary_labels: ClassLabelSet,
    /// Indexed by `Attribute::index`.
    attributes: [ModelSlot; 4],
}

impl ModelRegistry
{
    pub fn builder(primary: Box<dyn Classifier>, primary_labels: ClassLabelSet) -> RegistryBuilder
    {
        RegistryBuilder { primary, primary_labels, attributes: BTreeMap::new() }
    }

    /// Loads every model named in the config.
    ///
    /// Fails if the primary model or its labels cannot be loaded, or if the two disagree
    /// on the number of classes. Attribute models that fail to load are logged and
    /// recorded as unavailable; they never fail the registry.
    pub fn load(config: &Config) -> Result<Self>
    {
        let settings = config.session_settings();
        let now = Instant::now();

        let primary_labels = config.primary_labels()?;
        info!("Soil classes loaded: {:?}", primary_labels.iter().collect::<Vec<_>>());

        let primary_path = config.primary_model_path();
        let primary = OnnxClassifier::load(&primary_path, &settings)
            .map_err(|e| {
                error!("Failed to load primary soil model {:?}: {:#}", primary_path, e);
                Error::PrimaryModelMissing { path: primary_path.clone(), reason: format!("{:#}", e) }
            })?;
        info!("Loaded primary soil model from {:?}", primary_path);

        let mut builder = Self::builder(Box::new(primary), primary_labels);
        for attribute in Attribute::ALL
        {
            builder = match load_attribute(config, attribute, &settings)
            {
                Ok(model) => builder.attribute(attribute, model),
                Err(e) => {
                    warn!("{}", e);
                    builder.attribute_unavailable(attribute, unavailable_reason(e))
                },
            };
        }

        let registry = builder.build()?;
        info!("Model registry ready in {:?}: {} of {} attribute models available",
            now.elapsed(), registry.available_attributes(), Attribute::ALL.len());

        Ok(registry)
    }

    pub fn primary(&self) -> &dyn Classifier
    {
        self.primary.as_ref()
    }

    pub fn primary_labels(&self) -> &ClassLabelSet
    {
        &self.primary_labels
    }

    pub fn attribute(&self, attribute: Attribute) -> &ModelSlot
    {
        &self.attributes[attribute.index()]
    }

    /// Read-only lookup of an available model and its labels by name:
    /// `soil` for the primary model, or an attribute name such as `texture`.
    pub fn lookup(&self, name: &str) -> Option<(&dyn Classifier, &ClassLabelSet)>
    {
        if name == PRIMARY_MODEL_NAME {
            return Some((self.primary(), &self.primary_labels));
        }

        let attribute: Attribute = name.parse().ok()?;
        match self.attribute(attribute)
        {
            ModelSlot::Available { model, labels } => Some((model.as_ref(), labels)),
            ModelSlot::Unavailable { .. } => None,
        }
    }

    pub fn available_attributes(&self) -> usize
    {
        self.attributes.iter().filter(|slot| slot.is_available()).count()
    }
}

pub struct RegistryBuilder
{
    primary: Box<dyn Classifier>,
    primary_labels: ClassLabelSet,
    attributes: BTreeMap<Attribute, ModelSlot>,
}

impl RegistryBuilder
{
    /// Adds an attribute model, read against that attribute's fixed labels.
    pub fn attribute(mut self, attribute: Attribute, model: Box<dyn Classifier>) -> Self
    {
        self.attributes.insert(attribute, ModelSlot::Available { model, labels: attribute.labels() });
        self
    }

    pub fn attribute_unavailable(mut self, attribute: Attribute, reason: impl Into<String>) -> Self
    {
        self.attributes.insert(attribute, ModelSlot::Unavailable { reason: reason.into() });
        self
    }

    /// Probes every model once with a blank input. The output must have one probability per label,
    /// each usable as a confidence.
    ///
    /// A primary model that cannot run or disagrees with its labels is fatal.
    /// An attribute model that does is downgraded to unavailable.
    /// Attributes never added are unavailable.
    pub fn build(self) -> Result<ModelRegistry>
    {
        let probe = ImageTensor::zeros();

        let probabilities = self.primary.predict(&probe)?;
        let outputs = probabilities.len();
        if outputs != self.primary_labels.len() {
            error!("Primary soil model outputs {} classes, but {} labels are configured", outputs, self.primary_labels.len());
            return Err(Error::LabelCountMismatch { outputs, labels: self.primary_labels.len() });
        }
        ClassificationResult::from_probabilities(&probabilities, &self.primary_labels)
            .map_err(|e| {
                error!("Primary soil model output is unusable: {}", e);
                e
            })?;

        let mut added = self.attributes;
        let attributes = Attribute::ALL.map(|attribute| {
            let slot = added.remove(&attribute)
                .unwrap_or_else(|| ModelSlot::Unavailable { reason: "not loaded".to_string() });

            match slot
            {
                ModelSlot::Available { model, labels } => match check_probe_output(model.as_ref(), &labels, &probe)
                {
                    Ok(()) => ModelSlot::Available { model, labels },
                    Err(reason) => {
                        warn!("The {} model is unavailable: {}", attribute, reason);
                        ModelSlot::Unavailable { reason }
                    },
                },
                unavailable => unavailable,
            }
        });

        Ok(ModelRegistry { primary: self.primary, primary_labels: self.primary_labels, attributes })
    }
}

fn check_probe_output(model: &dyn Classifier, labels: &ClassLabelSet, probe: &ImageTensor) -> std::result::Result<(), String>
{
    let probabilities = model.predict(probe).map_err(|e| e.to_string())?;
    if probabilities.len() != labels.len() {
        return Err(format!("model outputs {} classes but has {} labels", probabilities.len(), labels.len()));
    }
    ClassificationResult::from_probabilities(&probabilities, labels).map_err(|e| e.to_string())?;
    Ok(())
}

fn load_attribute(config: &Config, attribute: Attribute, settings: &SessionSettings) -> Result<Box<dyn Classifier>>
{
    let unavailable = |reason: String| Error::ModelUnavailable { attribute, reason };

    let path = config.attribute_model_path(attribute)
        .ok_or_else(|| unavailable("disabled in configuration".to_string()))?;

    check_sidecar(attribute, &path).map_err(unavailable)?;

    let model = OnnxClassifier::load(&path, settings)
        .map_err(|e| unavailable(format!("{:#}", e)))?;
    info!("Loaded {} model from {:?}", attribute, path);

    Ok(Box::new(model))
}

/// If a label sidecar sits next to the model, its order must match the labels we read the model with.
fn check_sidecar(attribute: Attribute, model_path: &Path) -> std::result::Result<(), String>
{
    let sidecar = labels::sidecar_path(model_path);
    if !sidecar.exists() {
        return Ok(());
    }

    let trained = ClassLabelSet::from_sidecar(&sidecar)
        .map_err(|e| format!("unreadable label sidecar {:?}: {}", sidecar, e))?;

    let expected = attribute.labels();
    if trained != expected {
        return Err(format!(
            "label sidecar {:?} lists {:?}, expected {:?}",
            sidecar,
            trained.iter().collect::<Vec<_>>(),
            expected.iter().collect::<Vec<_>>()));
    }
    Ok(())
}

fn unavailable_reason(error: Error) -> String
{
    match error
    {
        Error::ModelUnavailable { reason, .. } => reason,
        other => other.to_string(),
    }
}
