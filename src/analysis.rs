//! Request-time analysis of one soil photograph.
//!
//! Two phases. The soil-type model runs first; if its confidence is below the threshold the
//! image is reported as not soil and nothing else runs. Otherwise each available attribute
//! model runs on the same tensor and the report is passed through the suggestion rules.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::classifier::ClassificationResult;
use crate::config::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::error::{Error, Result};
use crate::labels::Attribute;
use crate::preprocessing::{self, ImageTensor};
use crate::registry::{ModelRegistry, ModelSlot};
use crate::suggestions;

/// Label reported instead of a soil type when the confidence gate fails.
pub const NOT_SOIL_LABEL: &str = "Não é solo";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings
{
    /// Images whose primary confidence is strictly below this are not soil.
    pub confidence_threshold: f32,
    pub parallel_attributes: bool,
}

impl Default for AnalysisSettings
{
    fn default() -> Self
    {
        AnalysisSettings { confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD, parallel_attributes: false }
    }
}

/// The four attribute classifications. `None` means the attribute is unavailable,
/// either because its model is not loaded or because the image was not soil.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributeReport
{
    pub moisture: Option<ClassificationResult>,
    pub texture: Option<ClassificationResult>,
    pub fertility: Option<ClassificationResult>,
    pub organic_matter: Option<ClassificationResult>,
}

impl AttributeReport
{
    pub fn unavailable() -> Self
    {
        AttributeReport::default()
    }

    pub fn get(&self, attribute: Attribute) -> Option<&ClassificationResult>
    {
        match attribute
        {
            Attribute::Moisture => self.moisture.as_ref(),
            Attribute::Texture => self.texture.as_ref(),
            Attribute::Fertility => self.fertility.as_ref(),
            Attribute::OrganicMatter => self.organic_matter.as_ref(),
        }
    }

    fn set(&mut self, attribute: Attribute, result: Option<ClassificationResult>)
    {
        match attribute
        {
            Attribute::Moisture => self.moisture = result,
            Attribute::Texture => self.texture = result,
            Attribute::Fertility => self.fertility = result,
            Attribute::OrganicMatter => self.organic_matter = result,
        }
    }

    /// The resolved label of an attribute, if it is available.
    pub fn label(&self, attribute: Attribute) -> Option<&str>
    {
        self.get(attribute).map(|result| result.label.as_str())
    }
}

/// The result of analyzing one image. Built fresh per request and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport
{
    /// The soil type and its confidence. When the image is not soil the label is
    /// `NOT_SOIL_LABEL` and the confidence is still the primary model's.
    pub primary: ClassificationResult,
    /// Whether the image passed the confidence gate.
    pub is_soil: bool,
    pub attributes: AttributeReport,
    pub suggestions: Vec<String>,
}

impl AnalysisReport
{
    fn not_soil(confidence: f32) -> Self
    {
        AnalysisReport {
            primary: ClassificationResult { label: NOT_SOIL_LABEL.to_string(), confidence },
            is_soil: false,
            attributes: AttributeReport::unavailable(),
            suggestions: vec![suggestions::NOT_SOIL_MESSAGE.to_string()],
        }
    }
}

/// Runs analyses against a shared, immutable model registry.
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Analyzer
{
    registry: Arc<ModelRegistry>,
    settings: AnalysisSettings,
}

impl Analyzer
{
    pub fn new(registry: Arc<ModelRegistry>, settings: AnalysisSettings) -> Self
    {
        Analyzer { registry, settings }
    }

    /// Entry point for an upload that may be missing. An absent or empty payload is a `NoPayload` error.
    pub fn analyze_upload(&self, payload: Option<&[u8]>) -> Result<AnalysisReport>
    {
        match payload
        {
            Some(bytes) if !bytes.is_empty() => self.analyze_image(bytes),
            _ => Err(Error::NoPayload),
        }
    }

    /// Decodes and analyzes encoded image bytes.
    pub fn analyze_image(&self, bytes: &[u8]) -> Result<AnalysisReport>
    {
        let analysis_id = Uuid::new_v4();
        let now = Instant::now();

        let tensor = preprocessing::load_image_bytes(bytes)?;
        debug!("[{}] Decoded {} bytes in {:?}", analysis_id, bytes.len(), now.elapsed());

        let report = self.analyze_tensor(&tensor)?;
        info!("[{}] Analysis finished in {:?}: {} ({:.4})",
            analysis_id, now.elapsed(), report.primary.label, report.primary.confidence);

        Ok(report)
    }

    pub fn analyze_tensor(&self, tensor: &ImageTensor) -> Result<AnalysisReport>
    {
        // Phase 1: soil type, and the gate.
        let probabilities = self.registry.primary().predict(tensor)?;
        let primary = ClassificationResult::from_probabilities(&probabilities, self.registry.primary_labels())?;

        if primary.confidence < self.settings.confidence_threshold {
            debug!("Confidence {:.4} for {:?} is below {}; not soil",
                primary.confidence, primary.label, self.settings.confidence_threshold);
            return Ok(AnalysisReport::not_soil(primary.confidence));
        }

        // Phase 2: the attributes. They are independent of each other and are not reconciled.
        let attributes = self.classify_attributes(tensor)?;

        let suggestions = suggestions::generate(
            &primary.label,
            attributes.label(Attribute::Texture),
            attributes.label(Attribute::Moisture),
            attributes.label(Attribute::Fertility));

        Ok(AnalysisReport { primary, is_soil: true, attributes, suggestions })
    }

    fn classify_attributes(&self, tensor: &ImageTensor) -> Result<AttributeReport>
    {
        let results: Vec<(Attribute, Option<ClassificationResult>)> = if self.settings.parallel_attributes {
            Attribute::ALL
                .par_iter()
                .map(|&attribute| Ok((attribute, self.classify_attribute(attribute, tensor)?)))
                .collect::<Result<_>>()?
        } else {
            Attribute::ALL
                .iter()
                .map(|&attribute| Ok((attribute, self.classify_attribute(attribute, tensor)?)))
                .collect::<Result<_>>()?
        };

        let mut report = AttributeReport::unavailable();
        for (attribute, result) in results
        {
            report.set(attribute, result);
        }
        Ok(report)
    }

    /// `Ok(None)` when the attribute's model is unavailable.
    fn classify_attribute(&self, attribute: Attribute, tensor: &ImageTensor) -> Result<Option<ClassificationResult>>
    {
        match self.registry.attribute(attribute)
        {
            ModelSlot::Available { model, labels } => {
                let probabilities = model.predict(tensor)?;
                let result = ClassificationResult::from_probabilities(&probabilities, labels)?;
                debug!("{} = {:?} ({:.4})", attribute, result.label, result.confidence);
                Ok(Some(result))
            },
            ModelSlot::Unavailable { .. } => Ok(None),
        }
    }
}
