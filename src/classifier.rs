use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::labels::ClassLabelSet;
use crate::preprocessing::{ImageTensor, INPUT_SHAPE};

/// A trained image classifier: a pure function from the shared input tensor
/// to a probability vector with one entry per class.
///
/// Implementations must be callable from several threads at once; the registry
/// hands out shared references to the same classifier for concurrent analyses.
pub trait Classifier: Send + Sync
{
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

/// The arg-max class of a model's output and its probability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult
{
    pub label: String,
    pub confidence: f32,
}

impl ClassificationResult
{
    /// Picks the most probable class and resolves its label.
    /// Ties go to the lowest index.
    pub fn from_probabilities(probabilities: &[f32], labels: &ClassLabelSet) -> Result<Self>
    {
        let (index, confidence) = argmax(probabilities)
            .ok_or_else(|| Error::inference("model returned no usable probabilities"))?;

        if !confidence.is_finite() {
            return Err(Error::inference(format!("model returned a non-finite probability {}", confidence)));
        }
        if !(-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(&confidence) {
            return Err(Error::inference(format!(
                "model returned {} as its top probability; its output is not a softmax", confidence)));
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let label = labels.get(index)
            .ok_or_else(|| Error::inference(format!(
                "class index {} is out of range for {} labels", index, labels.len())))?;

        Ok(ClassificationResult { label: label.to_string(), confidence })
    }
}

/// Rounding slack allowed around [0, 1] on a softmax output.
const PROBABILITY_TOLERANCE: f32 = 1e-4;

fn argmax(values: &[f32]) -> Option<(usize, f32)>
{
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate()
    {
        if value.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, current)| value > current) {
            best = Some((index, value));
        }
    }
    best
}

/// Session settings shared by every ONNX model the registry loads.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings
{
    pub intra_threads: usize,
}

impl Default for SessionSettings
{
    fn default() -> Self
    {
        SessionSettings { intra_threads: 4 }
    }
}

/// A classifier exported to ONNX and executed with the ONNX runtime.
///
/// The models take a (1, 224, 224, 3) f32 tensor and produce a (1, k) softmax output
/// as their first graph output.
/// Running an ort session needs exclusive access, so concurrent calls on the same
/// model are serialized by the mutex. Different models run independently.
pub struct OnnxClassifier
{
    path: PathBuf,
    session: Mutex<Session>,
}

impl OnnxClassifier
{
    pub fn load(path: &Path, settings: &SessionSettings) -> anyhow::Result<Self>
    {
        if !path.exists() {
            anyhow::bail!("model file not found at {}", path.display());
        }

        let model_bytes = std::fs::read(path)
            .with_context(|| format!("reading model file {}", path.display()))?;

        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("ORT session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("ORT optimization level: {e}"))?
            .with_intra_threads(settings.intra_threads)
            .map_err(|e| anyhow::anyhow!("ORT intra threads: {e}"))?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| anyhow::anyhow!("ORT load model {}: {e}", path.display()))?;

        Ok(OnnxClassifier { path: path.to_path_buf(), session: Mutex::new(session) })
    }
}

impl Classifier for OnnxClassifier
{
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>
    {
        let tensor = Tensor::from_array((INPUT_SHAPE.to_vec(), input.to_vec().into_boxed_slice()))
            .map(<Value>::from)
            .map_err(|e| Error::inference(format!("ORT tensor: {e}")))?;

        let mut session = self.session.lock()
            .map_err(|_| Error::inference(format!("ORT session for {} poisoned", self.path.display())))?;

        let outputs = session.run(ort::inputs![tensor])
            .map_err(|e| Error::inference(format!("ORT run failed for {}: {e}", self.path.display())))?;

        // First dimension is the batch of one; the rest is the probability per class.
        let (_, probabilities) = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| Error::inference(format!("ORT extract: {e}")))?;

        Ok(probabilities.to_vec())
    }
}
