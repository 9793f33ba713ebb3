//! This module contains the structs returned to callers of the analyzer.
//! They are serialized as JSON objects and consumed by the upload front-end.
//! The field names become the JSON keys and must stay in sync with the front-end's
//! `SoilAnalysis` type.

use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisReport, Analyzer};
use crate::error::Error;
use crate::labels::Attribute;

/// Rendered for any attribute that is unavailable, and for every descriptive field of a non-soil image.
pub const NOT_AVAILABLE: &str = "N/A";

/// Reported for every soil image. It is not computed from the image.
pub const DOMINANT_COLOR: &str = "Marrom";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse
{
    pub soil_type: String,
    /// Primary confidence as a percentage, rounded to two decimals.
    pub confidence: f64,
    pub dominant_color: String,
    pub texture: String,
    pub moisture: String,
    pub fertility: String,
    pub organic_matter: String,
    pub suggestions: Vec<String>,
}

impl From<&AnalysisReport> for AnalysisResponse
{
    fn from(report: &AnalysisReport) -> Self
    {
        let attribute = |attribute: Attribute| {
            report.attributes.label(attribute).unwrap_or(NOT_AVAILABLE).to_string()
        };

        AnalysisResponse
        {
            soil_type: report.primary.label.clone(),
            confidence: percentage(report.primary.confidence),
            dominant_color: (if report.is_soil { DOMINANT_COLOR } else { NOT_AVAILABLE }).to_string(),
            texture: attribute(Attribute::Texture),
            moisture: attribute(Attribute::Moisture),
            fertility: attribute(Attribute::Fertility),
            organic_matter: attribute(Attribute::OrganicMatter),
            suggestions: report.suggestions.clone(),
        }
    }
}

/// A probability in [0, 1] as a percentage with two decimals.
pub fn percentage(confidence: f32) -> f64
{
    (f64::from(confidence) * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorResponse
{
    pub error: String,
}

/// What the caller receives for one analysis: a status and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub enum Response
{
    Success(AnalysisResponse),
    Failure { status: u16, body: ErrorResponse },
}

impl Response
{
    pub fn status(&self) -> u16
    {
        match self
        {
            Response::Success(_) => 200,
            Response::Failure { status, .. } => *status,
        }
    }

    pub fn is_success(&self) -> bool
    {
        matches!(self, Response::Success(_))
    }

    pub fn body(&self) -> serde_json::Result<serde_json::Value>
    {
        match self
        {
            Response::Success(response) => serde_json::to_value(response),
            Response::Failure { body, .. } => serde_json::to_value(body),
        }
    }
}

impl From<Result<AnalysisReport, Error>> for Response
{
    fn from(result: Result<AnalysisReport, Error>) -> Self
    {
        match result
        {
            Ok(report) => Response::Success(AnalysisResponse::from(&report)),
            Err(error) => Response::Failure {
                status: error.status_code(),
                body: ErrorResponse { error: error.to_string() },
            },
        }
    }
}

/// Reads one image file and analyzes it.
/// A file that cannot be read is a processing failure, not a missing upload.
pub fn analyze_file(analyzer: &Analyzer, path: &Path) -> Response
{
    match std::fs::read(path)
    {
        Ok(bytes) => Response::from(analyzer.analyze_upload(Some(bytes.as_slice()))),
        Err(e) => {
            error!("Could not read {}: {}", path.display(), e);
            Response::from(Err(Error::Io(e)))
        },
    }
}
