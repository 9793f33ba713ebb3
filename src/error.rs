use std::path::PathBuf;

use crate::labels::Attribute;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message is returned verbatim to the caller.
    #[error("Nenhum arquivo enviado")]
    NoPayload,
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("The {attribute} model is unavailable: {reason}")]
    ModelUnavailable { attribute: Attribute, reason: String },
    #[error("The primary soil model could not be loaded from {path:?}: {reason}")]
    PrimaryModelMissing { path: PathBuf, reason: String },
    #[error("The primary soil model outputs {outputs} classes but {labels} labels are configured")]
    LabelCountMismatch { outputs: usize, labels: usize },
    #[error("Invalid label set: {0}")]
    InvalidLabels(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The status reported to the caller for this kind of failure.
    /// Only a missing payload is the caller's fault.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NoPayload => 400,
            _ => 500,
        }
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Error::Inference(message.into())
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
      S: serde::ser::Serializer,
    {
      serializer.serialize_str(self.to_string().as_ref())
    }
}
