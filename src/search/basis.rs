use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// The embedding space a query runs against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBasis {
    #[default]
    Vision,
    Ocr,
    Combined,
}

/// Which basis supplies the primary score under combined search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinedPriority {
    Vision,
    Ocr,
}

/// A named per-record embedding field in the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorField {
    Vision,
    OcrText,
}

impl Display for VectorField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorField::Vision => write!(f, "vision"),
            VectorField::OcrText => write!(f, "ocr_text"),
        }
    }
}

impl SearchBasis {
    /// Validates the requested basis against the OCR capability flag.
    /// Pure; construction of an OCR-dependent basis is gated here and
    /// nowhere else.
    pub fn resolve(self, ocr_enabled: bool) -> Result<SearchBasis, AppError> {
        match self {
            SearchBasis::Ocr if !ocr_enabled => Err(AppError::Configuration(
                "OCR search is not enabled".to_string(),
            )),
            SearchBasis::Combined if !ocr_enabled => Err(AppError::Configuration(
                "combined search requires OCR search, which is not enabled".to_string(),
            )),
            _ => Ok(self),
        }
    }

    /// The vector field a single-vector query against this basis targets.
    /// Combined has no field of its own; it resolves through its priority
    /// inside advanced search only.
    pub fn vector_field(self) -> Result<VectorField, AppError> {
        match self {
            SearchBasis::Vision => Ok(VectorField::Vision),
            SearchBasis::Ocr => Ok(VectorField::OcrText),
            SearchBasis::Combined => Err(AppError::validation(
                "combined basis is only supported by advanced search",
            )),
        }
    }
}

impl CombinedPriority {
    pub fn vector_field(self) -> VectorField {
        match self {
            CombinedPriority::Vision => VectorField::Vision,
            CombinedPriority::Ocr => VectorField::OcrText,
        }
    }
}
