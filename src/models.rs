use std::convert::Infallible;
use std::fmt::{Display, Write as _};
use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::AppError;

/// Content-addressed image identifier.
///
/// The id is the lowercase hex SHA-256 digest of the original image bytes,
/// so re-uploading the same bytes always resolves to the same id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct ImageId(String);

impl ImageId {
    pub fn from_bytes(bytes: &[u8]) -> ImageId {
        let digest = Sha256::digest(bytes);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            write!(hex, "{byte:02x}").expect("writing to a String is infallible");
        }
        ImageId(hex)
    }
}

impl Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ImageId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ImageId(s.to_string()))
    }
}

impl Deref for ImageId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for ImageId {
    fn from(fr: &str) -> Self {
        ImageId(fr.to_string())
    }
}

impl From<String> for ImageId {
    fn from(fr: String) -> Self {
        ImageId(fr)
    }
}

/// An indexed image and its payload.
///
/// Embedding fields are written once by the indexing worker and never leave
/// the process over the wire; only `starred` and `categories` are mutable
/// through the moderation endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub starred: bool,
    pub format: String,
    pub index_date: DateTime<Utc>,
    #[serde(skip)]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub ocr_embedding: Option<Vec<f32>>,
}

/// Partial update for the mutable fields of an [`ImageRecord`].
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ImageOptUpdate {
    pub starred: Option<bool>,
    pub categories: Option<Vec<String>>,
}

impl ImageOptUpdate {
    pub fn is_empty(&self) -> bool {
        self.starred.is_none() && self.categories.is_none()
    }
}

/// How multiple positive criteria are combined by the index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinationMode {
    #[default]
    Average,
    Best,
}

/// Free-text criteria for an advanced search request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub negative_criteria: Vec<String>,
    #[serde(default)]
    pub mode: CombinationMode,
    pub combined_priority: Option<crate::search::CombinedPriority>,
    pub extra_prompt: Option<String>,
}

/// One ranked result; rank is implicit in the sequence order.
#[derive(Clone, Debug, Serialize)]
pub struct SearchHit {
    pub img: ImageRecord,
    pub score: f32,
}

pub const PAGING_MAX_COUNT: usize = 100;
pub const PAGING_DEFAULT_COUNT: usize = 10;

/// Raw paging query parameters, validated into [`Paging`] at the web boundary.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PagingParams {
    pub count: Option<usize>,
    pub skip: Option<usize>,
}

impl PagingParams {
    pub fn validated(self) -> Result<Paging, AppError> {
        let count = self.count.unwrap_or(PAGING_DEFAULT_COUNT);
        if count == 0 || count > PAGING_MAX_COUNT {
            return Err(AppError::validation(format!(
                "count must be between 1 and {PAGING_MAX_COUNT}, got {count}"
            )));
        }
        Ok(Paging {
            count,
            skip: self.skip.unwrap_or(0),
        })
    }
}

/// Validated paging window. Everything below the web layer trusts these bounds.
#[derive(Clone, Copy, Debug)]
pub struct Paging {
    pub count: usize,
    pub skip: usize,
}
