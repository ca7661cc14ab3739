//! Catalog entities
//!
//! `RemoteItem` is what the remote catalog returns for a requested code;
//! `CatalogRecord` is what lands in the local store once the item has been
//! reconciled against its window.

use serde::{Deserialize, Serialize};

/// Text stored when the remote entry carries no description.
pub const DEFAULT_DESCRIPTION_PLACEHOLDER: &str = "No description available.";

/// One entry returned by the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub code: u32,
    pub title: String,
    pub aliases: Option<Vec<String>>,
    pub length: Option<f64>,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl RemoteItem {
    /// Minimal item used by fakes and tests.
    pub fn titled(code: u32, title: impl Into<String>) -> Self {
        Self {
            code,
            title: title.into(),
            aliases: None,
            length: None,
            rating: None,
            description: None,
            image_url: None,
        }
    }

    /// Convert into a storable record, substituting `placeholder` for a
    /// missing or blank description.
    pub fn into_record(self, placeholder: &str) -> CatalogRecord {
        let description = match self.description {
            Some(text) if !text.trim().is_empty() => text,
            _ => placeholder.to_string(),
        };

        CatalogRecord {
            code: self.code,
            title: self.title,
            aliases: self.aliases,
            length: self.length,
            rating: self.rating,
            description,
            image_url: self.image_url,
        }
    }
}

/// Locally persisted catalog entry. `code` is unique in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub code: u32,
    pub title: String,
    pub aliases: Option<Vec<String>>,
    pub length: Option<f64>,
    pub rating: Option<f64>,
    pub description: String,
    pub image_url: Option<String>,
}

impl CatalogRecord {
    /// Reject records the store would refuse anyway.
    pub fn validate(&self) -> Result<(), String> {
        if self.code == 0 {
            return Err("code must be a positive integer".to_string());
        }
        if self.title.trim().is_empty() {
            return Err(format!("v{} has an empty title", self.code));
        }
        if let Some(rating) = self.rating {
            if !rating.is_finite() {
                return Err(format!("v{} has a non-finite rating", self.code));
            }
        }
        if let Some(length) = self.length {
            if !length.is_finite() {
                return Err(format!("v{} has a non-finite length", self.code));
            }
        }
        Ok(())
    }
}
