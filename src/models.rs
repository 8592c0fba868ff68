use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// Canonical product record produced by the normalizer and completed by
/// detail enrichment.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub article: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_translated: String,
    #[serde(default)]
    pub description: String,
    /// Decimal string or empty, never null.
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub market_price: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub condition: String,
    pub primary_image: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub location_code: Option<String>,
    #[serde(default)]
    pub local_images: Vec<String>,
    #[serde(default)]
    pub raw_data: Value,
}

impl Product {
    pub fn display_name(&self) -> &str {
        if self.name_translated.trim().is_empty() {
            &self.name
        } else {
            &self.name_translated
        }
    }

    /// Appends an image reference unless a byte-identical URL is already present.
    pub fn push_image(&mut self, url: String) -> bool {
        if url.trim().is_empty() || self.images.iter().any(|existing| existing == &url) {
            return false;
        }
        self.images.push(url);
        true
    }
}

/// Durable document stored per batch key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDocument {
    pub batch_key: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub cursor: Option<usize>,
    #[serde(default)]
    pub items: Vec<Product>,
}

/// Outcome of one ingestion run, reported to the operator.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub batch_key: String,
    pub resumed_from: usize,
    pub new_items: usize,
    pub total_items: usize,
    pub batches_committed: usize,
    pub image_references: usize,
    pub images_stored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_product(id: &str) -> Product {
    Product {
        id: id.to_string(),
        sku: format!("SKU-{id}"),
        article: id.to_string(),
        name: format!("Bag {id}"),
        name_translated: String::new(),
        description: String::new(),
        price: "10.0".into(),
        market_price: String::new(),
        currency: "CNY".into(),
        brand: "Hermes".into(),
        size: String::new(),
        condition: "9".into(),
        primary_image: Some(format!("https://cdn.example.com/{id}/main.jpg")),
        images: vec![format!("https://cdn.example.com/{id}/main.jpg")],
        attributes: BTreeMap::new(),
        location_code: None,
        local_images: Vec::new(),
        raw_data: Value::Null,
    }
}
