use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One product row from the price-list extraction step. The pipeline reads
/// these and only ever writes back `image_url` and `has_image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProduct {
    pub id: String,
    pub raw_name: String,
    pub brand: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default, rename = "type")]
    pub fragrance_type: Option<String>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub upc: String,
    #[serde(default)]
    pub is_gift_set: bool,
    #[serde(default)]
    pub is_tester: bool,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub has_image: bool,
}

/// One item discovered on a designer listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub display_name: String,
    pub remote_id: u64,
    pub remote_url: String,
    pub has_image: bool,
}

/// The selected catalog entry for a product group, with the blended
/// similarity score kept around for debugging match quality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub remote_id: u64,
    pub remote_url: String,
    pub image_url: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl PhaseReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub phases: Vec<PhaseReport>,
    pub downloaded: u64,
    pub missed: u64,
    pub completed_total: usize,
    pub groups_total: usize,
}

impl RunSummary {
    pub fn coverage(&self) -> f64 {
        if self.groups_total == 0 {
            return 0.0;
        }
        self.completed_total as f64 / self.groups_total as f64
    }
}
