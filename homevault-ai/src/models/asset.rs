//! Asset records and the item analysis they are created from

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::lenient;

/// Default currency for valuations
pub const DEFAULT_CURRENCY: &str = "USD";

/// Default confidence when the model omits one
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Item category
///
/// Unknown strings map to `Other` rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Category {
    Electronics,
    Jewelry,
    Furniture,
    Appliances,
    Clothing,
    Art,
    Books,
    Tools,
    Sports,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Electronics,
        Category::Jewelry,
        Category::Furniture,
        Category::Appliances,
        Category::Clothing,
        Category::Art,
        Category::Books,
        Category::Tools,
        Category::Sports,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "electronics",
            Category::Jewelry => "jewelry",
            Category::Furniture => "furniture",
            Category::Appliances => "appliances",
            Category::Clothing => "clothing",
            Category::Art => "art",
            Category::Books => "books",
            Category::Tools => "tools",
            Category::Sports => "sports",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Ok(Category::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or_default())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical condition of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Condition {
    Excellent,
    #[default]
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }
}

impl FromStr for Condition {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => Condition::Excellent,
            "fair" => Condition::Fair,
            "poor" => Condition::Poor,
            _ => Condition::Good,
        })
    }
}

impl From<String> for Condition {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replacement-cost valuation
///
/// Accepts the canonical `{amount, currency}` shape, the legacy
/// `{low, high, currency}` range (converted to its midpoint), or a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ValueInput")]
pub struct EstimatedValue {
    pub amount: f64,
    pub currency: String,
}

impl EstimatedValue {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        Self {
            amount: sanitize_amount(amount),
            currency: if currency.trim().is_empty() {
                DEFAULT_CURRENCY.to_string()
            } else {
                currency.trim().to_ascii_uppercase()
            },
        }
    }

    pub fn usd(amount: f64) -> Self {
        Self::new(amount, DEFAULT_CURRENCY)
    }

    /// Midpoint of a legacy low/high range
    pub fn from_range(low: f64, high: f64, currency: impl Into<String>) -> Self {
        Self::new((sanitize_amount(low) + sanitize_amount(high)) / 2.0, currency)
    }
}

impl Default for EstimatedValue {
    fn default() -> Self {
        Self::usd(0.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ValueInput {
    Object {
        #[serde(default, deserialize_with = "lenient::optional_number")]
        amount: Option<f64>,
        #[serde(default, deserialize_with = "lenient::optional_number")]
        low: Option<f64>,
        #[serde(default, deserialize_with = "lenient::optional_number")]
        high: Option<f64>,
        #[serde(default, deserialize_with = "lenient::optional_string")]
        currency: Option<String>,
    },
    Bare(serde_json::Value),
}

impl From<ValueInput> for EstimatedValue {
    fn from(input: ValueInput) -> Self {
        match input {
            // A usable amount wins over any range bounds
            ValueInput::Object {
                amount: Some(amount),
                currency,
                ..
            } => EstimatedValue::new(amount, currency.unwrap_or_default()),
            ValueInput::Object {
                low: Some(low),
                high: Some(high),
                currency,
                ..
            } => EstimatedValue::from_range(low, high, currency.unwrap_or_default()),
            ValueInput::Object {
                low,
                high,
                currency,
                ..
            } => EstimatedValue::new(low.or(high).unwrap_or(0.0), currency.unwrap_or_default()),
            ValueInput::Bare(value) => {
                EstimatedValue::usd(lenient::value_to_f64(&value).unwrap_or(0.0))
            }
        }
    }
}

fn sanitize_amount(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        DEFAULT_CONFIDENCE
    }
}

/// Structured identification and valuation of one photographed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawItemAnalysis")]
pub struct ItemAnalysis {
    pub name: String,
    pub category: Category,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub condition: Condition,
    pub estimated_value: EstimatedValue,
    pub description: String,
    pub confidence: f64,
    pub room: Option<String>,
}

impl Default for ItemAnalysis {
    fn default() -> Self {
        Self {
            name: "Unknown Item".to_string(),
            category: Category::Other,
            brand: None,
            model: None,
            serial: None,
            condition: Condition::Good,
            estimated_value: EstimatedValue::default(),
            description: String::new(),
            confidence: DEFAULT_CONFIDENCE,
            room: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItemAnalysis {
    #[serde(default, deserialize_with = "lenient::optional_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    category: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    brand: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    model: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    serial: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    condition: Option<String>,
    #[serde(default, alias = "estimated_value")]
    estimated_value: Option<EstimatedValue>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    room: Option<String>,
}

impl From<RawItemAnalysis> for ItemAnalysis {
    fn from(raw: RawItemAnalysis) -> Self {
        let defaults = ItemAnalysis::default();
        Self {
            name: raw.name.unwrap_or(defaults.name),
            category: raw.category.map(Category::from).unwrap_or_default(),
            brand: raw.brand,
            model: raw.model,
            serial: raw.serial,
            condition: raw.condition.map(Condition::from).unwrap_or_default(),
            estimated_value: raw.estimated_value.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            confidence: raw.confidence.map(clamp_confidence).unwrap_or(DEFAULT_CONFIDENCE),
            room: raw.room,
        }
    }
}

/// A catalogued household item owned by one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub category: Category,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub condition: Condition,
    pub estimated_value: EstimatedValue,
    pub description: String,
    pub confidence: f64,
    pub room: Option<String>,
    /// Public URL of the stored image, empty until the upload completes
    pub image_url: String,
    /// Blob key of the stored image
    #[serde(skip)]
    pub image_path: Option<String>,
    /// Idempotency key derived from the user and the image bytes
    #[serde(skip)]
    pub content_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Build a fresh record from an analysis; timestamps are set by the writer
    pub fn from_analysis(
        id: Uuid,
        user_id: &str,
        analysis: &ItemAnalysis,
        content_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            name: analysis.name.clone(),
            category: analysis.category,
            brand: analysis.brand.clone(),
            model: analysis.model.clone(),
            serial: analysis.serial.clone(),
            condition: analysis.condition,
            estimated_value: analysis.estimated_value.clone(),
            description: analysis.description.clone(),
            confidence: clamp_confidence(analysis.confidence),
            room: analysis.room.clone(),
            image_url: String::new(),
            image_path: None,
            content_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial edit
    ///
    /// Empty strings clear the optional text fields.
    pub fn apply(&mut self, update: &AssetUpdate) {
        fn merge_optional(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                let trimmed = v.trim();
                *target = (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
        }

        if let Some(name) = update.name.as_ref().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            self.name = name.to_string();
        }
        if let Some(category) = update.category {
            self.category = category;
        }
        merge_optional(&mut self.brand, &update.brand);
        merge_optional(&mut self.model, &update.model);
        merge_optional(&mut self.serial, &update.serial);
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(value) = &update.estimated_value {
            self.estimated_value = value.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        merge_optional(&mut self.room, &update.room);
    }
}

/// Partial field set for a manual edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub estimated_value: Option<EstimatedValue>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        self == &AssetUpdate::default()
    }
}
