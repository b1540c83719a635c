//! Insurance policy analysis as returned by the model
//!
//! Every field is lenient: a partial report still renders.

use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::lenient;

/// Tolerance for the coverage consistency check, in currency units
pub const CONSISTENCY_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyAnalysis {
    pub policy_details: PolicyDetails,
    pub coverage_analysis: CoverageAnalysis,
    #[serde(deserialize_with = "lenient::list")]
    pub gaps_by_category: Vec<CategoryGap>,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<Recommendation>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub exclusions: Vec<String>,
    #[serde(deserialize_with = "lenient::number")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDetails {
    #[serde(deserialize_with = "lenient::string")]
    pub policy_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub carrier: String,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub policy_number: Option<String>,
    pub coverage_limit: CoverageLimit,
    #[serde(deserialize_with = "lenient::number")]
    pub deductible: f64,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub effective_date: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverageLimit {
    #[serde(deserialize_with = "lenient::number")]
    pub dwelling: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub personal_property: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub liability: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverageAnalysis {
    #[serde(deserialize_with = "lenient::number")]
    pub total_covered: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub total_uncovered: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub gap_percentage: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub adequacy_rating: String,
    #[serde(
        deserialize_with = "lenient::optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_inventory_value: Option<f64>,
}

impl CoverageAnalysis {
    /// `totalUncovered ≈ totalInventoryValue - totalCovered` within $1
    ///
    /// Falls back to the locally computed inventory value when the model
    /// omitted its own figure. Negative differences count as zero uncovered.
    pub fn is_consistent(&self, fallback_inventory_value: f64) -> bool {
        let inventory = self.total_inventory_value.unwrap_or(fallback_inventory_value);
        let expected = (inventory - self.total_covered).max(0.0);
        (self.total_uncovered - expected).abs() <= CONSISTENCY_TOLERANCE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryGap {
    #[serde(deserialize_with = "lenient::string")]
    pub category: String,
    #[serde(deserialize_with = "lenient::number")]
    pub inventory_value: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub covered_amount: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub gap: f64,
    #[serde(deserialize_with = "lenient::string")]
    pub risk_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recommendation {
    #[serde(rename = "type", deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,
    #[serde(deserialize_with = "lenient::string")]
    pub description: String,
    #[serde(deserialize_with = "lenient::number")]
    pub estimated_cost: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub potential_savings: f64,
}

/// One line of the inventory summary sent to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryLine {
    pub name: String,
    pub category: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<&Asset> for InventoryLine {
    fn from(asset: &Asset) -> Self {
        Self {
            name: asset.name.clone(),
            category: asset.category.as_str().to_string(),
            value: asset.estimated_value.amount,
            brand: asset.brand.clone(),
            model: asset.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_report_parses() {
        let analysis: PolicyAnalysis = serde_json::from_str(
            r#"{
                "policyDetails": {"carrier": "Acme Mutual", "deductible": "1,000"},
                "coverageAnalysis": {"totalCovered": 40000, "totalUncovered": null},
                "gapsByCategory": [{"category": "jewelry", "gap": 5000, "riskLevel": "high"}, 42],
                "recommendations": [{"type": "add_rider", "priority": "high"}],
                "exclusions": "flood"
            }"#,
        )
        .unwrap();

        assert_eq!(analysis.policy_details.carrier, "Acme Mutual");
        assert_eq!(analysis.policy_details.deductible, 1000.0);
        assert_eq!(analysis.coverage_analysis.total_uncovered, 0.0);
        assert_eq!(analysis.gaps_by_category.len(), 1);
        assert_eq!(analysis.recommendations[0].kind, "add_rider");
        assert_eq!(analysis.exclusions, vec!["flood".to_string()]);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(PolicyAnalysis::default()).unwrap();
        assert!(json.get("policyDetails").is_some());
        assert!(json["coverageAnalysis"].get("totalUncovered").is_some());
        assert!(json["coverageAnalysis"].get("totalInventoryValue").is_none());
    }

    #[test]
    fn test_consistency_within_tolerance() {
        let coverage = CoverageAnalysis {
            total_covered: 30_000.0,
            total_uncovered: 10_000.5,
            ..Default::default()
        };
        assert!(coverage.is_consistent(40_000.0));
        assert!(!coverage.is_consistent(45_000.0));
    }

    #[test]
    fn test_consistency_prefers_model_inventory_value() {
        let coverage = CoverageAnalysis {
            total_covered: 10_000.0,
            total_uncovered: 5_000.0,
            total_inventory_value: Some(15_000.0),
            ..Default::default()
        };
        assert!(coverage.is_consistent(99_999.0));
    }

    #[test]
    fn test_over_covered_inventory_has_no_gap() {
        let coverage = CoverageAnalysis {
            total_covered: 50_000.0,
            total_uncovered: 0.0,
            ..Default::default()
        };
        assert!(coverage.is_consistent(20_000.0));
    }
}
