//! Fixed prompts sent to the generative model

use crate::models::InventoryLine;

/// Instructs the model to describe one photographed item as a single JSON object
pub const IMAGE_ANALYSIS_PROMPT: &str = r#"
Analyze this image of a household item and extract the following information in JSON format:

{
  "name": "specific item name",
  "category": "electronics|jewelry|furniture|appliances|clothing|art|books|tools|sports|other",
  "brand": "brand name if visible",
  "model": "model number if visible",
  "serial": "serial number if visible",
  "condition": "excellent|good|fair|poor",
  "estimatedValue": {
    "amount": number,
    "currency": "USD"
  },
  "description": "detailed description of the item",
  "confidence": number between 0-1,
  "room": "likely room location (living room, bedroom, kitchen, etc.)"
}

Be as accurate as possible. If information is not clearly visible, use null for that field.
For estimated value, provide a single realistic replacement cost based on the item's apparent condition and type.
Choose the most likely replacement value with highest confidence rather than a range.
"#;

const POLICY_RESPONSE_SCHEMA: &str = r#"{
  "policyDetails": {
    "policyType": "homeowners|renters|auto|other",
    "carrier": "insurance company name",
    "policyNumber": "policy number if visible",
    "coverageLimit": {
      "dwelling": number,
      "personalProperty": number,
      "liability": number
    },
    "deductible": number,
    "effectiveDate": "YYYY-MM-DD",
    "expirationDate": "YYYY-MM-DD"
  },
  "coverageAnalysis": {
    "totalCovered": number,
    "totalUncovered": number,
    "gapPercentage": number,
    "adequacyRating": "excellent|good|fair|poor"
  },
  "gapsByCategory": [
    {
      "category": "electronics|jewelry|furniture|etc",
      "inventoryValue": number,
      "coveredAmount": number,
      "gap": number,
      "riskLevel": "high|medium|low"
    }
  ],
  "recommendations": [
    {
      "type": "increase_coverage|add_rider|schedule_items|lower_deductible",
      "priority": "high|medium|low",
      "description": "detailed recommendation",
      "estimatedCost": number,
      "potentialSavings": number
    }
  ],
  "exclusions": [
    "list of notable exclusions that affect user's inventory"
  ],
  "confidence": number
}"#;

/// Build the policy comparison prompt around the user's inventory
pub fn policy_prompt(total_inventory_value: f64, inventory: &[InventoryLine]) -> String {
    let items = serde_json::to_string_pretty(inventory).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"
Analyze this insurance policy document and compare it against the user's current inventory to identify coverage gaps and provide recommendations.

USER'S CURRENT INVENTORY:
Total Value: ${}
Items: {}

ANALYSIS REQUIREMENTS:
1. Extract key policy details (coverage limits, deductibles, exclusions, policy type)
2. Identify specific coverage gaps between policy and inventory
3. Calculate under-insurance amounts for each category
4. Provide actionable recommendations

Return your analysis as a JSON object with this exact structure:
{}

Be thorough in identifying coverage gaps, especially for high-value items like jewelry, electronics, and art that often require special coverage.
"#,
        format_currency(total_inventory_value),
        items,
        POLICY_RESPONSE_SCHEMA
    )
}

/// `1234567.5` → `1,234,567.50`
fn format_currency(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}.{:02}", grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "0.00");
        assert_eq!(format_currency(999.999), "1,000.00");
        assert_eq!(format_currency(1234567.5), "1,234,567.50");
    }

    #[test]
    fn test_policy_prompt_embeds_inventory() {
        let inventory = vec![InventoryLine {
            name: "Diamond ring".into(),
            category: "jewelry".into(),
            value: 4200.0,
            brand: None,
            model: None,
        }];

        let prompt = policy_prompt(4200.0, &inventory);

        assert!(prompt.contains("Total Value: $4,200.00"));
        assert!(prompt.contains("Diamond ring"));
        assert!(prompt.contains("\"gapsByCategory\""));
    }

    #[test]
    fn test_image_prompt_lists_every_category() {
        for category in crate::models::Category::ALL {
            assert!(IMAGE_ANALYSIS_PROMPT.contains(category.as_str()));
        }
    }
}
