use serde::{Deserialize, Serialize};
use std::fmt;

/// Client self-report as handed over by the form source.
///
/// Income, expenses and risk tolerance are optional on the wire so that a missing value can be
/// rejected with the field name instead of failing deserialization as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    /// Signed so that a negative age reaches validation and is reported by field name.
    pub age: Option<i64>,
    pub monthly_income: Option<f64>,
    pub monthly_expenses: Option<f64>,
    pub emergency_cash: Option<f64>,
    pub risk_tolerance: Option<String>,
    #[serde(default)]
    pub goals: Vec<RawGoal>,
}

/// A goal as the client entered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawGoal {
    Freeform(String),
    Structured(StructuredGoal),
}

/// Structured goal payload. Numeric fields are kept as raw JSON because form builders send
/// numbers, numeric strings and empty strings interchangeably.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredGoal {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "amount", alias = "target")]
    pub target_amount: Option<serde_json::Value>,
    #[serde(default, alias = "years")]
    pub horizon_years: Option<serde_json::Value>,
    #[serde(default, alias = "months")]
    pub horizon_months: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

// Answers to the "market drops 20%" questionnaire scenario.
const SCENARIO_SELL_EVERYTHING: &str = "get me out of here! sell everything!";
const SCENARIO_WAIT_AND_WATCH: &str = "let me wait and watch for a while";
const SCENARIO_BUY_THE_DIP: &str = "great time to buy more at a discount!";

impl RiskTolerance {
    /// Parses a stated tolerance label. Unknown labels yield `None`; callers must not default.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "conservative" | "low" | SCENARIO_SELL_EVERYTHING => Some(Self::Conservative),
            "moderate" | "medium" | "balanced" | SCENARIO_WAIT_AND_WATCH => Some(Self::Moderate),
            "aggressive" | "high" | SCENARIO_BUY_THE_DIP => Some(Self::Aggressive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_labels_synonyms_and_scenario_answers() {
        assert_eq!(RiskTolerance::parse(" Moderate "), Some(RiskTolerance::Moderate));
        assert_eq!(RiskTolerance::parse("HIGH"), Some(RiskTolerance::Aggressive));
        assert_eq!(RiskTolerance::parse("low"), Some(RiskTolerance::Conservative));
        assert_eq!(
            RiskTolerance::parse("Great time to buy more at a discount!"),
            Some(RiskTolerance::Aggressive)
        );
        assert_eq!(
            RiskTolerance::parse("Get me out of here! Sell everything!"),
            Some(RiskTolerance::Conservative)
        );
        assert_eq!(RiskTolerance::parse("unknown_value"), None);
        assert_eq!(RiskTolerance::parse(""), None);
    }

    #[test]
    fn deserializes_mixed_goal_payloads() {
        let v = json!({
            "client_id": "c-1",
            "age": 34,
            "monthly_income": 5000.0,
            "monthly_expenses": 3000.0,
            "risk_tolerance": "moderate",
            "goals": [
                {"name": "retirement", "target": 500000, "horizon_years": 30},
                "buy a house 2,500,000 in 5 years",
                {"name": "car", "amount": "abc"}
            ]
        });

        let record: ClientRecord = serde_json::from_value(v).unwrap();
        assert_eq!(record.emergency_cash, None);
        assert_eq!(record.goals.len(), 3);
        match &record.goals[0] {
            RawGoal::Structured(g) => {
                assert_eq!(g.name, "retirement");
                assert_eq!(g.target_amount, Some(json!(500000)));
                assert_eq!(g.horizon_years, Some(json!(30)));
            }
            other => panic!("expected structured goal, got {other:?}"),
        }
        assert!(matches!(&record.goals[1], RawGoal::Freeform(s) if s.starts_with("buy a house")));
        assert!(matches!(&record.goals[2], RawGoal::Structured(g) if g.target_amount == Some(json!("abc"))));
    }

    #[test]
    fn missing_mandatory_fields_deserialize_as_none() {
        let v = json!({"client_id": "c-2", "goals": []});
        let record: ClientRecord = serde_json::from_value(v).unwrap();
        assert_eq!(record.monthly_income, None);
        assert_eq!(record.monthly_expenses, None);
        assert_eq!(record.risk_tolerance, None);
    }
}
