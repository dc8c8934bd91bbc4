use crate::domain::client::{ClientRecord, RawGoal, StructuredGoal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row of the `client_forms` table as the intake form writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClientFormRow {
    pub id: i64,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub occupation: Option<String>,
    pub city: Option<String>,
    pub monthly_salary: Option<f64>,
    pub monthly_side_income: Option<f64>,
    pub monthly_other_income: Option<f64>,
    pub monthly_bills: Option<f64>,
    pub monthly_daily_life: Option<f64>,
    pub monthly_entertainment: Option<f64>,
    pub monthly_savings: Option<f64>,
    pub emergency_cash: Option<f64>,
    pub risk_tolerance: Option<String>,
    pub financial_goals: Option<Value>,
}

impl ClientFormRow {
    /// Folds the form's income and expense breakdowns into totals. A total is missing only
    /// when every one of its components is missing.
    pub fn into_record(self) -> ClientRecord {
        let monthly_income = sum_present(&[
            self.monthly_salary,
            self.monthly_side_income,
            self.monthly_other_income,
        ]);
        let monthly_expenses = sum_present(&[
            self.monthly_bills,
            self.monthly_daily_life,
            self.monthly_entertainment,
        ]);

        let goals = match self.financial_goals {
            Some(v) => goals_from_form(&self.client_id, v),
            None => Vec::new(),
        };

        ClientRecord {
            age: self.age.map(i64::from),
            client_id: self.client_id,
            monthly_income,
            monthly_expenses,
            emergency_cash: self.emergency_cash,
            risk_tolerance: self.risk_tolerance,
            goals,
        }
    }
}

fn sum_present(parts: &[Option<f64>]) -> Option<f64> {
    parts
        .iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// The form stores goals as `{"<goal type>": {"selected": bool, "amount", "years",
/// "description"}}`, sometimes double-encoded as a JSON string. Lists of goals are accepted too.
pub fn goals_from_form(client_id: &str, payload: Value) -> Vec<RawGoal> {
    let payload = match payload {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(v) => v,
            Err(_) if !s.trim().is_empty() => return vec![RawGoal::Freeform(s)],
            Err(_) => return Vec::new(),
        },
        other => other,
    };

    match payload {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, details)| is_selected(details))
            .map(|(goal_type, details)| {
                RawGoal::Structured(StructuredGoal {
                    name: goal_type,
                    target_amount: details.get("amount").cloned(),
                    horizon_years: details.get("years").cloned(),
                    horizon_months: details.get("months").cloned(),
                    description: details
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                })
            })
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match serde_json::from_value::<RawGoal>(item.clone()) {
                Ok(goal) => goal,
                // Keep the slot so the goal count survives; the planner reports it as unparseable.
                Err(_) => RawGoal::Freeform(item.to_string()),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(%client_id, payload = %other, "unsupported financial_goals payload");
            Vec::new()
        }
    }
}

fn is_selected(details: &Value) -> bool {
    match details.get("selected") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
