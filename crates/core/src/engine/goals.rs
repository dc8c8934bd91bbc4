use crate::domain::client::{RawGoal, StructuredGoal};
use crate::domain::recommendation::{Goal, GoalKind};
use serde_json::Value;

const MONTHS_PER_YEAR: u32 = 12;

#[derive(Debug, Clone, Default)]
pub struct GoalPlanner;

impl GoalPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Canonicalizes every raw goal and orders the result by urgency: goals with a horizon come
    /// first, soonest first; goals without one follow in input order. Nothing is dropped.
    pub fn normalize(&self, raw_goals: &[RawGoal]) -> Vec<Goal> {
        let mut goals: Vec<Goal> = raw_goals
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let goal = match raw {
                    RawGoal::Structured(g) => parse_structured(index, g),
                    RawGoal::Freeform(text) => parse_freeform(index, text),
                };
                if goal.target_amount.is_none() || goal.horizon_months.is_none() {
                    tracing::debug!(index, name = %goal.name, "goal is missing target or horizon");
                }
                goal
            })
            .collect();

        // sort_by_key is stable; the index makes the tie-break explicit anyway.
        goals.sort_by_key(|g| (g.horizon_months.is_none(), g.horizon_months, g.index));
        for (rank, goal) in goals.iter_mut().enumerate() {
            goal.priority = rank as u32 + 1;
        }
        goals
    }
}

fn parse_structured(index: usize, raw: &StructuredGoal) -> Goal {
    let name = canonical_name(&raw.name).unwrap_or_else(|| fallback_name(index));
    let target_amount = raw.target_amount.as_ref().and_then(positive_number);

    let horizon_months = raw
        .horizon_months
        .as_ref()
        .and_then(positive_number)
        .and_then(|m| months_from(m, 1.0))
        .or_else(|| {
            raw.horizon_years
                .as_ref()
                .and_then(positive_number)
                .and_then(|y| months_from(y, MONTHS_PER_YEAR as f64))
        });

    let kind = classify(&name).unwrap_or_else(|| {
        raw.description
            .as_deref()
            .and_then(classify)
            .unwrap_or(GoalKind::Other)
    });

    Goal {
        index,
        name,
        kind,
        target_amount,
        horizon_months,
        priority: 0,
    }
}

fn parse_freeform(index: usize, text: &str) -> Goal {
    let tokens = tokenize(text);

    let mut name_words = Vec::new();
    let mut target_amount = None;
    let mut horizon_months = None;
    let mut seen_number = false;

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if let Some((value, suffix)) = split_number(token) {
            seen_number = true;
            let unit = if suffix.is_empty() {
                tokens.get(i + 1).map(String::as_str).unwrap_or("")
            } else {
                suffix
            };
            let consumed_next = suffix.is_empty() && !unit.is_empty();

            if let Some(per_unit) = horizon_unit(unit) {
                if horizon_months.is_none() {
                    horizon_months = months_from(value, per_unit);
                }
                i += if consumed_next { 2 } else { 1 };
                continue;
            }
            if let Some(multiplier) = amount_multiplier(unit) {
                let amount = value * multiplier;
                if target_amount.is_none() && amount > 0.0 && amount.is_finite() {
                    target_amount = Some(amount);
                }
                i += if consumed_next { 2 } else { 1 };
                continue;
            }
            if suffix.is_empty() && target_amount.is_none() && value > 0.0 {
                target_amount = Some(value);
            }
        } else if !seen_number && !is_filler(token) {
            name_words.push(token.as_str());
        }
        i += 1;
    }

    let name = canonical_name(&name_words.join(" "))
        .or_else(|| canonical_name(text))
        .unwrap_or_else(|| fallback_name(index));
    let kind = classify(&name)
        .or_else(|| classify(text))
        .unwrap_or(GoalKind::Other);

    Goal {
        index,
        name,
        kind,
        target_amount,
        horizon_months,
        priority: 0,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ':' | ';' | '(' | ')' | '/'))
        .map(|t| {
            t.trim_matches(|c: char| matches!(c, '.' | '!' | '?' | '"' | '\''))
                .trim_start_matches(['$', '₹', '€', '£'])
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits "2,500,000" into (2500000, "") and "10k" into (10, "k").
fn split_number(token: &str) -> Option<(f64, &str)> {
    let end = token
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == ',' || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    if end == 0 {
        return None;
    }
    let digits: String = token[..end].chars().filter(|c| *c != ',').collect();
    let value = digits.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((value, &token[end..]))
}

fn horizon_unit(unit: &str) -> Option<f64> {
    match unit {
        "y" | "yr" | "yrs" | "year" | "years" => Some(MONTHS_PER_YEAR as f64),
        "mo" | "mos" | "month" | "months" => Some(1.0),
        _ => None,
    }
}

fn amount_multiplier(unit: &str) -> Option<f64> {
    match unit {
        "k" | "thousand" => Some(1e3),
        "m" | "mn" | "million" => Some(1e6),
        "l" | "lac" | "lacs" | "lakh" | "lakhs" => Some(1e5),
        "cr" | "crore" | "crores" => Some(1e7),
        _ => None,
    }
}

fn is_filler(token: &str) -> bool {
    matches!(
        token,
        "a" | "an" | "the" | "in" | "within" | "by" | "of" | "for" | "to" | "my" | "about"
            | "around" | "target" | "need" | "needs" | "want" | "rs" | "inr" | "usd"
    )
}

fn positive_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then_some(n)
}

fn months_from(value: f64, months_per_unit: f64) -> Option<u32> {
    let months = (value * months_per_unit).round();
    (months >= 1.0 && months <= u32::MAX as f64).then_some(months as u32)
}

fn canonical_name(raw: &str) -> Option<String> {
    let words: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    (!words.is_empty()).then(|| words.join("_"))
}

fn fallback_name(index: usize) -> String {
    format!("goal_{}", index + 1)
}

fn classify(text: &str) -> Option<GoalKind> {
    let s = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

    if has(&["retire", "pension"]) {
        Some(GoalKind::Retirement)
    } else if has(&["educat", "college", "school", "university", "tuition"]) {
        Some(GoalKind::Education)
    } else if has(&["house", "home", "apartment", "flat", "property"]) {
        Some(GoalKind::Home)
    } else if has(&["car", "vehicle", "bike"]) {
        Some(GoalKind::Vehicle)
    } else if has(&["emergency", "rainy"]) {
        Some(GoalKind::EmergencyFund)
    } else if has(&["wedding", "marriage"]) {
        Some(GoalKind::Wedding)
    } else if has(&["travel", "vacation", "holiday", "trip"]) {
        Some(GoalKind::Travel)
    } else if has(&["wealth", "invest", "corpus", "saving"]) {
        Some(GoalKind::Wealth)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, prop_oneof, proptest, Just, Strategy};
    use serde_json::json;

    fn structured(name: &str, target: Value, years: Value) -> RawGoal {
        RawGoal::Structured(StructuredGoal {
            name: name.to_string(),
            target_amount: Some(target),
            horizon_years: Some(years),
            ..StructuredGoal::default()
        })
    }

    #[test]
    fn structured_goal_is_canonicalized() {
        let goals = GoalPlanner::new().normalize(&[structured(
            "Retirement",
            json!(500000),
            json!(30),
        )]);
        assert_eq!(goals.len(), 1);
        let g = &goals[0];
        assert_eq!(g.name, "retirement");
        assert_eq!(g.kind, GoalKind::Retirement);
        assert_eq!(g.target_amount, Some(500000.0));
        assert_eq!(g.horizon_months, Some(360));
        assert_eq!(g.priority, 1);
    }

    #[test]
    fn numeric_strings_are_accepted_and_garbage_becomes_null() {
        let goals = GoalPlanner::new().normalize(&[
            structured("house", json!("2,500,000"), json!("5")),
            structured("car", json!("abc"), json!("")),
        ]);
        let house = goals.iter().find(|g| g.name == "house").unwrap();
        assert_eq!(house.target_amount, Some(2_500_000.0));
        assert_eq!(house.horizon_months, Some(60));

        let car = goals.iter().find(|g| g.name == "car").unwrap();
        assert_eq!(car.target_amount, None);
        assert_eq!(car.horizon_months, None);
        assert_eq!(car.kind, GoalKind::Vehicle);
    }

    #[test]
    fn months_take_precedence_over_years() {
        let raw = RawGoal::Structured(StructuredGoal {
            name: "trip".into(),
            target_amount: Some(json!(3000)),
            horizon_years: Some(json!(2)),
            horizon_months: Some(json!(18)),
            description: None,
        });
        let goals = GoalPlanner::new().normalize(&[raw]);
        assert_eq!(goals[0].horizon_months, Some(18));
        assert_eq!(goals[0].kind, GoalKind::Travel);
    }

    #[test]
    fn parses_freeform_text() {
        let goals = GoalPlanner::new().normalize(&[RawGoal::Freeform(
            "Buy a house: 2,500,000 within 5 years".into(),
        )]);
        let g = &goals[0];
        assert_eq!(g.name, "buy_house");
        assert_eq!(g.kind, GoalKind::Home);
        assert_eq!(g.target_amount, Some(2_500_000.0));
        assert_eq!(g.horizon_months, Some(60));
    }

    #[test]
    fn parses_freeform_suffixes() {
        let planner = GoalPlanner::new();
        let goals = planner.normalize(&[RawGoal::Freeform("emergency fund 10k in 18 months".into())]);
        assert_eq!(goals[0].name, "emergency_fund");
        assert_eq!(goals[0].target_amount, Some(10_000.0));
        assert_eq!(goals[0].horizon_months, Some(18));

        let goals = planner.normalize(&[RawGoal::Freeform("child education 25 lakh 12yrs".into())]);
        assert_eq!(goals[0].kind, GoalKind::Education);
        assert_eq!(goals[0].target_amount, Some(2_500_000.0));
        assert_eq!(goals[0].horizon_months, Some(144));
    }

    #[test]
    fn unparseable_freeform_is_kept_with_null_fields() {
        let goals = GoalPlanner::new().normalize(&[RawGoal::Freeform("be happy".into())]);
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].name, "be_happy");
        assert_eq!(goals[0].kind, GoalKind::Other);
        assert_eq!(goals[0].target_amount, None);
        assert_eq!(goals[0].horizon_months, None);
    }

    #[test]
    fn nameless_goals_get_positional_names() {
        let goals = GoalPlanner::new().normalize(&[
            RawGoal::Freeform("   ".into()),
            RawGoal::Structured(StructuredGoal::default()),
        ]);
        let names: Vec<_> = goals.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["goal_1", "goal_2"]);
    }

    #[test]
    fn orders_by_horizon_then_input_order() {
        let goals = GoalPlanner::new().normalize(&[
            RawGoal::Freeform("someday boat".into()),
            structured("retirement", json!(1), json!(30)),
            structured("car", json!(1), json!(3)),
            RawGoal::Freeform("travel".into()),
            structured("wedding", json!(1), json!(3)),
        ]);
        let order: Vec<_> = goals.iter().map(|g| g.index).collect();
        assert_eq!(order, vec![2, 4, 1, 0, 3]);
        let priorities: Vec<_> = goals.iter().map(|g| g.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(GoalPlanner::new().normalize(&[]).is_empty());
    }

    fn raw_goal() -> impl Strategy<Value = RawGoal> {
        prop_oneof![
            any::<String>().prop_map(RawGoal::Freeform),
            (any::<String>(), any::<i64>(), any::<i32>()).prop_map(|(name, t, y)| {
                structured(&name, json!(t), json!(y))
            }),
            Just(RawGoal::Structured(StructuredGoal::default())),
        ]
    }

    proptest! {
        #[test]
        fn prop_goal_count_is_preserved(raw in proptest::collection::vec(raw_goal(), 0..12)) {
            let goals = GoalPlanner::new().normalize(&raw);
            prop_assert_eq!(goals.len(), raw.len());

            let mut indices: Vec<_> = goals.iter().map(|g| g.index).collect();
            indices.sort_unstable();
            prop_assert_eq!(indices, (0..raw.len()).collect::<Vec<_>>());

            for pair in goals.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                match (a.horizon_months, b.horizon_months) {
                    (Some(x), Some(y)) => prop_assert!(x < y || (x == y && a.index < b.index)),
                    (None, None) => prop_assert!(a.index < b.index),
                    (Some(_), None) => {}
                    (None, Some(_)) => prop_assert!(false, "undefined horizon sorted first"),
                }
            }
        }
    }
}
