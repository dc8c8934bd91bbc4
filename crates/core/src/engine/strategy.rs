use crate::domain::recommendation::{
    AllocationStrategy, AssetClass, FinancialMetrics, FundingNote, FundingProjection, Goal,
    ProjectionUnavailable, RiskProfile, VehicleWeight,
};
use crate::engine::policy::AllocationPolicy;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct StrategyGenerator {
    policy: AllocationPolicy,
}

impl StrategyGenerator {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self { policy }
    }

    /// Weights come from the policy row for the risk category alone; goals only shape the
    /// funding notes. Output is a pure function of the inputs.
    pub fn generate(
        &self,
        risk_profile: &RiskProfile,
        metrics: &FinancialMetrics,
        goals: &[Goal],
    ) -> AllocationStrategy {
        let weights: BTreeMap<AssetClass, f64> = self
            .policy
            .table
            .get(&risk_profile.category)
            .cloned()
            .unwrap_or_default();

        let expected_annual_return: f64 = weights
            .iter()
            .map(|(class, w)| w * self.policy.expected_returns.get(class).copied().unwrap_or(0.0))
            .sum();

        let vehicles = self
            .policy
            .vehicle_splits
            .iter()
            .filter_map(|split| {
                let class_weight = weights.get(&split.asset_class).copied()?;
                Some(VehicleWeight {
                    asset_class: split.asset_class,
                    vehicle: split.vehicle,
                    weight: class_weight * split.share,
                })
            })
            .collect();

        let capacity = metrics.investment_capacity;
        let capital_deployable = capacity > 0.0;
        let funding_notes = goals
            .iter()
            .map(|goal| funding_note(goal, capacity, expected_annual_return))
            .collect();

        AllocationStrategy {
            category: risk_profile.category,
            weights,
            vehicles,
            expected_annual_return,
            monthly_investment: capacity,
            capital_deployable,
            funding_notes,
        }
    }
}

fn funding_note(goal: &Goal, capacity: f64, annual_return: f64) -> FundingNote {
    let unavailable = |reason, message: String| FundingNote {
        goal_index: goal.index,
        goal_name: goal.name.clone(),
        projection: FundingProjection::Unavailable { reason },
        message,
    };

    if capacity <= 0.0 {
        return unavailable(
            ProjectionUnavailable::NoDeployableCapital,
            "New capital is not currently deployable: expenses leave no monthly surplus to invest. \
             Projection not computable until a surplus exists."
                .to_string(),
        );
    }

    let Some(target) = goal.target_amount else {
        return unavailable(
            ProjectionUnavailable::MissingTarget,
            "Insufficient data: no target amount given, projection not computable.".to_string(),
        );
    };

    let rate = monthly_rate(annual_return);
    let Some(months_to_target) = months_to_reach(target, capacity, rate) else {
        return unavailable(
            ProjectionUnavailable::Unreachable,
            format!(
                "Investing {capacity:.2} per month at an expected {:.2}% a year never reaches \
                 {target:.2}; projection not computable.",
                annual_return * 100.0
            ),
        );
    };

    let (required_monthly_contribution, on_track) = match goal.horizon_months {
        Some(horizon) => (
            Some(required_contribution(target, horizon, rate)),
            Some(months_to_target <= horizon),
        ),
        None => (None, None),
    };

    let mut message = format!(
        "Investing {capacity:.2} per month at an expected {:.2}% a year reaches {target:.2} in about {} ({months_to_target} months).",
        annual_return * 100.0,
        years_and_months(months_to_target),
    );
    match (goal.horizon_months, required_monthly_contribution, on_track) {
        (Some(horizon), Some(required), Some(true)) => message.push_str(&format!(
            " On track for the {horizon}-month horizon (needs {required:.2} per month)."
        )),
        (Some(horizon), Some(required), Some(false)) => message.push_str(&format!(
            " Behind the {horizon}-month horizon: needs {required:.2} per month."
        )),
        _ => message.push_str(" No horizon given, so on-track status is not assessed."),
    }

    FundingNote {
        goal_index: goal.index,
        goal_name: goal.name.clone(),
        projection: FundingProjection::Projected {
            months_to_target,
            required_monthly_contribution,
            on_track,
        },
        message,
    }
}

fn monthly_rate(annual_return: f64) -> f64 {
    (1.0 + annual_return).powf(1.0 / 12.0) - 1.0
}

/// Whole months of `contribution` deposits, starting from zero, until the balance reaches
/// `target`. `None` when the balance never gets there.
fn months_to_reach(target: f64, contribution: f64, rate: f64) -> Option<u32> {
    let months = if rate.abs() < 1e-12 {
        target / contribution
    } else {
        let growth = 1.0 + target * rate / contribution;
        if growth <= 0.0 {
            return None;
        }
        growth.ln() / (1.0 + rate).ln()
    };
    let months = months.ceil();
    if !months.is_finite() || months >= u32::MAX as f64 {
        None
    } else {
        Some((months as u32).max(1))
    }
}

fn required_contribution(target: f64, horizon_months: u32, rate: f64) -> f64 {
    let n = f64::from(horizon_months);
    if rate.abs() < 1e-12 {
        target / n
    } else {
        target * rate / ((1.0 + rate).powf(n) - 1.0)
    }
}

fn years_and_months(months: u32) -> String {
    let (years, rest) = (months / 12, months % 12);
    match (years, rest) {
        (0, m) => format!("{m} months"),
        (y, 0) => format!("{y} years"),
        (y, m) => format!("{y} years {m} months"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::RiskTolerance;
    use crate::domain::recommendation::{GoalKind, RiskCategory};
    use crate::engine::metrics::MetricsCalculator;
    use crate::engine::policy::WEIGHT_TOLERANCE;

    fn profile(category: RiskCategory) -> RiskProfile {
        RiskProfile {
            category,
            score: 50,
            stated_tolerance: RiskTolerance::Moderate,
            factors: vec![],
        }
    }

    fn goal(index: usize, name: &str, target: Option<f64>, horizon: Option<u32>) -> Goal {
        Goal {
            index,
            name: name.to_string(),
            kind: GoalKind::Other,
            target_amount: target,
            horizon_months: horizon,
            priority: index as u32 + 1,
        }
    }

    fn metrics(income: f64, expenses: f64) -> FinancialMetrics {
        MetricsCalculator::new(0.3)
            .compute(income, expenses, 0.0)
            .unwrap()
    }

    #[test]
    fn weights_sum_to_one_for_every_category() {
        let generator = StrategyGenerator::new(AllocationPolicy::default());
        for category in [
            RiskCategory::Conservative,
            RiskCategory::Moderate,
            RiskCategory::Aggressive,
        ] {
            let s = generator.generate(&profile(category), &metrics(5000.0, 3000.0), &[]);
            let sum: f64 = s.weights.values().sum();
            assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE, "{category}: {sum}");
            assert!(s.weights.values().all(|w| *w >= 0.0));

            let vehicle_sum: f64 = s.vehicles.iter().map(|v| v.weight).sum();
            assert!((vehicle_sum - 1.0).abs() <= WEIGHT_TOLERANCE);
        }
    }

    #[test]
    fn moderate_blended_return() {
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Moderate),
            &metrics(5000.0, 3000.0),
            &[],
        );
        // 0.5*0.11 + 0.3*0.07 + 0.1*0.06 + 0.1*0.08
        assert!((s.expected_annual_return - 0.09).abs() < 1e-12);
        assert_eq!(s.weights[&AssetClass::Equity], 0.5);
    }

    #[test]
    fn retirement_projection_is_finite_and_on_track() {
        let goals = [goal(0, "retirement", Some(500_000.0), Some(360))];
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Moderate),
            &metrics(5000.0, 3000.0),
            &goals,
        );
        assert_eq!(s.funding_notes.len(), 1);
        assert!(s.capital_deployable);
        match &s.funding_notes[0].projection {
            FundingProjection::Projected {
                months_to_target,
                required_monthly_contribution,
                on_track,
            } => {
                // 600/month at 9% a year reaches 500k in roughly 22.7 years.
                assert!((265..=280).contains(months_to_target), "{months_to_target}");
                assert_eq!(*on_track, Some(true));
                let required = required_monthly_contribution.unwrap();
                assert!(required > 0.0 && required < 600.0, "{required}");
            }
            other => panic!("expected projection, got {other:?}"),
        }
    }

    #[test]
    fn short_horizon_is_flagged_behind() {
        let goals = [goal(0, "car", Some(50_000.0), Some(12))];
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Moderate),
            &metrics(5000.0, 3000.0),
            &goals,
        );
        assert!(matches!(
            s.funding_notes[0].projection,
            FundingProjection::Projected {
                on_track: Some(false),
                ..
            }
        ));
    }

    #[test]
    fn shortfall_reports_no_deployable_capital_for_every_goal() {
        let goals = [
            goal(0, "retirement", Some(500_000.0), Some(360)),
            goal(1, "dream", None, None),
        ];
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Conservative),
            &metrics(2000.0, 2500.0),
            &goals,
        );
        assert!(!s.capital_deployable);
        assert_eq!(s.monthly_investment, 0.0);
        let sum: f64 = s.weights.values().sum();
        assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE);
        assert_eq!(s.funding_notes.len(), 2);
        for note in &s.funding_notes {
            assert_eq!(
                note.projection,
                FundingProjection::Unavailable {
                    reason: ProjectionUnavailable::NoDeployableCapital
                }
            );
            assert!(note.message.contains("not currently deployable"));
        }
    }

    #[test]
    fn missing_target_is_insufficient_data() {
        let goals = [goal(0, "dream", None, Some(24))];
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Moderate),
            &metrics(5000.0, 3000.0),
            &goals,
        );
        assert_eq!(
            s.funding_notes[0].projection,
            FundingProjection::Unavailable {
                reason: ProjectionUnavailable::MissingTarget
            }
        );
    }

    #[test]
    fn one_note_per_goal_in_goal_order() {
        let goals = [
            goal(2, "c", Some(1000.0), Some(6)),
            goal(0, "a", None, None),
            goal(1, "b", Some(10.0), None),
        ];
        let s = StrategyGenerator::new(AllocationPolicy::default()).generate(
            &profile(RiskCategory::Aggressive),
            &metrics(5000.0, 3000.0),
            &goals,
        );
        let indices: Vec<_> = s.funding_notes.iter().map(|n| n.goal_index).collect();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let goals = [goal(0, "retirement", Some(500_000.0), Some(360))];
        let generator = StrategyGenerator::new(AllocationPolicy::default());
        let a = generator.generate(&profile(RiskCategory::Moderate), &metrics(5000.0, 3000.0), &goals);
        let b = generator.generate(&profile(RiskCategory::Moderate), &metrics(5000.0, 3000.0), &goals);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn zero_rate_projection_is_linear() {
        assert_eq!(months_to_reach(1200.0, 100.0, 0.0), Some(12));
        assert!((required_contribution(1200.0, 12, 0.0) - 100.0).abs() < 1e-12);
    }

    #[test]
    fn negative_returns_that_never_reach_the_target_are_unavailable() {
        let mut policy = AllocationPolicy::default();
        policy.expected_returns.values_mut().for_each(|r| *r = -0.05);
        policy.validate().unwrap();

        let goals = [goal(0, "retirement", Some(500_000.0), Some(360))];
        let s = StrategyGenerator::new(policy).generate(
            &profile(RiskCategory::Moderate),
            &metrics(5000.0, 3000.0),
            &goals,
        );
        assert_eq!(
            s.funding_notes[0].projection,
            FundingProjection::Unavailable {
                reason: ProjectionUnavailable::Unreachable
            }
        );
        assert!(s.funding_notes[0].message.contains("never reaches"));
    }

    #[test]
    fn months_to_reach_reports_unreachable_and_overflow() {
        assert_eq!(months_to_reach(500_000.0, 600.0, -0.004), None);
        assert_eq!(months_to_reach(1e15, 1e-6, 0.0), None);
        assert!(months_to_reach(500_000.0, 600.0, monthly_rate(0.09)).is_some());
    }

    #[test]
    fn formats_durations() {
        assert_eq!(years_and_months(5), "5 months");
        assert_eq!(years_and_months(24), "2 years");
        assert_eq!(years_and_months(290), "24 years 2 months");
    }
}
