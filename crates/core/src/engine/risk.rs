use crate::domain::client::RiskTolerance;
use crate::domain::recommendation::{
    EmergencyFundRatio, FinancialMetrics, RiskFactor, RiskFactorKind, RiskProfile,
};
use crate::engine::error::{AdvisorError, Result};
use crate::engine::policy::RiskPolicy;

#[derive(Debug, Clone)]
pub struct RiskProfiler {
    policy: RiskPolicy,
}

impl RiskProfiler {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    /// Scores a client. The stated tolerance sets the anchor; age, investment capacity and the
    /// emergency buffer each add one capped delta.
    pub fn assess(
        &self,
        stated_tolerance: &str,
        age: u32,
        metrics: &FinancialMetrics,
    ) -> Result<RiskProfile> {
        let tolerance = RiskTolerance::parse(stated_tolerance).ok_or_else(|| {
            AdvisorError::invalid_input(
                "risk_tolerance",
                format!("unrecognized value {stated_tolerance:?}"),
            )
        })?;
        if age == 0 {
            return Err(AdvisorError::invalid_input("age", "must be a positive integer"));
        }

        let anchor = self.policy.anchor(tolerance);
        let mut factors = vec![RiskFactor {
            factor: RiskFactorKind::StatedTolerance,
            delta: anchor,
            detail: format!("stated tolerance {tolerance} anchors the score at {anchor}"),
        }];

        factors.push(self.age_factor(age));
        factors.push(self.capacity_factor(metrics));
        factors.push(self.emergency_factor(metrics.emergency_fund_ratio));

        let raw: i32 = factors.iter().map(|f| f.delta).sum();
        let score = raw.clamp(0, 100) as u8;
        let category = self.policy.category_for(score);

        tracing::debug!(%tolerance, age, raw, score, %category, "risk profile assessed");

        Ok(RiskProfile {
            category,
            score,
            stated_tolerance: tolerance,
            factors,
        })
    }

    fn capped(&self, delta: i32) -> i32 {
        let cap = self.policy.max_factor_delta.max(0);
        delta.clamp(-cap, cap)
    }

    fn age_factor(&self, age: u32) -> RiskFactor {
        let delta = self
            .policy
            .age_rules
            .iter()
            .find(|r| age < r.below)
            .map(|r| r.delta)
            .unwrap_or(self.policy.age_fallback_delta);

        RiskFactor {
            factor: RiskFactorKind::Age,
            delta: self.capped(delta),
            detail: format!("age {age}"),
        }
    }

    fn capacity_factor(&self, metrics: &FinancialMetrics) -> RiskFactor {
        let capacity = metrics.investment_capacity;
        let (delta, detail) = if capacity <= 0.0 {
            (
                self.policy.zero_capacity_delta,
                "no investable surplus".to_string(),
            )
        } else {
            // Capacity > 0 implies income > 0.
            let share = capacity / metrics.monthly_income;
            let delta = self
                .policy
                .capacity_rules
                .iter()
                .find(|r| share >= r.min_share)
                .map(|r| r.delta)
                .unwrap_or(0);
            (
                delta,
                format!("investment capacity is {:.1}% of income", share * 100.0),
            )
        };

        RiskFactor {
            factor: RiskFactorKind::InvestmentCapacity,
            delta: self.capped(delta),
            detail,
        }
    }

    fn emergency_factor(&self, ratio: EmergencyFundRatio) -> RiskFactor {
        let (delta, detail) = match ratio {
            EmergencyFundRatio::Undefined => (
                self.policy.undefined_emergency_delta,
                "no monthly expenses reported; runway undefined".to_string(),
            ),
            EmergencyFundRatio::Months(months) => {
                let delta = self
                    .policy
                    .emergency_rules
                    .iter()
                    .find(|r| months < r.below_months)
                    .map(|r| r.delta)
                    .unwrap_or(0);
                (delta, format!("emergency fund covers {months:.1} months"))
            }
        };

        RiskFactor {
            factor: RiskFactorKind::EmergencyFund,
            delta: self.capped(delta),
            detail,
        }
    }
}
