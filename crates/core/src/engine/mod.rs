//! Deterministic analysis of a client's self-report: metrics, risk profile, goals and the
//! resulting allocation. Nothing in here performs I/O or reads the environment.

pub mod error;
pub mod goals;
pub mod metrics;
pub mod policy;
pub mod risk;
pub mod strategy;

use crate::domain::client::ClientRecord;
use crate::domain::recommendation::Recommendation;
use chrono::{DateTime, Utc};

pub use error::{AdvisorError, Result};
pub use goals::GoalPlanner;
pub use metrics::MetricsCalculator;
pub use policy::PolicyConfig;
pub use risk::RiskProfiler;
pub use strategy::StrategyGenerator;

#[derive(Debug, Clone)]
pub struct AdvisorEngine {
    metrics: MetricsCalculator,
    profiler: RiskProfiler,
    planner: GoalPlanner,
    strategist: StrategyGenerator,
}

impl AdvisorEngine {
    pub fn new(policy: PolicyConfig) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            metrics: MetricsCalculator::new(policy.capacity_fraction),
            profiler: RiskProfiler::new(policy.risk),
            planner: GoalPlanner::new(),
            strategist: StrategyGenerator::new(policy.allocation),
        })
    }

    pub fn advise(&self, record: &ClientRecord) -> Result<Recommendation> {
        self.advise_at(record, Utc::now())
    }

    /// Same as [`advise`](Self::advise) with the generation timestamp supplied by the caller.
    pub fn advise_at(
        &self,
        record: &ClientRecord,
        generated_at: DateTime<Utc>,
    ) -> Result<Recommendation> {
        let income = require(record.monthly_income, "monthly_income")?;
        let expenses = require(record.monthly_expenses, "monthly_expenses")?;
        let tolerance = record
            .risk_tolerance
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AdvisorError::invalid_input("risk_tolerance", "is required"))?;
        let age = require(record.age, "age")?;
        let age = u32::try_from(age)
            .ok()
            .filter(|a| *a > 0)
            .ok_or_else(|| AdvisorError::invalid_input("age", "must be a positive integer"))?;
        let emergency_cash = record.emergency_cash.unwrap_or(0.0);

        let metrics = self.metrics.compute(income, expenses, emergency_cash)?;
        let risk_profile = self.profiler.assess(tolerance, age, &metrics)?;
        let goals = self.planner.normalize(&record.goals);
        let strategy = self.strategist.generate(&risk_profile, &metrics, &goals);

        tracing::debug!(
            client_id = %record.client_id,
            category = %risk_profile.category,
            score = risk_profile.score,
            goals = goals.len(),
            "recommendation assembled"
        );

        Ok(Recommendation {
            client_id: record.client_id.clone(),
            generated_at,
            metrics,
            risk_profile,
            goals,
            strategy,
        })
    }
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AdvisorError::invalid_input(field, "is required"))
}
