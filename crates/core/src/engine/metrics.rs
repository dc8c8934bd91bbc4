use crate::domain::recommendation::{EmergencyFundRatio, FinancialMetrics, LiquidityNeeds};
use crate::engine::error::{AdvisorError, Result};

// Runway above which a client is considered to have low liquidity needs.
const LOW_LIQUIDITY_NEED_MONTHS: f64 = 6.0;

#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    capacity_fraction: f64,
}

impl MetricsCalculator {
    pub fn new(capacity_fraction: f64) -> Self {
        Self { capacity_fraction }
    }

    pub fn compute(
        &self,
        income: f64,
        expenses: f64,
        emergency_cash: f64,
    ) -> Result<FinancialMetrics> {
        ensure_non_negative("monthly_income", income)?;
        ensure_non_negative("monthly_expenses", expenses)?;
        ensure_non_negative("emergency_cash", emergency_cash)?;

        let monthly_surplus = income - expenses;
        let investment_capacity = (monthly_surplus * self.capacity_fraction)
            .max(0.0)
            .min(monthly_surplus.max(0.0));

        let emergency_fund_ratio = if expenses == 0.0 {
            EmergencyFundRatio::Undefined
        } else {
            EmergencyFundRatio::Months(emergency_cash / expenses)
        };

        let liquidity_needs = match emergency_fund_ratio.months() {
            Some(m) if m <= LOW_LIQUIDITY_NEED_MONTHS => LiquidityNeeds::Medium,
            _ => LiquidityNeeds::Low,
        };

        Ok(FinancialMetrics {
            monthly_income: income,
            monthly_expenses: expenses,
            emergency_cash,
            monthly_surplus,
            investment_capacity,
            emergency_fund_ratio,
            liquidity_needs,
        })
    }
}

fn ensure_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(AdvisorError::invalid_input(
            field,
            format!("must be a finite number (got {value})"),
        ));
    }
    if value < 0.0 {
        return Err(AdvisorError::invalid_input(
            field,
            format!("must be non-negative (got {value})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn calc() -> MetricsCalculator {
        MetricsCalculator::new(0.3)
    }

    #[test]
    fn computes_surplus_capacity_and_runway() {
        let m = calc().compute(5000.0, 3000.0, 9000.0).unwrap();
        assert_eq!(m.monthly_surplus, 2000.0);
        assert!((m.investment_capacity - 600.0).abs() < 1e-9);
        assert_eq!(m.emergency_fund_ratio, EmergencyFundRatio::Months(3.0));
        assert_eq!(m.liquidity_needs, LiquidityNeeds::Medium);
    }

    #[test]
    fn shortfall_clamps_capacity_to_zero() {
        let m = calc().compute(2000.0, 2500.0, 0.0).unwrap();
        assert_eq!(m.monthly_surplus, -500.0);
        assert_eq!(m.investment_capacity, 0.0);
    }

    #[test]
    fn zero_expenses_yield_undefined_ratio() {
        let m = calc().compute(1000.0, 0.0, 5000.0).unwrap();
        assert_eq!(m.emergency_fund_ratio, EmergencyFundRatio::Undefined);
        assert_eq!(m.liquidity_needs, LiquidityNeeds::Low);
    }

    #[test]
    fn rejects_negative_inputs_with_field_name() {
        let err = calc().compute(-1.0, 100.0, 0.0).unwrap_err();
        assert_eq!(err.field(), Some("monthly_income"));

        let err = calc().compute(100.0, -1.0, 0.0).unwrap_err();
        assert_eq!(err.field(), Some("monthly_expenses"));

        let err = calc().compute(100.0, 1.0, -0.5).unwrap_err();
        assert_eq!(err.field(), Some("emergency_cash"));
    }

    #[test]
    fn rejects_nan() {
        let err = calc().compute(f64::NAN, 100.0, 0.0).unwrap_err();
        assert_eq!(err.field(), Some("monthly_income"));
    }

    #[test]
    fn long_runway_means_low_liquidity_needs() {
        let m = calc().compute(5000.0, 1000.0, 7000.0).unwrap();
        assert_eq!(m.liquidity_needs, LiquidityNeeds::Low);
    }

    proptest! {
        #[test]
        fn prop_capacity_is_bounded_by_surplus(
            income in 0u32..1_000_000,
            expenses in 0u32..1_000_000,
            fraction_pct in 0u32..=100
        ) {
            let calc = MetricsCalculator::new(fraction_pct as f64 / 100.0);
            let m = calc.compute(income as f64, expenses as f64, 0.0).unwrap();
            let upper = (income as f64 - expenses as f64).max(0.0);
            prop_assert!(m.investment_capacity >= 0.0);
            prop_assert!(m.investment_capacity <= upper);
        }

        #[test]
        fn prop_ratio_undefined_iff_expenses_zero(
            cash in 0u32..1_000_000,
            expenses in 0u32..50_000
        ) {
            let m = calc().compute(10_000.0, expenses as f64, cash as f64).unwrap();
            if expenses == 0 {
                prop_assert!(m.emergency_fund_ratio.is_undefined());
            } else {
                prop_assert_eq!(
                    m.emergency_fund_ratio,
                    EmergencyFundRatio::Months(cash as f64 / expenses as f64)
                );
            }
        }
    }
}
