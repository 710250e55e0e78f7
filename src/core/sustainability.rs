//! Withdrawal sustainability scoring.
//!
//! Classifies a plan into a status band from its simulated success
//! probability, compares the current withdrawal against a benchmark safe
//! withdrawal rate, and attaches concrete recommendations when the plan
//! falls short. Pure over its scalar inputs; the same inputs always produce
//! the same recommendation list.

use super::error::EngineError;
use super::types::{Recommendation, SustainabilityReport, SustainabilityStatus};

const SAFE_THRESHOLD: f64 = 85.0;
const GOOD_THRESHOLD: f64 = 70.0;
const MODERATE_THRESHOLD: f64 = 50.0;
const CAUTION_THRESHOLD: f64 = 30.0;

pub fn evaluate_sustainability(
    success_probability: f64,
    current_withdrawal: f64,
    portfolio_value: f64,
    safe_withdrawal_rate_pct: f64,
) -> Result<SustainabilityReport, EngineError> {
    if !(0.0..=100.0).contains(&success_probability) {
        return Err(EngineError::invalid_input(
            "successProbability",
            "must be between 0 and 100",
        ));
    }
    if !portfolio_value.is_finite() || portfolio_value <= 0.0 {
        return Err(EngineError::invalid_input(
            "portfolioValue",
            "must be a positive number",
        ));
    }
    if !current_withdrawal.is_finite() || current_withdrawal < 0.0 {
        return Err(EngineError::invalid_input(
            "currentWithdrawal",
            "must be a finite non-negative number",
        ));
    }
    if !safe_withdrawal_rate_pct.is_finite() || safe_withdrawal_rate_pct <= 0.0 {
        return Err(EngineError::invalid_input(
            "safeWithdrawalRatePct",
            "must be a positive percentage",
        ));
    }

    let withdrawal_rate_pct = current_withdrawal / portfolio_value * 100.0;
    let safe_withdrawal_amount = portfolio_value * safe_withdrawal_rate_pct / 100.0;
    let excess_withdrawal = (current_withdrawal - safe_withdrawal_amount).max(0.0);

    let mut recommendations = Vec::new();
    if excess_withdrawal > 0.0 {
        recommendations.push(Recommendation::ReduceWithdrawal {
            safe_withdrawal_amount,
        });
    }
    if success_probability < GOOD_THRESHOLD {
        recommendations.push(Recommendation::SupplementIncome);
    }
    if success_probability < MODERATE_THRESHOLD {
        recommendations.push(Recommendation::DelayRetirement);
    }
    if success_probability < SAFE_THRESHOLD {
        recommendations.push(Recommendation::ReviewAllocation);
    }

    Ok(SustainabilityReport {
        status: status_for(success_probability),
        success_probability,
        withdrawal_rate_pct,
        safe_withdrawal_rate_pct,
        safe_withdrawal_amount,
        excess_withdrawal,
        current_withdrawal,
        portfolio_value,
        recommendations,
    })
}

fn status_for(success_probability: f64) -> SustainabilityStatus {
    if success_probability >= SAFE_THRESHOLD {
        SustainabilityStatus::Safe
    } else if success_probability >= GOOD_THRESHOLD {
        SustainabilityStatus::Good
    } else if success_probability >= MODERATE_THRESHOLD {
        SustainabilityStatus::Moderate
    } else if success_probability >= CAUTION_THRESHOLD {
        SustainabilityStatus::Caution
    } else {
        SustainabilityStatus::Danger
    }
}
