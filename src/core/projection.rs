//! Deterministic year-by-year cash-flow projection.
//!
//! The same accumulation/decumulation recurrence drives the stochastic
//! simulator; here the annual return is the fixed expected growth rate, so
//! identical inputs always produce the identical sequence, down to exact
//! floating-point equality.

use super::error::EngineError;
use super::types::{
    POST_RETIREMENT_GROWTH_DAMPENER, Projection, ProjectionInputs, SUSTAINABILITY_COVERAGE_RATIO,
    YearlyBalance,
};

/// Accumulation phase: grow, then contribute.
pub(crate) fn accumulate_year(balance: f64, annual_return: f64, contribution: f64) -> f64 {
    (balance * (1.0 + annual_return) + contribution).max(0.0)
}

/// Decumulation phase: dampened growth, then withdraw. Floors at zero.
pub(crate) fn decumulate_year(balance: f64, annual_return: f64, withdrawal: f64) -> f64 {
    (balance * (1.0 + annual_return * POST_RETIREMENT_GROWTH_DAMPENER) - withdrawal).max(0.0)
}

pub(crate) struct PathTrace {
    pub yearly: Vec<YearlyBalance>,
    pub depletion_year: Option<u32>,
}

impl PathTrace {
    pub fn final_balance(&self) -> f64 {
        self.yearly.last().map(|point| point.balance).unwrap_or(0.0)
    }
}

/// Walk one full path from current age to terminal age, asking
/// `return_for_year` for the annual return to apply at each age. The first
/// point is the starting balance at the current age; depletion is the first
/// post-retirement year at which the floored balance reaches zero.
pub(crate) fn trace_path(
    inputs: &ProjectionInputs,
    withdrawal_amount: f64,
    mut return_for_year: impl FnMut(u32) -> f64,
) -> PathTrace {
    let year_count = (inputs.terminal_age - inputs.current_age) as usize;
    let mut yearly = Vec::with_capacity(year_count + 1);
    let mut balance = inputs.current_savings;
    let mut depletion_year = None;

    yearly.push(YearlyBalance {
        year: inputs.current_age,
        balance,
    });

    for age in inputs.current_age..inputs.terminal_age {
        let annual_return = return_for_year(age);
        balance = if age < inputs.retirement_age {
            accumulate_year(balance, annual_return, inputs.annual_contribution)
        } else {
            decumulate_year(balance, annual_return, withdrawal_amount)
        };

        let year = age + 1;
        if age >= inputs.retirement_age && balance <= 0.0 && depletion_year.is_none() {
            depletion_year = Some(year);
        }
        yearly.push(YearlyBalance { year, balance });
    }

    PathTrace {
        yearly,
        depletion_year,
    }
}

pub fn project_cash_flow(inputs: &ProjectionInputs) -> Result<Projection, EngineError> {
    inputs.validate()?;

    let trace = trace_path(inputs, inputs.desired_retirement_income, |_age| {
        inputs.expected_growth_rate
    });

    let projected_at_retirement = trace.yearly[inputs.years_to_retirement() as usize].balance;

    // 80%-coverage heuristic, not a guarantee: the pot at retirement should
    // cover most of the total income drawn over the retirement horizon.
    let total_income_required =
        inputs.desired_retirement_income * f64::from(inputs.years_in_retirement());
    let sustainable = projected_at_retirement >= SUSTAINABILITY_COVERAGE_RATIO * total_income_required;

    Ok(Projection {
        yearly: trace.yearly,
        projected_at_retirement,
        sustainable,
        depletion_age: trace.depletion_year,
    })
}
