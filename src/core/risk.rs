//! Suitability risk scoring.
//!
//! Attitude to Risk (willingness) and Capacity for Loss (ability) are scored
//! separately and combined with the regulatory lower-of rule: the final score
//! is `min(atr, cfl)`, never an average. COBS 9.2 requires a recommendation
//! to respect both willingness and ability to bear loss.

use super::error::EngineError;
use super::types::{CflInputs, InvestorPersona, RiskScore};

const MAX_ANSWER_SCORE: u8 = 10;

/// Two years of essential expenses are treated as non-investable.
const ESSENTIAL_EXPENSES_YEARS: f64 = 2.0;

/// Scale factor mapping the investable share of total assets onto the 0-10
/// score band before clamping.
const CFL_SCALE: f64 = 15.0;

pub fn score_risk_profile(atr_answers: &[u8], cfl: CflInputs) -> Result<RiskScore, EngineError> {
    let atr_score = atr_score(atr_answers)?;
    let cfl_score = cfl_score(cfl)?;

    // Lower-of rule. Regulatory requirement, not a tuning choice.
    let final_score = atr_score.min(cfl_score);

    Ok(RiskScore {
        atr_score,
        cfl_score,
        final_score,
        persona: persona_for_score(final_score),
    })
}

fn atr_score(answers: &[u8]) -> Result<u8, EngineError> {
    if answers.is_empty() {
        return Err(EngineError::invalid_input(
            "atrAnswers",
            "at least one questionnaire answer is required",
        ));
    }
    if let Some(bad) = answers.iter().find(|a| **a > MAX_ANSWER_SCORE) {
        return Err(EngineError::invalid_input(
            "atrAnswers",
            format!("answer {bad} is outside the 0-10 range"),
        ));
    }

    let sum: u32 = answers.iter().map(|a| u32::from(*a)).sum();
    let mean = f64::from(sum) / answers.len() as f64;
    Ok(mean.round() as u8)
}

fn cfl_score(cfl: CflInputs) -> Result<u8, EngineError> {
    if !cfl.total_assets.is_finite() || cfl.total_assets <= 0.0 {
        return Err(EngineError::invalid_input(
            "totalAssets",
            "must be a positive number",
        ));
    }
    for (field, value) in [
        ("essentialExpensesAnnual", cfl.essential_expenses_annual),
        ("emergencyFundRequired", cfl.emergency_fund_required),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(EngineError::invalid_input(
                field,
                "must be a finite non-negative number",
            ));
        }
    }

    let committed =
        ESSENTIAL_EXPENSES_YEARS * cfl.essential_expenses_annual + cfl.emergency_fund_required;
    let investable = (cfl.total_assets - committed).max(0.0);
    let raw = (investable / cfl.total_assets * CFL_SCALE).round();
    Ok(raw.clamp(0.0, f64::from(MAX_ANSWER_SCORE)) as u8)
}

/// Bands are inclusive on the upper bound, first match wins.
fn persona_for_score(final_score: u8) -> InvestorPersona {
    match final_score {
        0..=3 => InvestorPersona::CautiousProtector,
        4..=5 => InvestorPersona::BalancedBuilder,
        6..=7 => InvestorPersona::GrowthSeeker,
        _ => InvestorPersona::AdventurousMaximiser,
    }
}
