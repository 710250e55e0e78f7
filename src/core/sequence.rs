//! Sequence-of-returns risk analysis.
//!
//! Compares three deterministic paths that share the same mean return:
//! no crash, a crash early in retirement, and the same crash late in
//! retirement. The gap between the two crash outcomes is the cost of
//! drawing down through a bear market instead of before one.

use super::error::EngineError;
use super::projection::trace_path;
use super::types::{ProjectionInputs, SequenceRiskAnalysis};

pub fn analyze_sequence_risk(
    inputs: &ProjectionInputs,
    withdrawal_amount: f64,
    crash_magnitude_pct: f64,
    early_crash_age: u32,
    late_crash_age: u32,
) -> Result<SequenceRiskAnalysis, EngineError> {
    inputs.validate()?;
    if !withdrawal_amount.is_finite() || withdrawal_amount < 0.0 {
        return Err(EngineError::invalid_input(
            "withdrawalAmount",
            "must be a non-negative number",
        ));
    }
    if !crash_magnitude_pct.is_finite() || !(-100.0..=0.0).contains(&crash_magnitude_pct) {
        return Err(EngineError::invalid_input(
            "crashMagnitudePct",
            "must be a negative percentage between -100 and 0",
        ));
    }
    for (field, age) in [
        ("earlyCrashAge", early_crash_age),
        ("lateCrashAge", late_crash_age),
    ] {
        if age < inputs.current_age || age >= inputs.terminal_age {
            return Err(EngineError::invalid_input(
                field,
                format!(
                    "must lie within the projected horizon [{}, {})",
                    inputs.current_age, inputs.terminal_age
                ),
            ));
        }
    }

    let crash_return = crash_magnitude_pct / 100.0;
    let base_return = inputs.expected_growth_rate;

    let crash_path = |crash_age: u32| {
        trace_path(inputs, withdrawal_amount, |age| {
            if age == crash_age { crash_return } else { base_return }
        })
    };

    let no_crash = trace_path(inputs, withdrawal_amount, |_| base_return);
    let early = crash_path(early_crash_age);
    let late = crash_path(late_crash_age);

    Ok(SequenceRiskAnalysis {
        sequence_impact: late.final_balance() - early.final_balance(),
        early_depletion_year: early.depletion_year,
        late_depletion_year: late.depletion_year,
        no_crash: no_crash.yearly,
        early_crash: early.yearly,
        late_crash: late.yearly,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::YearlyBalance;

    fn final_of(path: &[YearlyBalance]) -> f64 {
        path.last().map_or(0.0, |point| point.balance)
    }

    fn retiree_inputs() -> ProjectionInputs {
        ProjectionInputs {
            current_age: 60,
            retirement_age: 65,
            current_savings: 500_000.0,
            annual_contribution: 20_000.0,
            desired_retirement_income: 30_000.0,
            expected_growth_rate: 0.05,
            terminal_age: 90,
        }
    }

    #[test]
    fn early_crash_ends_no_richer_than_late_crash() {
        let analysis = analyze_sequence_risk(&retiree_inputs(), 30_000.0, -30.0, 66, 85)
            .expect("must analyze");

        let early_final = final_of(&analysis.early_crash);
        let late_final = final_of(&analysis.late_crash);
        let clean_final = final_of(&analysis.no_crash);

        assert!(early_final <= late_final);
        assert!(late_final <= clean_final);
        assert!((analysis.sequence_impact - (late_final - early_final)).abs() < 1e-9);
        assert!(analysis.sequence_impact >= 0.0);
    }

    #[test]
    fn identical_crash_ages_give_zero_impact() {
        let analysis = analyze_sequence_risk(&retiree_inputs(), 30_000.0, -30.0, 70, 70)
            .expect("must analyze");
        assert_eq!(analysis.sequence_impact, 0.0);
        assert_eq!(analysis.early_crash, analysis.late_crash);
    }

    #[test]
    fn zero_magnitude_replaces_the_crash_year_with_a_flat_return() {
        // Magnitude 0 still overrides the crash year's return, with 0%
        // instead of the base growth rate.
        let analysis = analyze_sequence_risk(&retiree_inputs(), 30_000.0, 0.0, 66, 85)
            .expect("must analyze");
        assert!(final_of(&analysis.early_crash) < final_of(&analysis.no_crash));
        assert!(final_of(&analysis.early_crash) <= final_of(&analysis.late_crash));
    }

    #[test]
    fn all_three_paths_cover_the_full_horizon() {
        let analysis = analyze_sequence_risk(&retiree_inputs(), 30_000.0, -40.0, 66, 85)
            .expect("must analyze");
        for path in [
            &analysis.no_crash,
            &analysis.early_crash,
            &analysis.late_crash,
        ] {
            assert_eq!(path.len(), 31);
            assert_eq!(path.first().map(|p| p.year), Some(60));
            assert_eq!(path.last().map(|p| p.year), Some(90));
        }
    }

    #[test]
    fn heavy_crash_with_heavy_withdrawals_reports_depletion() {
        let inputs = ProjectionInputs {
            current_age: 64,
            retirement_age: 65,
            current_savings: 300_000.0,
            annual_contribution: 0.0,
            desired_retirement_income: 40_000.0,
            expected_growth_rate: 0.03,
            terminal_age: 95,
        };
        let analysis =
            analyze_sequence_risk(&inputs, 40_000.0, -60.0, 66, 90).expect("must analyze");

        let early = analysis.early_depletion_year.expect("early path depletes");
        assert!(early > 66);
        if let Some(late) = analysis.late_depletion_year {
            assert!(late >= early);
        }
    }

    #[test]
    fn crash_ages_outside_horizon_are_rejected() {
        let inputs = retiree_inputs();
        let before = analyze_sequence_risk(&inputs, 30_000.0, -30.0, 55, 85)
            .expect_err("must reject");
        assert_eq!(before.field(), Some("earlyCrashAge"));

        let at_terminal = analyze_sequence_risk(&inputs, 30_000.0, -30.0, 66, 90)
            .expect_err("must reject");
        assert_eq!(at_terminal.field(), Some("lateCrashAge"));
    }

    #[test]
    fn out_of_range_crash_magnitude_is_rejected() {
        for magnitude in [30.0, -130.0] {
            let err = analyze_sequence_risk(&retiree_inputs(), 30_000.0, magnitude, 66, 85)
                .expect_err("must reject");
            assert_eq!(err.field(), Some("crashMagnitudePct"));
        }
    }
}
