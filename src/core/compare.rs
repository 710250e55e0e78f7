//! Side-by-side scenario comparison.
//!
//! Takes a set of completed simulation runs, diffs every candidate against a
//! chosen baseline metric by metric, picks a winner, and lists which inputs
//! actually differ so a reader can see what drove the gap.

use super::error::EngineError;
use super::types::{
    ChangedInput, ChangedInputValue, MetricDelta, ResultMetric, ScenarioComparison, ScenarioDelta,
    SimulationInputs, SimulationRun,
};

pub fn compare_scenarios(
    runs: &[SimulationRun],
    baseline_index: usize,
) -> Result<ScenarioComparison, EngineError> {
    if runs.len() < 2 {
        return Err(EngineError::InsufficientData { got: runs.len() });
    }
    if baseline_index >= runs.len() {
        return Err(EngineError::invalid_input(
            "baselineIndex",
            format!("index {baseline_index} out of range for {} runs", runs.len()),
        ));
    }

    let baseline = &runs[baseline_index];

    let deltas = runs
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != baseline_index)
        .map(|(_, candidate)| ScenarioDelta {
            run_id: candidate.id,
            label: candidate.label.clone(),
            metrics: ResultMetric::ALL
                .iter()
                .map(|metric| MetricDelta {
                    metric: *metric,
                    delta: metric.extract(&candidate.results)
                        - metric.extract(&baseline.results),
                    lower_is_better: metric.lower_is_better(),
                })
                .collect(),
        })
        .collect();

    // Highest success probability wins; on a tie, the earliest run in the
    // input order.
    let mut winner = &runs[0];
    for run in &runs[1..] {
        if run.results.success_probability > winner.results.success_probability {
            winner = run;
        }
    }

    Ok(ScenarioComparison {
        deltas,
        winner: winner.clone(),
        changed_inputs: changed_inputs(runs),
    })
}

/// Input fields whose values are not identical across all runs, with each
/// run's value rendered for display.
fn changed_inputs(runs: &[SimulationRun]) -> Vec<ChangedInput> {
    type Render = fn(&SimulationInputs) -> String;
    let fields: [(&str, Render); 12] = [
        ("currentAge", |i| i.projection.current_age.to_string()),
        ("retirementAge", |i| i.projection.retirement_age.to_string()),
        ("terminalAge", |i| i.projection.terminal_age.to_string()),
        ("currentSavings", |i| money(i.projection.current_savings)),
        ("annualContribution", |i| {
            money(i.projection.annual_contribution)
        }),
        ("desiredRetirementIncome", |i| {
            money(i.projection.desired_retirement_income)
        }),
        ("withdrawalAmount", |i| money(i.withdrawal_amount)),
        ("expectedGrowthRate", |i| {
            rate(i.projection.expected_growth_rate)
        }),
        ("expectedReturn", |i| rate(i.expected_return)),
        ("volatility", |i| rate(i.volatility)),
        ("simulationCount", |i| i.simulation_count.to_string()),
        ("assetMix", |i| {
            format!(
                "{:.0}/{:.0}/{:.0}",
                i.asset_mix.equities, i.asset_mix.bonds, i.asset_mix.cash
            )
        }),
    ];

    fields
        .iter()
        .filter_map(|(field, render)| {
            let values: Vec<ChangedInputValue> = runs
                .iter()
                .map(|run| ChangedInputValue {
                    label: run.label.clone(),
                    value: render(&run.inputs),
                })
                .collect();
            let all_same = values.iter().all(|v| v.value == values[0].value);
            if all_same {
                None
            } else {
                Some(ChangedInput {
                    field: (*field).to_string(),
                    values,
                })
            }
        })
        .collect()
}

fn money(value: f64) -> String {
    format!("£{value:.0}")
}

fn rate(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancelToken;
    use crate::core::monte_carlo::run_simulation;
    use crate::core::types::{AssetMix, ProjectionInputs};

    fn simulate(label: &str, withdrawal: f64, seed: u64) -> SimulationRun {
        let inputs = SimulationInputs {
            projection: ProjectionInputs {
                current_age: 50,
                retirement_age: 65,
                current_savings: 400_000.0,
                annual_contribution: 12_000.0,
                desired_retirement_income: withdrawal,
                expected_growth_rate: 0.05,
                terminal_age: 90,
            },
            withdrawal_amount: withdrawal,
            expected_return: 0.05,
            volatility: 0.12,
            simulation_count: 200,
            asset_mix: AssetMix {
                equities: 60.0,
                bonds: 30.0,
                cash: 10.0,
            },
        };
        run_simulation(&inputs, label, Some(seed), &CancelToken::new()).expect("must run")
    }

    #[test]
    fn fewer_than_two_runs_is_insufficient() {
        let single = vec![simulate("only", 30_000.0, 1)];
        assert_eq!(
            compare_scenarios(&[], 0).expect_err("must reject"),
            EngineError::InsufficientData { got: 0 }
        );
        assert_eq!(
            compare_scenarios(&single, 0).expect_err("must reject"),
            EngineError::InsufficientData { got: 1 }
        );
    }

    #[test]
    fn out_of_range_baseline_is_rejected() {
        let runs = vec![simulate("a", 30_000.0, 1), simulate("b", 40_000.0, 2)];
        let err = compare_scenarios(&runs, 2).expect_err("must reject");
        assert_eq!(err.field(), Some("baselineIndex"));
    }

    #[test]
    fn deltas_cover_every_metric_for_every_candidate() {
        let runs = vec![
            simulate("baseline", 30_000.0, 1),
            simulate("spend more", 45_000.0, 2),
            simulate("spend less", 20_000.0, 3),
        ];
        let comparison = compare_scenarios(&runs, 0).expect("must compare");

        assert_eq!(comparison.deltas.len(), 2);
        for delta in &comparison.deltas {
            assert_eq!(delta.metrics.len(), ResultMetric::ALL.len());
        }

        let candidate = &comparison.deltas[0];
        assert_eq!(candidate.label, "spend more");
        let success_delta = candidate
            .metrics
            .iter()
            .find(|m| m.metric == ResultMetric::SuccessProbability)
            .expect("success metric present");
        let expected =
            runs[1].results.success_probability - runs[0].results.success_probability;
        assert!((success_delta.delta - expected).abs() < 1e-12);
        assert!(!success_delta.lower_is_better);

        let drawdown_delta = candidate
            .metrics
            .iter()
            .find(|m| m.metric == ResultMetric::MaxDrawdown)
            .expect("drawdown metric present");
        assert!(drawdown_delta.lower_is_better);
    }

    #[test]
    fn winner_has_the_highest_success_probability() {
        let runs = vec![
            simulate("heavy spender", 60_000.0, 1),
            simulate("frugal", 15_000.0, 2),
        ];
        let comparison = compare_scenarios(&runs, 0).expect("must compare");

        let best = runs
            .iter()
            .map(|r| r.results.success_probability)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(comparison.winner.results.success_probability, best);
    }

    #[test]
    fn tied_winner_falls_back_to_first_run_in_order() {
        let mut first = simulate("first", 30_000.0, 1);
        let mut second = simulate("second", 30_000.0, 2);
        first.results.success_probability = 90.0;
        second.results.success_probability = 90.0;

        let comparison = compare_scenarios(&[first.clone(), second], 0).expect("must compare");
        assert_eq!(comparison.winner.id, first.id);
    }

    #[test]
    fn only_differing_inputs_are_reported() {
        let runs = vec![
            simulate("baseline", 30_000.0, 1),
            simulate("spend more", 45_000.0, 2),
        ];
        let comparison = compare_scenarios(&runs, 0).expect("must compare");

        let fields: Vec<&str> = comparison
            .changed_inputs
            .iter()
            .map(|c| c.field.as_str())
            .collect();
        assert_eq!(fields, vec!["desiredRetirementIncome", "withdrawalAmount"]);

        let withdrawal = comparison
            .changed_inputs
            .iter()
            .find(|c| c.field == "withdrawalAmount")
            .expect("changed field present");
        assert_eq!(withdrawal.values.len(), 2);
        assert_eq!(withdrawal.values[0].label, "baseline");
        assert_eq!(withdrawal.values[0].value, "£30000");
        assert_eq!(withdrawal.values[1].value, "£45000");
    }
}
