//! Stochastic retirement simulation.
//!
//! Runs N independent paths of the §projection recurrence with normally
//! distributed annual returns, then reduces the completed paths into
//! per-year percentile bands, a success probability, and a final-wealth
//! distribution. Each path owns a private ChaCha8 stream derived from the
//! base seed, so a fixed seed reproduces the whole run exactly regardless of
//! how the paths are scheduled across worker threads.

use chrono::Utc;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use uuid::Uuid;

use super::cancel::CancelToken;
use super::error::EngineError;
use super::projection::trace_path;
use super::types::{
    LongevityPoint, SimulationInputs, SimulationResults, SimulationRun, YearlyBand,
};

/// Drawn annual returns are clamped to a sane band; a single draw below
/// -100% would otherwise wipe a path on numerical noise alone.
const MIN_DRAWN_RETURN: f64 = -0.95;
const MAX_DRAWN_RETURN: f64 = 2.5;

pub fn run_simulation(
    inputs: &SimulationInputs,
    label: impl Into<String>,
    seed: Option<u64>,
    cancel: &CancelToken,
) -> Result<SimulationRun, EngineError> {
    inputs.validate()?;

    let base_seed = seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    let (results, yearly) = simulate_paths(inputs, base_seed, cancel)?;

    Ok(SimulationRun {
        id: Uuid::new_v4(),
        label: label.into(),
        run_date: Utc::now(),
        inputs: inputs.clone(),
        results,
        yearly,
    })
}

/// Sweep candidate terminal ages, re-running the simulation to each target.
/// The base seed is salted with the target age so every target gets its own
/// independent (but still reproducible) draw sequence.
pub fn longevity_scan(
    inputs: &SimulationInputs,
    target_ages: &[u32],
    seed: Option<u64>,
    cancel: &CancelToken,
) -> Result<Vec<LongevityPoint>, EngineError> {
    inputs.validate()?;
    for target in target_ages {
        if *target <= inputs.projection.retirement_age {
            return Err(EngineError::invalid_input(
                "targetAges",
                format!(
                    "target age {target} must be greater than retirementAge {}",
                    inputs.projection.retirement_age
                ),
            ));
        }
    }

    let base_seed = seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    let mut points = Vec::with_capacity(target_ages.len());
    for target in target_ages {
        let mut candidate = inputs.clone();
        candidate.projection.terminal_age = *target;
        let (results, _) = simulate_paths(&candidate, salt_seed(base_seed, *target), cancel)?;
        points.push(LongevityPoint {
            target_age: *target,
            years_from_now: target - inputs.projection.current_age,
            success_probability: results.success_probability,
            median_wealth: results.median_final_wealth,
            p10_wealth: results.p10_final_wealth,
        });
    }
    Ok(points)
}

struct PathOutcome {
    balances: Vec<f64>,
    max_drawdown_pct: f64,
    return_sum: f64,
}

fn simulate_paths(
    inputs: &SimulationInputs,
    base_seed: u64,
    cancel: &CancelToken,
) -> Result<(SimulationResults, Vec<YearlyBand>), EngineError> {
    let projection = &inputs.projection;
    let year_count = (projection.terminal_age - projection.current_age) as usize;
    let run_count = inputs.simulation_count as usize;

    let return_dist = Normal::new(inputs.expected_return, inputs.volatility)
        .map_err(|e| EngineError::invalid_input("volatility", e.to_string()))?;

    let outcomes = (0..inputs.simulation_count)
        .into_par_iter()
        .map(|run_id| -> Result<PathOutcome, EngineError> {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut rng = ChaCha8Rng::seed_from_u64(derive_run_seed(base_seed, run_id));
            let mut return_sum = 0.0;
            let trace = trace_path(projection, inputs.withdrawal_amount, |_age| {
                let drawn = return_dist
                    .sample(&mut rng)
                    .clamp(MIN_DRAWN_RETURN, MAX_DRAWN_RETURN);
                return_sum += drawn;
                drawn
            });

            let balances: Vec<f64> = trace.yearly.iter().map(|point| point.balance).collect();
            Ok(PathOutcome {
                max_drawdown_pct: max_drawdown_pct(&balances),
                balances,
                return_sum,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Pure reduction over completed paths; everything below is sequential
    // and deterministic in run order.
    let mut per_year: Vec<Vec<f64>> = (0..=year_count)
        .map(|_| Vec::with_capacity(run_count))
        .collect();
    let mut finals = Vec::with_capacity(run_count);
    let mut drawdowns = Vec::with_capacity(run_count);
    let mut successes = 0_u32;
    let mut return_total = 0.0;

    for outcome in &outcomes {
        for (year_index, balance) in outcome.balances.iter().enumerate() {
            per_year[year_index].push(*balance);
        }
        let final_balance = *outcome.balances.last().unwrap_or(&0.0);
        if final_balance > 0.0 {
            successes += 1;
        }
        finals.push(final_balance);
        drawdowns.push(outcome.max_drawdown_pct);
        return_total += outcome.return_sum;
    }

    let yearly = per_year
        .iter_mut()
        .enumerate()
        .map(|(year_index, balances)| YearlyBand {
            year: projection.current_age + year_index as u32,
            p10: percentile(balances, 10.0),
            p25: percentile(balances, 25.0),
            p50: percentile(balances, 50.0),
            p75: percentile(balances, 75.0),
            p90: percentile(balances, 90.0),
        })
        .collect();

    let mut sorted_finals = finals.clone();
    let results = SimulationResults {
        success_probability: f64::from(successes) / run_count as f64 * 100.0,
        median_final_wealth: percentile(&mut sorted_finals, 50.0),
        p10_final_wealth: percentile(&mut sorted_finals, 10.0),
        p90_final_wealth: percentile(&mut sorted_finals, 90.0),
        max_drawdown: percentile(&mut drawdowns, 50.0),
        average_return: return_total / (run_count as f64 * year_count as f64),
        final_wealth_samples: finals,
    };

    Ok((results, yearly))
}

/// Worst peak-to-trough decline along one path, in percent of the peak.
fn max_drawdown_pct(balances: &[f64]) -> f64 {
    let mut peak = 0.0_f64;
    let mut worst = 0.0_f64;
    for balance in balances {
        peak = peak.max(*balance);
        if peak > 0.0 {
            worst = worst.max((peak - balance) / peak);
        }
    }
    worst * 100.0
}

fn derive_run_seed(base_seed: u64, run_id: u32) -> u64 {
    splitmix64(base_seed ^ u64::from(run_id))
}

fn salt_seed(base_seed: u64, age: u32) -> u64 {
    splitmix64(base_seed ^ (u64::from(age) << 32))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Order-statistic percentile with linear interpolation. Sorts in place.
pub(crate) fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::project_cash_flow;
    use crate::core::types::{AssetMix, ProjectionInputs};
    use proptest::prelude::{prop_assert, proptest};

    fn sample_inputs() -> SimulationInputs {
        SimulationInputs {
            projection: ProjectionInputs {
                current_age: 45,
                retirement_age: 65,
                current_savings: 250_000.0,
                annual_contribution: 15_000.0,
                desired_retirement_income: 35_000.0,
                expected_growth_rate: 0.05,
                terminal_age: 90,
            },
            withdrawal_amount: 35_000.0,
            expected_return: 0.05,
            volatility: 0.12,
            simulation_count: 300,
            asset_mix: AssetMix {
                equities: 60.0,
                bonds: 30.0,
                cash: 10.0,
            },
        }
    }

    fn assert_band_ordered(band: &YearlyBand) {
        assert!(band.p10 <= band.p25, "year {}", band.year);
        assert!(band.p25 <= band.p50, "year {}", band.year);
        assert!(band.p50 <= band.p75, "year {}", band.year);
        assert!(band.p75 <= band.p90, "year {}", band.year);
    }

    #[test]
    fn fixed_seed_reproduces_results_and_bands_exactly() {
        let inputs = sample_inputs();
        let token = CancelToken::new();
        let first = run_simulation(&inputs, "baseline", Some(42), &token).expect("must run");
        let second = run_simulation(&inputs, "baseline", Some(42), &token).expect("must run");

        assert_eq!(first.results, second.results);
        assert_eq!(first.yearly, second.yearly);
    }

    #[test]
    fn fan_chart_covers_every_year_and_bands_are_ordered() {
        let inputs = sample_inputs();
        let run = run_simulation(&inputs, "fan", Some(7), &CancelToken::new()).expect("must run");

        assert_eq!(run.yearly.len(), 46);
        assert_eq!(run.yearly.first().map(|b| b.year), Some(45));
        assert_eq!(run.yearly.last().map(|b| b.year), Some(90));
        for band in &run.yearly {
            assert_band_ordered(band);
        }
    }

    #[test]
    fn single_run_produces_degenerate_bands() {
        let mut inputs = sample_inputs();
        inputs.simulation_count = 1;
        let run = run_simulation(&inputs, "single", Some(3), &CancelToken::new()).expect("must run");

        assert_eq!(run.results.final_wealth_samples.len(), 1);
        for band in &run.yearly {
            assert_eq!(band.p10, band.p50);
            assert_eq!(band.p50, band.p90);
        }
        let probability = run.results.success_probability;
        assert!(probability == 0.0 || probability == 100.0);
    }

    #[test]
    fn zero_volatility_degenerates_to_deterministic_projection() {
        let mut inputs = sample_inputs();
        inputs.volatility = 0.0;
        inputs.simulation_count = 5;
        let run = run_simulation(&inputs, "flat", Some(9), &CancelToken::new()).expect("must run");
        let deterministic = project_cash_flow(&inputs.projection).expect("valid inputs");

        for (band, point) in run.yearly.iter().zip(deterministic.yearly.iter()) {
            assert_eq!(band.year, point.year);
            assert!((band.p50 - point.balance).abs() < 1e-9);
            assert!((band.p10 - point.balance).abs() < 1e-9);
            assert!((band.p90 - point.balance).abs() < 1e-9);
        }
    }

    #[test]
    fn higher_withdrawal_never_improves_success_probability() {
        let mut inputs = sample_inputs();
        inputs.simulation_count = 400;
        let token = CancelToken::new();

        let mut previous = 101.0;
        for withdrawal in [20_000.0, 40_000.0, 60_000.0, 90_000.0] {
            inputs.withdrawal_amount = withdrawal;
            let run = run_simulation(&inputs, "sweep", Some(42), &token).expect("must run");
            assert!(
                run.results.success_probability <= previous,
                "withdrawal {withdrawal} raised success probability"
            );
            previous = run.results.success_probability;
        }
    }

    #[test]
    fn cancelled_token_fails_cleanly_without_partial_results() {
        let token = CancelToken::new();
        token.cancel();
        let err = run_simulation(&sample_inputs(), "cancelled", Some(1), &token)
            .expect_err("must cancel");
        assert_eq!(err, EngineError::Cancelled);
    }

    #[test]
    fn zero_simulation_count_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.simulation_count = 0;
        let err =
            run_simulation(&inputs, "none", Some(1), &CancelToken::new()).expect_err("must reject");
        assert_eq!(err.field(), Some("simulationCount"));
    }

    #[test]
    fn mismatched_asset_mix_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.asset_mix.cash = 25.0;
        let err =
            run_simulation(&inputs, "mix", Some(1), &CancelToken::new()).expect_err("must reject");
        assert_eq!(err.field(), Some("assetMix"));
    }

    #[test]
    fn longevity_scan_reports_each_target_age() {
        let mut inputs = sample_inputs();
        inputs.simulation_count = 100;
        let targets = [70, 80, 90, 100];
        let points = longevity_scan(&inputs, &targets, Some(42), &CancelToken::new())
            .expect("must scan");

        assert_eq!(points.len(), targets.len());
        for (point, target) in points.iter().zip(targets.iter()) {
            assert_eq!(point.target_age, *target);
            assert_eq!(point.years_from_now, target - 45);
            assert!((0.0..=100.0).contains(&point.success_probability));
            assert!(point.p10_wealth <= point.median_wealth + 1e-9);
        }
    }

    #[test]
    fn longevity_scan_rejects_targets_at_or_before_retirement() {
        let inputs = sample_inputs();
        let err = longevity_scan(&inputs, &[65], Some(1), &CancelToken::new())
            .expect_err("must reject");
        assert_eq!(err.field(), Some("targetAges"));
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let mut values = vec![40.0, 10.0, 20.0, 30.0];
        assert_eq!(percentile(&mut values, 0.0), 10.0);
        assert_eq!(percentile(&mut values, 100.0), 40.0);
        assert_eq!(percentile(&mut values, 50.0), 25.0);
        assert_eq!(percentile(&mut values, 25.0), 17.5);
    }

    #[test]
    fn max_drawdown_tracks_worst_peak_to_trough() {
        let balances = [100.0, 120.0, 60.0, 90.0, 30.0];
        // Worst decline is 120 -> 30 = 75%.
        assert!((max_drawdown_pct(&balances) - 75.0).abs() < 1e-9);
        assert_eq!(max_drawdown_pct(&[0.0, 0.0]), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(16))]

        #[test]
        fn prop_success_probability_and_bands_stay_valid(
            seed in proptest::prelude::any::<u64>(),
            current_age in 30u32..55,
            to_retirement in 1u32..15,
            in_retirement in 2u32..25,
            savings in 0u32..800_000,
            contribution in 0u32..40_000,
            withdrawal in 0u32..80_000,
            vol_bp in 0u32..3_000,
            mean_bp in -300i32..1_200,
            runs in 1u32..60
        ) {
            let inputs = SimulationInputs {
                projection: ProjectionInputs {
                    current_age,
                    retirement_age: current_age + to_retirement,
                    current_savings: savings as f64,
                    annual_contribution: contribution as f64,
                    desired_retirement_income: withdrawal as f64,
                    expected_growth_rate: mean_bp as f64 / 10_000.0,
                    terminal_age: current_age + to_retirement + in_retirement,
                },
                withdrawal_amount: withdrawal as f64,
                expected_return: mean_bp as f64 / 10_000.0,
                volatility: vol_bp as f64 / 10_000.0,
                simulation_count: runs,
                asset_mix: AssetMix { equities: 60.0, bonds: 30.0, cash: 10.0 },
            };

            let run = run_simulation(&inputs, "prop", Some(seed), &CancelToken::new())
                .expect("must run");

            prop_assert!((0.0..=100.0).contains(&run.results.success_probability));
            prop_assert!((0.0..=100.0).contains(&run.results.max_drawdown));
            prop_assert!(run.results.final_wealth_samples.len() == runs as usize);
            for band in &run.yearly {
                prop_assert!(band.p10 <= band.p25 + 1e-9);
                prop_assert!(band.p25 <= band.p50 + 1e-9);
                prop_assert!(band.p50 <= band.p75 + 1e-9);
                prop_assert!(band.p75 <= band.p90 + 1e-9);
                prop_assert!(band.p10 >= 0.0);
            }
        }
    }
}
