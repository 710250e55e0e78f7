use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::EngineError;

pub const DEFAULT_TERMINAL_AGE: u32 = 90;

/// Post-retirement growth is dampened relative to accumulation to reflect a
/// more conservative allocation. Fixed policy choice, not a market model.
pub const POST_RETIREMENT_GROWTH_DAMPENER: f64 = 0.6;

/// Projected pot at retirement must cover this share of total desired
/// retirement income for the plan to be labelled sustainable.
pub const SUSTAINABILITY_COVERAGE_RATIO: f64 = 0.8;

pub const DEFAULT_SAFE_WITHDRAWAL_RATE_PCT: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_savings: f64,
    pub annual_contribution: f64,
    pub desired_retirement_income: f64,
    pub expected_growth_rate: f64,
    pub terminal_age: u32,
}

impl ProjectionInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.retirement_age <= self.current_age {
            return Err(EngineError::invalid_input(
                "retirementAge",
                "retirementAge must be greater than currentAge",
            ));
        }
        if self.terminal_age <= self.retirement_age {
            return Err(EngineError::invalid_input(
                "terminalAge",
                "terminalAge must be greater than retirementAge",
            ));
        }
        for (field, value) in [
            ("currentSavings", self.current_savings),
            ("annualContribution", self.annual_contribution),
            ("desiredRetirementIncome", self.desired_retirement_income),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_input(
                    field,
                    "must be a finite non-negative number",
                ));
            }
        }
        if !self.expected_growth_rate.is_finite() || self.expected_growth_rate <= -1.0 {
            return Err(EngineError::invalid_input(
                "expectedGrowthRate",
                "must be a finite rate greater than -100%",
            ));
        }
        Ok(())
    }

    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age - self.current_age
    }

    pub fn years_in_retirement(&self) -> u32 {
        self.terminal_age - self.retirement_age
    }
}

/// Portfolio split in whole percentage points; must sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMix {
    pub equities: f64,
    pub bonds: f64,
    pub cash: f64,
}

/// Fixed per-asset-class return assumptions (annual mean, annual volatility).
const EQUITY_ASSUMPTION: (f64, f64) = (0.080, 0.160);
const BOND_ASSUMPTION: (f64, f64) = (0.040, 0.065);
const CASH_ASSUMPTION: (f64, f64) = (0.015, 0.005);

impl AssetMix {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("assetMix.equities", self.equities),
            ("assetMix.bonds", self.bonds),
            ("assetMix.cash", self.cash),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::invalid_input(
                    field,
                    "must be a non-negative percentage",
                ));
            }
        }
        let total = self.equities + self.bonds + self.cash;
        if (total - 100.0).abs() > 0.01 {
            return Err(EngineError::invalid_input(
                "assetMix",
                format!("weights must sum to 100, got {total}"),
            ));
        }
        Ok(())
    }

    /// Blended mean return implied by the mix.
    pub fn derived_expected_return(&self) -> f64 {
        (self.equities * EQUITY_ASSUMPTION.0
            + self.bonds * BOND_ASSUMPTION.0
            + self.cash * CASH_ASSUMPTION.0)
            / 100.0
    }

    /// Blended volatility implied by the mix; higher equity weight means a
    /// higher mean and higher variance.
    pub fn derived_volatility(&self) -> f64 {
        (self.equities * EQUITY_ASSUMPTION.1
            + self.bonds * BOND_ASSUMPTION.1
            + self.cash * CASH_ASSUMPTION.1)
            / 100.0
    }
}

/// One year of a deterministic projection. `year` is an absolute age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyBalance {
    pub year: u32,
    pub balance: f64,
}

/// One year of a stochastic projection: percentile band across all runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyBand {
    pub year: u32,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub yearly: Vec<YearlyBalance>,
    pub projected_at_retirement: f64,
    pub sustainable: bool,
    pub depletion_age: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationInputs {
    #[serde(flatten)]
    pub projection: ProjectionInputs,
    pub withdrawal_amount: f64,
    pub expected_return: f64,
    pub volatility: f64,
    pub simulation_count: u32,
    pub asset_mix: AssetMix,
}

impl SimulationInputs {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.projection.validate()?;
        self.asset_mix.validate()?;
        if self.simulation_count == 0 {
            return Err(EngineError::invalid_input(
                "simulationCount",
                "must be greater than 0",
            ));
        }
        if !self.withdrawal_amount.is_finite() || self.withdrawal_amount < 0.0 {
            return Err(EngineError::invalid_input(
                "withdrawalAmount",
                "must be a finite non-negative number",
            ));
        }
        if !self.expected_return.is_finite() || self.expected_return <= -1.0 {
            return Err(EngineError::invalid_input(
                "expectedReturn",
                "must be a finite rate greater than -100%",
            ));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(EngineError::invalid_input(
                "volatility",
                "must be a finite non-negative rate",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    /// Share of runs ending with a positive balance, in percent [0, 100].
    pub success_probability: f64,
    pub median_final_wealth: f64,
    pub p10_final_wealth: f64,
    pub p90_final_wealth: f64,
    /// Median across runs of each run's worst peak-to-trough decline, in
    /// percent [0, 100].
    pub max_drawdown: f64,
    /// Mean drawn annual return across all run-years.
    pub average_return: f64,
    /// Raw final balances, one per run, in run order. Binning is the
    /// consumer's concern.
    pub final_wealth_samples: Vec<f64>,
}

/// A completed simulation. Immutable once computed. `results` and `yearly`
/// are byte-for-byte reproducible for a fixed seed; the id and run date are
/// metadata and are not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub id: Uuid,
    pub label: String,
    pub run_date: DateTime<Utc>,
    pub inputs: SimulationInputs,
    pub results: SimulationResults,
    pub yearly: Vec<YearlyBand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CflInputs {
    pub total_assets: f64,
    pub essential_expenses_annual: f64,
    pub emergency_fund_required: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvestorPersona {
    #[serde(rename = "Cautious Protector")]
    CautiousProtector,
    #[serde(rename = "Balanced Builder")]
    BalancedBuilder,
    #[serde(rename = "Growth Seeker")]
    GrowthSeeker,
    #[serde(rename = "Adventurous Maximiser")]
    AdventurousMaximiser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub atr_score: u8,
    pub cfl_score: u8,
    /// min(atrScore, cflScore), per the regulatory lower-of rule.
    pub final_score: u8,
    pub persona: InvestorPersona,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRiskAnalysis {
    pub no_crash: Vec<YearlyBalance>,
    pub early_crash: Vec<YearlyBalance>,
    pub late_crash: Vec<YearlyBalance>,
    pub early_depletion_year: Option<u32>,
    pub late_depletion_year: Option<u32>,
    /// lateCrashFinal − earlyCrashFinal: the extra loss attributable purely
    /// to the shock's timing, holding its magnitude constant.
    pub sequence_impact: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SustainabilityStatus {
    Safe,
    Good,
    Moderate,
    Caution,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Recommendation {
    #[serde(rename_all = "camelCase")]
    ReduceWithdrawal { safe_withdrawal_amount: f64 },
    SupplementIncome,
    DelayRetirement,
    ReviewAllocation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SustainabilityReport {
    pub status: SustainabilityStatus,
    pub success_probability: f64,
    pub withdrawal_rate_pct: f64,
    pub safe_withdrawal_rate_pct: f64,
    pub safe_withdrawal_amount: f64,
    pub excess_withdrawal: f64,
    pub current_withdrawal: f64,
    pub portfolio_value: f64,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultMetric {
    SuccessProbability,
    MedianFinalWealth,
    P10FinalWealth,
    P90FinalWealth,
    MaxDrawdown,
    AverageReturn,
}

impl ResultMetric {
    pub const ALL: [ResultMetric; 6] = [
        ResultMetric::SuccessProbability,
        ResultMetric::MedianFinalWealth,
        ResultMetric::P10FinalWealth,
        ResultMetric::P90FinalWealth,
        ResultMetric::MaxDrawdown,
        ResultMetric::AverageReturn,
    ];

    pub fn lower_is_better(self) -> bool {
        matches!(self, ResultMetric::MaxDrawdown)
    }

    pub fn extract(self, results: &SimulationResults) -> f64 {
        match self {
            ResultMetric::SuccessProbability => results.success_probability,
            ResultMetric::MedianFinalWealth => results.median_final_wealth,
            ResultMetric::P10FinalWealth => results.p10_final_wealth,
            ResultMetric::P90FinalWealth => results.p90_final_wealth,
            ResultMetric::MaxDrawdown => results.max_drawdown,
            ResultMetric::AverageReturn => results.average_return,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    pub metric: ResultMetric,
    /// candidate.metric − baseline.metric, exactly.
    pub delta: f64,
    pub lower_is_better: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDelta {
    pub run_id: Uuid,
    pub label: String,
    pub metrics: Vec<MetricDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedInputValue {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedInput {
    pub field: String,
    pub values: Vec<ChangedInputValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub deltas: Vec<ScenarioDelta>,
    pub winner: SimulationRun,
    pub changed_inputs: Vec<ChangedInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LongevityPoint {
    pub target_age: u32,
    pub years_from_now: u32,
    pub success_probability: f64,
    pub median_wealth: f64,
    pub p10_wealth: f64,
}
