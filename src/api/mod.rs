use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::core::{
    AssetMix, CancelToken, CflInputs, EngineError, SimulationInputs, SimulationRun,
    analyze_sequence_risk, compare_scenarios, evaluate_sustainability, longevity_scan,
    project_cash_flow, run_simulation, score_risk_profile,
};
use crate::core::types::{DEFAULT_SAFE_WITHDRAWAL_RATE_PCT, DEFAULT_TERMINAL_AGE};

/// Hard ceiling on any single blocking engine call. A request that is still
/// running after this trips the cancel token and reports a timeout.
const ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_LONGEVITY_TARGETS: [u32; 5] = [80, 85, 90, 95, 100];

/// Baseline plan parameters. Rates are in percent here and converted to
/// fractional rates when the engine inputs are built.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "plannetic",
    about = "Retirement cash-flow projection, Monte Carlo simulation, and suitability risk scoring"
)]
struct Cli {
    #[arg(long, default_value_t = 45)]
    current_age: u32,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = DEFAULT_TERMINAL_AGE, help = "Age to fund through")]
    terminal_age: u32,
    #[arg(long, default_value_t = 250_000.0)]
    current_savings: f64,
    #[arg(long, default_value_t = 15_000.0)]
    annual_contribution: f64,
    #[arg(long, default_value_t = 35_000.0)]
    desired_retirement_income: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Expected annual growth for the deterministic projection, in percent"
    )]
    growth_rate: f64,
    #[arg(long, help = "Annual withdrawal in retirement; defaults to desired income")]
    withdrawal_amount: Option<f64>,
    #[arg(
        long,
        help = "Simulated mean annual return in percent; defaults to the asset mix blend"
    )]
    expected_return: Option<f64>,
    #[arg(
        long,
        help = "Simulated annual return volatility in percent; defaults to the asset mix blend"
    )]
    volatility: Option<f64>,
    #[arg(long, default_value_t = 60.0, help = "Equity weight in percent")]
    equities: f64,
    #[arg(long, default_value_t = 30.0, help = "Bond weight in percent")]
    bonds: f64,
    #[arg(long, default_value_t = 10.0, help = "Cash weight in percent")]
    cash: f64,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(long, help = "Fixed seed for reproducible simulations")]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    terminal_age: Option<u32>,
    current_savings: Option<f64>,
    annual_contribution: Option<f64>,
    desired_retirement_income: Option<f64>,
    growth_rate: Option<f64>,
    withdrawal_amount: Option<f64>,
    expected_return: Option<f64>,
    volatility: Option<f64>,
    equities: Option<f64>,
    bonds: Option<f64>,
    cash: Option<f64>,
    simulations: Option<u32>,
    seed: Option<u64>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskScorePayload {
    atr_answers: Vec<u8>,
    total_assets: f64,
    essential_expenses_annual: f64,
    emergency_fund_required: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SequenceRiskPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    terminal_age: Option<u32>,
    current_savings: Option<f64>,
    annual_contribution: Option<f64>,
    desired_retirement_income: Option<f64>,
    growth_rate: Option<f64>,
    withdrawal_amount: Option<f64>,
    crash_magnitude_pct: Option<f64>,
    early_crash_age: Option<u32>,
    late_crash_age: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SustainabilityPayload {
    #[serde(flatten)]
    simulate: SimulatePayload,
    safe_withdrawal_rate_pct: Option<f64>,
    portfolio_value: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LongevityPayload {
    #[serde(flatten)]
    simulate: SimulatePayload,
    target_ages: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComparePayload {
    scenarios: Vec<SimulatePayload>,
    #[serde(default)]
    baseline_index: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 45,
        retirement_age: 65,
        terminal_age: DEFAULT_TERMINAL_AGE,
        current_savings: 250_000.0,
        annual_contribution: 15_000.0,
        desired_retirement_income: 35_000.0,
        growth_rate: 5.0,
        withdrawal_amount: None,
        expected_return: None,
        volatility: None,
        equities: 60.0,
        bonds: 30.0,
        cash: 10.0,
        simulations: 1_000,
        seed: None,
    }
}

fn apply_simulate_payload(cli: &mut Cli, payload: &SimulatePayload) {
    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.terminal_age {
        cli.terminal_age = v;
    }
    if let Some(v) = payload.current_savings {
        cli.current_savings = v;
    }
    if let Some(v) = payload.annual_contribution {
        cli.annual_contribution = v;
    }
    if let Some(v) = payload.desired_retirement_income {
        cli.desired_retirement_income = v;
    }
    if let Some(v) = payload.growth_rate {
        cli.growth_rate = v;
    }
    if let Some(v) = payload.withdrawal_amount {
        cli.withdrawal_amount = Some(v);
    }
    if let Some(v) = payload.expected_return {
        cli.expected_return = Some(v);
    }
    if let Some(v) = payload.volatility {
        cli.volatility = Some(v);
    }
    if let Some(v) = payload.equities {
        cli.equities = v;
    }
    if let Some(v) = payload.bonds {
        cli.bonds = v;
    }
    if let Some(v) = payload.cash {
        cli.cash = v;
    }
    if let Some(v) = payload.simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = Some(v);
    }
}

/// Percent-unit CLI values become fractional engine rates here; missing
/// return assumptions fall back to the blend implied by the asset mix.
fn build_simulation_inputs(cli: &Cli) -> SimulationInputs {
    let asset_mix = AssetMix {
        equities: cli.equities,
        bonds: cli.bonds,
        cash: cli.cash,
    };
    SimulationInputs {
        projection: crate::core::ProjectionInputs {
            current_age: cli.current_age,
            retirement_age: cli.retirement_age,
            current_savings: cli.current_savings,
            annual_contribution: cli.annual_contribution,
            desired_retirement_income: cli.desired_retirement_income,
            expected_growth_rate: cli.growth_rate / 100.0,
            terminal_age: cli.terminal_age,
        },
        withdrawal_amount: cli
            .withdrawal_amount
            .unwrap_or(cli.desired_retirement_income),
        expected_return: cli
            .expected_return
            .map(|v| v / 100.0)
            .unwrap_or_else(|| asset_mix.derived_expected_return()),
        volatility: cli
            .volatility
            .map(|v| v / 100.0)
            .unwrap_or_else(|| asset_mix.derived_volatility()),
        simulation_count: cli.simulations,
        asset_mix,
    }
}

fn inputs_from_simulate_payload(payload: &SimulatePayload) -> SimulationInputs {
    let mut cli = default_cli_for_api();
    apply_simulate_payload(&mut cli, payload);
    build_simulation_inputs(&cli)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/risk-score", post(risk_score_handler))
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/sequence-risk", post(sequence_risk_handler))
        .route("/api/sustainability", post(sustainability_handler))
        .route("/api/longevity", post(longevity_handler))
        .route("/api/compare", post(compare_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "planning engine API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", None)
}

async fn risk_score_handler(Json(payload): Json<RiskScorePayload>) -> Response {
    let cfl = CflInputs {
        total_assets: payload.total_assets,
        essential_expenses_annual: payload.essential_expenses_annual,
        emergency_fund_required: payload.emergency_fund_required,
    };
    match score_risk_profile(&payload.atr_answers, cfl) {
        Ok(score) => json_response(StatusCode::OK, score),
        Err(err) => engine_error_response(&err),
    }
}

async fn projection_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: SimulatePayload) -> Response {
    let inputs = inputs_from_simulate_payload(&payload);
    match project_cash_flow(&inputs.projection) {
        Ok(projection) => json_response(StatusCode::OK, projection),
        Err(err) => engine_error_response(&err),
    }
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let inputs = inputs_from_simulate_payload(&payload);
    let label = payload.label.clone().unwrap_or_else(|| "baseline".to_string());
    let seed = payload.seed;

    let result =
        run_blocking(move |cancel| run_simulation(&inputs, label, seed, &cancel)).await;
    match result {
        Ok(run) => json_response(StatusCode::OK, run),
        Err(err) => engine_error_response(&err),
    }
}

async fn sequence_risk_handler(Json(payload): Json<SequenceRiskPayload>) -> Response {
    let mut cli = default_cli_for_api();
    apply_simulate_payload(
        &mut cli,
        &SimulatePayload {
            current_age: payload.current_age,
            retirement_age: payload.retirement_age,
            terminal_age: payload.terminal_age,
            current_savings: payload.current_savings,
            annual_contribution: payload.annual_contribution,
            desired_retirement_income: payload.desired_retirement_income,
            growth_rate: payload.growth_rate,
            withdrawal_amount: payload.withdrawal_amount,
            ..SimulatePayload::default()
        },
    );
    let inputs = build_simulation_inputs(&cli);

    let crash_magnitude_pct = payload.crash_magnitude_pct.unwrap_or(-30.0);
    let early_crash_age = payload
        .early_crash_age
        .unwrap_or(cli.retirement_age + 1);
    let late_crash_age = payload
        .late_crash_age
        .unwrap_or_else(|| cli.terminal_age.saturating_sub(5));

    let analysis = analyze_sequence_risk(
        &inputs.projection,
        inputs.withdrawal_amount,
        crash_magnitude_pct,
        early_crash_age,
        late_crash_age,
    );
    match analysis {
        Ok(analysis) => json_response(StatusCode::OK, analysis),
        Err(err) => engine_error_response(&err),
    }
}

async fn sustainability_handler(Json(payload): Json<SustainabilityPayload>) -> Response {
    let inputs = inputs_from_simulate_payload(&payload.simulate);
    let seed = payload.simulate.seed;
    let safe_rate = payload
        .safe_withdrawal_rate_pct
        .unwrap_or(DEFAULT_SAFE_WITHDRAWAL_RATE_PCT);
    let portfolio_value = payload
        .portfolio_value
        .unwrap_or(inputs.projection.current_savings);

    let result = run_blocking(move |cancel| {
        let run = run_simulation(&inputs, "sustainability", seed, &cancel)?;
        evaluate_sustainability(
            run.results.success_probability,
            run.inputs.withdrawal_amount,
            portfolio_value,
            safe_rate,
        )
    })
    .await;
    match result {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(err) => engine_error_response(&err),
    }
}

async fn longevity_handler(Json(payload): Json<LongevityPayload>) -> Response {
    let inputs = inputs_from_simulate_payload(&payload.simulate);
    let seed = payload.simulate.seed;
    let targets = payload
        .target_ages
        .unwrap_or_else(|| DEFAULT_LONGEVITY_TARGETS.to_vec());

    let result =
        run_blocking(move |cancel| longevity_scan(&inputs, &targets, seed, &cancel)).await;
    match result {
        Ok(points) => json_response(StatusCode::OK, points),
        Err(err) => engine_error_response(&err),
    }
}

async fn compare_handler(Json(payload): Json<ComparePayload>) -> Response {
    let baseline_index = payload.baseline_index.unwrap_or(0);
    let scenarios: Vec<(SimulationInputs, String, Option<u64>)> = payload
        .scenarios
        .iter()
        .enumerate()
        .map(|(index, scenario)| {
            let label = scenario
                .label
                .clone()
                .unwrap_or_else(|| format!("scenario {}", index + 1));
            (inputs_from_simulate_payload(scenario), label, scenario.seed)
        })
        .collect();

    let result = run_blocking(move |cancel| {
        let runs = scenarios
            .into_iter()
            .map(|(inputs, label, seed)| run_simulation(&inputs, label, seed, &cancel))
            .collect::<Result<Vec<SimulationRun>, EngineError>>()?;
        compare_scenarios(&runs, baseline_index)
    })
    .await;
    match result {
        Ok(comparison) => json_response(StatusCode::OK, comparison),
        Err(err) => engine_error_response(&err),
    }
}

/// Runs an engine call on the blocking pool under `ENGINE_TIMEOUT`. On
/// timeout the shared cancel token is tripped so worker threads stop instead
/// of finishing a result nobody will read. A worker that panicked is also
/// reported as cancelled.
async fn run_blocking<T, F>(f: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> Result<T, EngineError> + Send + 'static,
{
    let token = CancelToken::new();
    let worker_token = token.clone();
    let handle = tokio::task::spawn_blocking(move || f(worker_token));

    match tokio::time::timeout(ENGINE_TIMEOUT, handle).await {
        Ok(joined) => joined.unwrap_or(Err(EngineError::Cancelled)),
        Err(_) => {
            token.cancel();
            tracing::warn!(timeout_secs = ENGINE_TIMEOUT.as_secs(), "engine call timed out");
            Err(EngineError::Cancelled)
        }
    }
}

fn engine_error_response(err: &EngineError) -> Response {
    let status = match err {
        EngineError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        EngineError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        EngineError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    tracing::warn!(%err, %status, "request rejected");
    error_response(status, &err.to_string(), err.field().map(str::to_string))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str, field: Option<String>) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            field,
        },
    )
}
