pub mod cancel;
pub mod compare;
pub mod error;
pub mod monte_carlo;
pub mod projection;
pub mod risk;
pub mod sequence;
pub mod sustainability;
pub mod types;

pub use cancel::CancelToken;
pub use compare::compare_scenarios;
pub use error::EngineError;
pub use monte_carlo::{longevity_scan, run_simulation};
pub use projection::project_cash_flow;
pub use risk::score_risk_profile;
pub use sequence::analyze_sequence_risk;
pub use sustainability::evaluate_sustainability;
pub use types::{
    AssetMix, CflInputs, InvestorPersona, Projection, ProjectionInputs, RiskScore,
    SimulationInputs, SimulationResults, SimulationRun, SustainabilityReport,
    SustainabilityStatus,
};
