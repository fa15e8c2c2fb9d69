mod curve;
mod engine;
mod error;
mod solver;
mod types;

pub use curve::{ANCHOR_INCOMES, TaxCurve};
pub use engine::{
    DEFAULT_DISTRIBUTION_SAMPLES, PERCENTILE_INCOME_ANCHORS, QUADRATURE_POINTS,
    evaluate_personal_outcome, income_at_percentile, income_distribution,
    integrate_marginal_rate, integrated_top_decile_rate, run_report,
};
pub use error::ModelError;
pub use solver::{BASE_MULTIPLIERS, cap_yearly, scaled_multipliers, solve_brackets};
pub use types::{
    BracketRates, DistributionPoint, EconomyConstants, PersonalOutcome, Report, Segment,
    SolverInput, SolverResult,
};
