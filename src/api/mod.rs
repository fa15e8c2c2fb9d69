use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{DEFAULT_DISTRIBUTION_SAMPLES, EconomyConstants, Report, SolverInput, run_report};

const DEFAULT_INCOME_CAP_FACTOR: f64 = 100.0;
const MAX_DISTRIBUTION_SAMPLES: usize = 5_000;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ubitax",
    about = "Global progressive tax needed to fund a universal basic income, and what it means for one income"
)]
pub struct Cli {
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Basic income per person per month"
    )]
    basic_income: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Administrative overhead on top of the UBI cost, in percent"
    )]
    overhead: f64,
    #[arg(
        long,
        help = "Enable the hard income cap; factor defaults to 100 when not given"
    )]
    income_cap: bool,
    #[arg(
        long,
        help = "Income cap as a multiple of the monthly basic income; implies --income-cap"
    )]
    income_cap_factor: Option<f64>,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Spread of the bracket rates; 3 keeps the base shape"
    )]
    progression_strength: f64,
    #[arg(
        long,
        default_value_t = 3000.0,
        help = "Gross monthly income to evaluate"
    )]
    monthly_income: f64,
    #[arg(long, default_value_t = DEFAULT_DISTRIBUTION_SAMPLES)]
    distribution_samples: usize,
}

#[derive(Debug, Clone, Copy)]
struct ReportRequest {
    input: SolverInput,
    monthly_income: f64,
    distribution_samples: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    basic_income: Option<f64>,
    overhead: Option<f64>,
    income_cap: Option<bool>,
    income_cap_factor: Option<f64>,
    progression_strength: Option<f64>,
    monthly_income: Option<f64>,
    distribution_samples: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<ReportRequest, String> {
    if !cli.basic_income.is_finite() || cli.basic_income < 0.0 {
        return Err("--basic-income must be >= 0".to_string());
    }
    if !cli.overhead.is_finite() || cli.overhead < 0.0 {
        return Err("--overhead must be >= 0".to_string());
    }
    if let Some(factor) = cli.income_cap_factor {
        if !factor.is_finite() || factor <= 0.0 {
            return Err("--income-cap-factor must be > 0".to_string());
        }
    }
    if !cli.progression_strength.is_finite() || cli.progression_strength <= 0.0 {
        return Err("--progression-strength must be > 0".to_string());
    }
    if !cli.monthly_income.is_finite() || cli.monthly_income < 0.0 {
        return Err("--monthly-income must be >= 0".to_string());
    }
    if !(2..=MAX_DISTRIBUTION_SAMPLES).contains(&cli.distribution_samples) {
        return Err(format!(
            "--distribution-samples must be between 2 and {MAX_DISTRIBUTION_SAMPLES}"
        ));
    }

    let income_cap_factor = match (cli.income_cap, cli.income_cap_factor) {
        (_, Some(factor)) => Some(factor),
        (true, None) => Some(DEFAULT_INCOME_CAP_FACTOR),
        (false, None) => None,
    };

    Ok(ReportRequest {
        input: SolverInput {
            basic_income_monthly: cli.basic_income,
            overhead: cli.overhead / 100.0,
            income_cap_factor,
            progression_strength: cli.progression_strength,
        },
        monthly_income: cli.monthly_income,
        distribution_samples: cli.distribution_samples,
    })
}

fn compute_report(request: ReportRequest) -> Result<Report, String> {
    run_report(
        &EconomyConstants::world_2024(),
        &request.input,
        request.monthly_income,
        request.distribution_samples,
    )
    .map_err(|e| e.to_string())
}

pub fn report_from_cli(cli: Cli) -> Result<Report, String> {
    let request = build_request(cli)?;
    debug!(?request, "computing report");
    compute_report(request)
}

pub fn app() -> Router {
    Router::new()
        .route(
            "/api/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("UBI tax HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/calculate");

    axum::serve(listener, app()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_get_handler(
    payload: Result<Query<CalculatePayload>, QueryRejection>,
) -> Response {
    match payload {
        Ok(Query(payload)) => calculate_handler_impl(payload).await,
        Err(rejection) => rejected_payload(&rejection.body_text()),
    }
}

async fn calculate_post_handler(
    payload: Result<Json<CalculatePayload>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => calculate_handler_impl(payload).await,
        Err(rejection) => rejected_payload(&rejection.body_text()),
    }
}

fn rejected_payload(msg: &str) -> Response {
    warn!(error = %msg, "unreadable calculate payload");
    error_response(StatusCode::BAD_REQUEST, msg)
}

async fn calculate_handler_impl(payload: CalculatePayload) -> Response {
    let request = match request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected calculate request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match compute_report(request) {
        Ok(report) => json_response(StatusCode::OK, report),
        Err(msg) => {
            warn!(error = %msg, "calculation failed");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn request_from_json(json: &str) -> Result<ReportRequest, String> {
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    request_from_payload(payload)
}

fn request_from_payload(payload: CalculatePayload) -> Result<ReportRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.basic_income {
        cli.basic_income = v;
    }
    if let Some(v) = payload.overhead {
        cli.overhead = v;
    }
    match payload.income_cap {
        // An unticked cap switches the cap off whatever factor came along.
        Some(false) => {
            cli.income_cap = false;
            cli.income_cap_factor = None;
        }
        Some(true) => {
            cli.income_cap = true;
            cli.income_cap_factor = payload.income_cap_factor;
        }
        None => cli.income_cap_factor = payload.income_cap_factor,
    }
    if let Some(v) = payload.progression_strength {
        cli.progression_strength = v;
    }
    if let Some(v) = payload.monthly_income {
        cli.monthly_income = v;
    }
    if let Some(v) = payload.distribution_samples {
        cli.distribution_samples = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    let defaults = SolverInput::default();
    Cli {
        basic_income: defaults.basic_income_monthly,
        overhead: defaults.overhead * 100.0,
        income_cap: false,
        income_cap_factor: None,
        progression_strength: defaults.progression_strength,
        monthly_income: 3000.0,
        distribution_samples: DEFAULT_DISTRIBUTION_SAMPLES,
    }
}
