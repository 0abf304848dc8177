use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Datelike;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core::{
    AllocationSummary, BucketPolicy, BucketTag, Holding, HouseholdProfile, InputError,
    ProjectionSummary, SpouseProfile, YearlyProjection, run_projection, summarize_allocation,
    summarize_projection, validate_inputs,
};

const OPENING_BALANCE_ACCOUNT: &str = "Opening balance";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error(transparent)]
    Invalid(#[from] InputError),

    #[error("failed to read holdings file {path}: {source}")]
    HoldingsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid holdings JSON: {0}")]
    HoldingsJson(#[source] serde_json::Error),

    #[error("{0} must be a finite amount >= 0")]
    OpeningBalance(&'static str),

    #[error("failed to encode projection: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    monthly_spending: Option<f64>,
    inflation_rate: Option<f64>,
    social_security_age: Option<u32>,
    social_security_amount: Option<f64>,
    spouse_age: Option<u32>,
    spouse_social_security_age: Option<u32>,
    spouse_social_security_amount: Option<f64>,
    other_income: Option<f64>,

    cash_return: Option<f64>,
    income_return: Option<f64>,
    growth_return: Option<f64>,
    cash_target_years: Option<f64>,
    income_target_years: Option<f64>,

    cash_balance: Option<f64>,
    income_balance: Option<f64>,
    growth_balance: Option<f64>,
    holdings: Option<Vec<Holding>>,

    start_year: Option<i32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "bucketplan",
    about = "Three-bucket retirement drawdown projection (cash / income / growth)",
    allow_negative_numbers = true
)]
struct Cli {
    #[arg(long, default_value_t = 55)]
    current_age: u32,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = 90, help = "Terminal age, inclusive")]
    life_expectancy: u32,
    #[arg(long, default_value_t = 6000.0, help = "Monthly spending in today's money")]
    monthly_spending: f64,
    #[arg(long, default_value_t = 3.0, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(long, default_value_t = 67)]
    social_security_age: u32,
    #[arg(long, default_value_t = 2500.0, help = "Monthly Social Security benefit")]
    social_security_amount: f64,
    #[arg(long)]
    spouse_age: Option<u32>,
    #[arg(long)]
    spouse_social_security_age: Option<u32>,
    #[arg(long, help = "Spouse monthly Social Security benefit")]
    spouse_social_security_amount: Option<f64>,
    #[arg(long, default_value_t = 0.0, help = "Flat monthly pension/annuity income")]
    other_income: f64,

    #[arg(long, default_value_t = 4.0, help = "Cash bucket annual return in percent")]
    cash_return: f64,
    #[arg(long, default_value_t = 5.0, help = "Income bucket annual return in percent")]
    income_return: f64,
    #[arg(long, default_value_t = 8.0, help = "Growth bucket annual return in percent")]
    growth_return: f64,
    #[arg(long, default_value_t = 2.0, help = "Cash reserve in years of spending")]
    cash_target_years: f64,
    #[arg(long, default_value_t = 5.0, help = "Income reserve in years of spending")]
    income_target_years: f64,

    #[arg(long, default_value_t = 0.0)]
    cash_balance: f64,
    #[arg(long, default_value_t = 0.0)]
    income_balance: f64,
    #[arg(long, default_value_t = 0.0)]
    growth_balance: f64,
    #[arg(long, help = "JSON file holding an array of holdings")]
    holdings: Option<PathBuf>,

    #[arg(long, help = "Calendar year of the first projected year; defaults to this year")]
    start_year: Option<i32>,
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug)]
struct ProjectionRequest {
    profile: HouseholdProfile,
    policy: BucketPolicy,
    holdings: Vec<Holding>,
    start_year: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    start_year: i32,
    current_age: u32,
    retirement_age: u32,
    life_expectancy: u32,
    summary: ProjectionSummary,
    allocation: AllocationSummary,
    years: Vec<YearlyProjection>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn build_request(cli: Cli, extra_holdings: Vec<Holding>) -> Result<ProjectionRequest, RequestError> {
    let spouse = match (
        cli.spouse_age,
        cli.spouse_social_security_age,
        cli.spouse_social_security_amount,
    ) {
        (Some(current_age), Some(social_security_age), Some(social_security_monthly)) => {
            Some(SpouseProfile {
                current_age,
                social_security_age,
                social_security_monthly,
            })
        }
        _ => None,
    };

    let profile = HouseholdProfile {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        life_expectancy: cli.life_expectancy,
        monthly_spending: cli.monthly_spending,
        inflation_rate: cli.inflation_rate,
        social_security_age: cli.social_security_age,
        social_security_monthly: cli.social_security_amount,
        spouse,
        other_monthly_income: cli.other_income,
    };

    let policy = BucketPolicy {
        cash_return: cli.cash_return,
        income_return: cli.income_return,
        growth_return: cli.growth_return,
        cash_target_years: cli.cash_target_years,
        income_target_years: cli.income_target_years,
    };

    let mut holdings = extra_holdings;
    for (name, ticker, bucket, amount) in [
        ("cashBalance", "CASH", BucketTag::Cash, cli.cash_balance),
        ("incomeBalance", "INCOME", BucketTag::Income, cli.income_balance),
        ("growthBalance", "GROWTH", BucketTag::Growth, cli.growth_balance),
    ] {
        if !amount.is_finite() || amount < 0.0 {
            return Err(RequestError::OpeningBalance(name));
        }
        if amount > 0.0 {
            holdings.push(Holding {
                ticker: ticker.to_string(),
                account: OPENING_BALANCE_ACCOUNT.to_string(),
                quantity: 1.0,
                current_price: amount,
                bucket,
            });
        }
    }

    validate_inputs(&profile, &policy, &holdings)?;

    Ok(ProjectionRequest {
        profile,
        policy,
        holdings,
        start_year: cli.start_year.unwrap_or_else(current_year),
    })
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn build_projection_response(request: &ProjectionRequest) -> ProjectionResponse {
    let years = run_projection(
        &request.profile,
        &request.policy,
        &request.holdings,
        request.start_year,
    );
    ProjectionResponse {
        start_year: request.start_year,
        current_age: request.profile.current_age,
        retirement_age: request.profile.retirement_age,
        life_expectancy: request.profile.life_expectancy,
        summary: summarize_projection(&years),
        allocation: summarize_allocation(&request.profile, &request.policy, &request.holdings),
        years,
    }
}

fn log_plan_outcome(response: &ProjectionResponse) {
    if let Some(age) = response.summary.first_shortfall_age {
        tracing::warn!(
            age,
            final_total = response.summary.final_total_portfolio,
            "growth bucket goes negative; plan is not sustainable"
        );
    }
    if !response.allocation.unassigned_tickers.is_empty() {
        tracing::info!(
            tickers = ?response.allocation.unassigned_tickers,
            "holdings without a bucket are excluded from the projection"
        );
    }
}

pub fn run_cli<I, T>(args: I) -> Result<String, RequestError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    let holdings = match cli.holdings.as_deref() {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|source| RequestError::HoldingsFile {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str::<Vec<Holding>>(&raw).map_err(RequestError::HoldingsJson)?
        }
        None => Vec::new(),
    };
    let pretty = cli.pretty;

    let request = build_request(cli, holdings)?;
    tracing::debug!(
        current_age = request.profile.current_age,
        life_expectancy = request.profile.life_expectancy,
        holdings = request.holdings.len(),
        "running projection"
    );
    let response = build_projection_response(&request);
    log_plan_outcome(&response);

    if pretty {
        serde_json::to_string_pretty(&response).map_err(RequestError::Encode)
    } else {
        serde_json::to_string(&response).map_err(RequestError::Encode)
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "bucket plan API listening");
    tracing::info!("local access: http://127.0.0.1:{port}/api/projection");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_get_handler(Query(payload): Query<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    let request = match projection_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "rejected projection request");
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };

    tracing::debug!(
        current_age = request.profile.current_age,
        life_expectancy = request.profile.life_expectancy,
        holdings = request.holdings.len(),
        "running projection"
    );
    let response = build_projection_response(&request);
    log_plan_outcome(&response);
    json_response(StatusCode::OK, response)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
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
fn projection_request_from_json(json: &str) -> Result<ProjectionRequest, String> {
    let payload = serde_json::from_str::<ProjectionPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    projection_request_from_payload(payload).map_err(|e| e.to_string())
}

fn projection_request_from_payload(
    payload: ProjectionPayload,
) -> Result<ProjectionRequest, RequestError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.monthly_spending {
        cli.monthly_spending = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.social_security_age {
        cli.social_security_age = v;
    }
    if let Some(v) = payload.social_security_amount {
        cli.social_security_amount = v;
    }
    if let Some(v) = payload.spouse_age {
        cli.spouse_age = Some(v);
    }
    if let Some(v) = payload.spouse_social_security_age {
        cli.spouse_social_security_age = Some(v);
    }
    if let Some(v) = payload.spouse_social_security_amount {
        cli.spouse_social_security_amount = Some(v);
    }
    if let Some(v) = payload.other_income {
        cli.other_income = v;
    }

    if let Some(v) = payload.cash_return {
        cli.cash_return = v;
    }
    if let Some(v) = payload.income_return {
        cli.income_return = v;
    }
    if let Some(v) = payload.growth_return {
        cli.growth_return = v;
    }
    if let Some(v) = payload.cash_target_years {
        cli.cash_target_years = v;
    }
    if let Some(v) = payload.income_target_years {
        cli.income_target_years = v;
    }

    if let Some(v) = payload.cash_balance {
        cli.cash_balance = v;
    }
    if let Some(v) = payload.income_balance {
        cli.income_balance = v;
    }
    if let Some(v) = payload.growth_balance {
        cli.growth_balance = v;
    }
    if let Some(v) = payload.start_year {
        cli.start_year = Some(v);
    }

    build_request(cli, payload.holdings.unwrap_or_default())
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 55,
        retirement_age: 65,
        life_expectancy: 90,
        monthly_spending: 6_000.0,
        inflation_rate: 3.0,
        social_security_age: 67,
        social_security_amount: 2_500.0,
        spouse_age: Some(53),
        spouse_social_security_age: Some(67),
        spouse_social_security_amount: Some(1_800.0),
        other_income: 0.0,
        cash_return: 4.0,
        income_return: 5.0,
        growth_return: 8.0,
        cash_target_years: 2.0,
        income_target_years: 5.0,
        cash_balance: 0.0,
        income_balance: 0.0,
        growth_balance: 0.0,
        holdings: None,
        start_year: None,
        pretty: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    #[test]
    fn api_defaults_match_the_household_defaults() {
        let request = projection_request_from_json("{}").expect("valid defaults");
        assert_eq!(request.profile.current_age, 55);
        assert_eq!(request.profile.life_expectancy, 90);
        assert_approx(request.profile.monthly_spending, 6_000.0);
        assert_eq!(
            request.profile.spouse,
            Some(SpouseProfile {
                current_age: 53,
                social_security_age: 67,
                social_security_monthly: 1_800.0,
            })
        );
        assert_approx(request.policy.growth_return, 8.0);
        assert_approx(request.policy.cash_target_years, 2.0);
        assert!(request.holdings.is_empty());
    }

    #[test]
    fn payload_overrides_defaults() {
        let request = projection_request_from_json(
            r#"{
                "currentAge": 65,
                "lifeExpectancy": 66,
                "monthlySpending": 4000,
                "inflationRate": 0,
                "socialSecurityAge": 65,
                "socialSecurityAmount": 2000,
                "growthReturn": -20,
                "cashBalance": 10000,
                "startYear": 2030
            }"#,
        )
        .expect("valid payload");
        assert_eq!(request.profile.current_age, 65);
        assert_eq!(request.profile.life_expectancy, 66);
        assert_approx(request.policy.growth_return, -20.0);
        assert_eq!(request.start_year, 2030);
        assert_eq!(request.holdings.len(), 1);
        assert_eq!(request.holdings[0].bucket, BucketTag::Cash);
        assert_eq!(request.holdings[0].account, OPENING_BALANCE_ACCOUNT);
        assert_approx(request.holdings[0].market_value(), 10_000.0);
    }

    #[test]
    fn payload_holdings_are_parsed_with_bucket_tags() {
        let request = projection_request_from_json(
            r#"{
                "holdings": [
                    {"ticker": "SPAXX", "account": "IRA", "quantity": 5000, "currentPrice": 1, "bucket": "cash"},
                    {"ticker": "BND", "quantity": 10, "currentPrice": 70, "bucket": "income"},
                    {"ticker": "ODD", "account": "IRA", "quantity": 3, "currentPrice": 9, "bucket": "unassigned"}
                ]
            }"#,
        )
        .expect("valid payload");
        assert_eq!(request.holdings.len(), 3);
        assert_eq!(request.holdings[1].account, "");
        assert_eq!(request.holdings[2].bucket, BucketTag::Unassigned);
    }

    #[test]
    fn unknown_bucket_tag_is_rejected() {
        let err = projection_request_from_json(
            r#"{"holdings": [{"ticker": "X", "quantity": 1, "currentPrice": 1, "bucket": "bonds"}]}"#,
        )
        .expect_err("bad tag should fail");
        assert!(err.starts_with("Invalid API JSON payload"));
    }

    #[test]
    fn invalid_profile_surfaces_validation_message() {
        let err = projection_request_from_json(r#"{"currentAge": 70, "lifeExpectancy": 60}"#)
            .expect_err("should reject");
        assert_eq!(err, "lifeExpectancy (60) must be >= currentAge (70)");
    }

    #[test]
    fn negative_opening_balance_is_rejected() {
        let mut cli = sample_cli();
        cli.growth_balance = -1.0;
        let err = build_request(cli, Vec::new()).expect_err("should reject");
        assert_eq!(err.to_string(), "growthBalance must be a finite amount >= 0");
    }

    #[test]
    fn spouse_requires_all_three_fields() {
        let mut cli = sample_cli();
        cli.spouse_social_security_amount = None;
        let request = build_request(cli, Vec::new()).expect("valid inputs");
        assert_eq!(request.profile.spouse, None);
    }

    #[test]
    fn zero_spouse_age_contributes_no_income() {
        let request = projection_request_from_json(
            r#"{"currentAge": 60, "lifeExpectancy": 60, "socialSecurityAge": 70, "spouseAge": 0}"#,
        )
        .expect("valid inputs");
        let response = build_projection_response(&request);
        assert_approx(response.years[0].income, 0.0);

        let request = projection_request_from_json(
            r#"{"currentAge": 60, "lifeExpectancy": 60, "socialSecurityAge": 70, "spouseAge": 70}"#,
        )
        .expect("valid inputs");
        let response = build_projection_response(&request);
        assert_approx(response.years[0].income, 1_800.0 * 12.0);
    }

    #[test]
    fn start_year_defaults_to_the_current_year() {
        let request = build_request(sample_cli(), Vec::new()).expect("valid inputs");
        assert_eq!(request.start_year, current_year());
    }

    #[test]
    fn response_serialization_contains_expected_fields() {
        let mut cli = sample_cli();
        cli.current_age = 65;
        cli.life_expectancy = 66;
        cli.monthly_spending = 4_000.0;
        cli.inflation_rate = 0.0;
        cli.social_security_age = 65;
        cli.social_security_amount = 2_000.0;
        cli.spouse_age = None;
        cli.cash_return = 0.0;
        cli.income_return = 0.0;
        cli.growth_return = 0.0;
        cli.cash_balance = 10_000.0;
        cli.start_year = Some(2030);

        let request = build_request(cli, Vec::new()).expect("valid inputs");
        let response = build_projection_response(&request);
        assert_eq!(response.years.len(), 2);
        assert_eq!(response.summary.first_shortfall_age, Some(65));
        assert!(!response.summary.sustainable);
        assert_approx(response.years[0].end_balance_growth, -14_000.0);

        let json = serde_json::to_string(&response).expect("response should serialize");
        assert!(json.contains("\"startYear\":2030"));
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"firstShortfallAge\":65"));
        assert!(json.contains("\"allocation\""));
        assert!(json.contains("\"unassignedTickers\""));
        assert!(json.contains("\"years\""));
        assert!(json.contains("\"withdrawalSource\":\"Cash -> Income -> Growth\""));
        assert!(json.contains("\"action\":\"\""));
    }

    #[test]
    fn run_cli_prints_projection_json() {
        let json = run_cli([
            "bucketplan",
            "--current-age",
            "70",
            "--life-expectancy",
            "72",
            "--monthly-spending",
            "1000",
            "--growth-return",
            "-5",
            "--cash-balance",
            "50000",
            "--growth-balance",
            "100000",
            "--start-year",
            "2040",
        ])
        .expect("cli run should succeed");

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["startYear"], 2040);
        assert_eq!(value["years"].as_array().map(|a| a.len()), Some(3));
        assert_eq!(value["years"][2]["age"], 72);
        assert_eq!(value["years"][0]["withdrawalSource"], "Cash Bucket");
    }

    #[test]
    fn run_cli_reports_missing_holdings_file() {
        let err = run_cli([
            "bucketplan",
            "--holdings",
            "/definitely/not/here/holdings.json",
        ])
        .expect_err("missing file should fail");
        assert!(matches!(err, RequestError::HoldingsFile { .. }));
    }

    #[test]
    fn run_cli_returns_argument_errors_instead_of_exiting() {
        let err = run_cli(["bucketplan", "--current-age", "not-a-number"])
            .expect_err("bad flag value should fail");
        assert!(matches!(err, RequestError::Args(_)));

        let err = run_cli(["bucketplan", "--no-such-flag"]).expect_err("unknown flag should fail");
        assert!(matches!(err, RequestError::Args(_)));
    }

    #[test]
    fn out_of_range_ages_are_rejected_before_projection() {
        let err = projection_request_from_json(r#"{"currentAge": 0, "lifeExpectancy": 4294967295}"#)
            .expect_err("should reject");
        assert_eq!(err, "lifeExpectancy (4294967295) must be <= 150");

        let err = projection_request_from_json(r#"{"spouseAge": 4294967295}"#)
            .expect_err("should reject");
        assert_eq!(err, "spouseAge (4294967295) must be <= 150");
    }

    #[tokio::test]
    async fn handler_returns_bad_request_json_for_invalid_input() {
        let payload = ProjectionPayload {
            cash_target_years: Some(0.0),
            ..ProjectionPayload::default()
        };
        let response = projection_handler_impl(payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("valid JSON");
        assert_eq!(
            value["error"],
            "cashTargetYears must be a finite number of years > 0"
        );
    }

    #[tokio::test]
    async fn handler_returns_projection_for_defaults() {
        let response = projection_handler_impl(ProjectionPayload::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("valid JSON");
        assert_eq!(value["years"].as_array().map(|a| a.len()), Some(36));
        assert_eq!(value["currentAge"], 55);
    }
}
