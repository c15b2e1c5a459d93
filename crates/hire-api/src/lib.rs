use std::env;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    extract::State,
    extract::connect_info::ConnectInfo,
    http::Method,
    http::Request,
    http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue},
    middleware,
    middleware::Next,
    response::Response,
    routing::{MethodRouter, get, post},
};
use clap::Parser;
use dotenvy::dotenv;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
};
use hire_common::db::{create_pool_from_url_checked, run_migrations};
use hire_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use hire_common::pipeline::DEFAULT_COMPANY_NAME;
use hire_common::report::{DisabledReportGenerator, HttpReportGenerator, ReportGenerator};
use hire_common::schema::bootstrap_workbook;
use hire_common::survey::{DEFAULT_DAILY_LIMIT, SurveyPolicy};
use hire_common::{
    IngestionService, IngestionSettings, MemoryWorkbook, PgWorkbook, SharedWorkbook,
};
use hire_metrics::{DEFAULT_METRICS_PORT, METRICS_PORT_ENV, init_metrics};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod auth;
pub mod error;
pub mod handlers;

use auth::{AuthConfig, AuthMode, JwtAlgorithm};
use error::ApiError;
use handlers::{candidates, health, surveys, webhook, workflow_logs};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "hire-api",
    about = "Recruiting workflow webhook ingestion and survey tracking API"
)]
struct Cli {
    /// PostgreSQL connection string; the in-memory workbook is used when unset
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// API key for X-API-Key authentication
    #[arg(long, env = "HIRE_API_KEY")]
    api_key: Option<String>,

    /// Authentication mode: api_key | jwt
    #[arg(long, env = "AUTH_MODE", default_value = "api_key", value_enum)]
    auth_mode: AuthMode,

    /// JWT secret for AUTH_MODE=jwt
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// JWT HMAC algorithm
    #[arg(long, env = "JWT_ALGORITHM", default_value = "hs256", value_enum)]
    jwt_algorithm: JwtAlgorithm,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "HIRE_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Base URL of the report-generation service; reports are skipped when unset
    #[arg(long, env = "HIRE_REPORT_ENDPOINT")]
    report_endpoint: Option<String>,

    /// Bearer token sent to the report-generation service
    #[arg(long, env = "HIRE_REPORT_API_KEY")]
    report_api_key: Option<String>,

    /// Company name printed on generated reports
    #[arg(long, env = "HIRE_COMPANY_NAME", default_value = DEFAULT_COMPANY_NAME)]
    company_name: String,

    /// Successful survey sends allowed per business day
    #[arg(long, env = "HIRE_SURVEY_DAILY_LIMIT", default_value_t = DEFAULT_DAILY_LIMIT)]
    survey_daily_limit: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
    pub report_endpoint: Option<String>,
    pub report_api_key: Option<String>,
    pub company_name: String,
    pub survey_daily_limit: usize,
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimits {
    global: Arc<IpRateLimiter>,
    webhook: Arc<IpRateLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global_per_sec: u64,
    pub global_burst: u32,
    pub webhook_per_sec: u64,
    pub webhook_burst: u32,
}

impl RateLimitConfig {
    fn parse_env_u64(vars: &[&str]) -> Option<u64> {
        vars.iter()
            .find_map(|name| env::var(name).ok())
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
    }

    fn parse_env_u32(vars: &[&str]) -> Option<u32> {
        vars.iter()
            .find_map(|name| env::var(name).ok())
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
    }

    fn from_env() -> Self {
        Self {
            global_per_sec: Self::parse_env_u64(&["HIRE_RATE_LIMIT_GLOBAL_PER_SEC"]).unwrap_or(20),
            global_burst: Self::parse_env_u32(&["HIRE_RATE_LIMIT_GLOBAL_BURST"]).unwrap_or(40),
            webhook_per_sec: Self::parse_env_u64(&["HIRE_RATE_LIMIT_WEBHOOK_PER_SEC"]).unwrap_or(5),
            webhook_burst: Self::parse_env_u32(&["HIRE_RATE_LIMIT_WEBHOOK_BURST"]).unwrap_or(10),
        }
    }
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "HIRE_CORS_ORIGINS must list explicit origins when credentials are enabled".into(),
            ));
        }

        let auth = AuthConfig {
            mode: cli.auth_mode,
            api_key: cli.api_key,
            jwt_secret: cli.jwt_secret,
            jwt_algorithm: cli.jwt_algorithm,
        };

        match auth.mode {
            AuthMode::ApiKey if auth.api_key.is_none() => {
                return Err(ApiError::BadRequest(
                    "HIRE_API_KEY is required when AUTH_MODE=api_key".into(),
                ));
            }
            AuthMode::Jwt if auth.jwt_secret.is_none() => {
                return Err(ApiError::BadRequest(
                    "JWT_SECRET is required when AUTH_MODE=jwt".into(),
                ));
            }
            _ => {}
        }

        if cli.survey_daily_limit == 0 {
            return Err(ApiError::BadRequest(
                "HIRE_SURVEY_DAILY_LIMIT must be positive".into(),
            ));
        }

        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: non_blank(cli.database_url),
            port: cli.port,
            cors_origins,
            auth,
            report_endpoint: non_blank(cli.report_endpoint),
            report_api_key: non_blank(cli.report_api_key),
            company_name: cli.company_name,
            survey_daily_limit: cli.survey_daily_limit,
        })
    }

    pub fn for_tests(auth: AuthConfig) -> Self {
        Self {
            database_url: None,
            port: 3001,
            cors_origins: vec!["http://localhost:3000".into()],
            auth,
            report_endpoint: None,
            report_api_key: None,
            company_name: DEFAULT_COMPANY_NAME.into(),
            survey_daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }

    fn report_generator(&self) -> Arc<dyn ReportGenerator> {
        match &self.report_endpoint {
            Some(endpoint) => Arc::new(HttpReportGenerator::new(
                endpoint.clone(),
                self.report_api_key.clone(),
            )),
            None => Arc::new(DisabledReportGenerator),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub workbook: SharedWorkbook,
    pub ingestion: Arc<IngestionService>,
    pub survey_policy: SurveyPolicy,
    pub config: AppConfig,
    pub(crate) rate_limits: RateLimits,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        workbook: SharedWorkbook,
        reports: Arc<dyn ReportGenerator>,
        config: AppConfig,
    ) -> SharedState {
        let ingestion = IngestionService::new(
            workbook.clone(),
            reports,
            IngestionSettings {
                company_name: config.company_name.clone(),
            },
        );

        Arc::new(Self {
            workbook,
            ingestion: Arc::new(ingestion),
            survey_policy: SurveyPolicy {
                daily_limit: config.survey_daily_limit,
            },
            config,
            rate_limits: default_rate_limits(),
            readiness: Arc::new(AtomicBool::new(true)),
        })
    }
}

impl axum::extract::FromRef<SharedState> for AuthConfig {
    fn from_ref(input: &SharedState) -> AuthConfig {
        input.config.auth.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true)
}

fn build_ip_limiter(per_second: u64, burst_size: u32) -> Arc<IpRateLimiter> {
    let nanos_per_token = 1_000_000_000u64 / per_second.max(1);
    let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token.max(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);

    Arc::new(RateLimiter::keyed(quota))
}

pub fn default_rate_limits() -> RateLimits {
    let cfg = RateLimitConfig::from_env();
    RateLimits {
        global: build_ip_limiter(cfg.global_per_sec, cfg.global_burst),
        webhook: build_ip_limiter(cfg.webhook_per_sec, cfg.webhook_burst),
    }
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn enforce_rate_limit(limiter: &IpRateLimiter, ip: Option<IpAddr>) -> Result<(), ApiError> {
    if let Some(client_ip) = ip {
        if limiter.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests("rate limit exceeded".into()));
        }
    }

    Ok(())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.global, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn webhook_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.webhook, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(error::with_request_id(request_id, next.run(req)).await)
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    let webhook_route = || -> MethodRouter<SharedState> {
        post(webhook::receive).route_layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_rate_limit,
        ))
    };

    let api_routes = Router::new()
        .route("/webhook", webhook_route())
        .route("/candidates/:id/behavior", get(candidates::behavior))
        .route(
            "/candidates/:id/response-speed",
            get(candidates::response_speed),
        )
        .route("/surveys/sends", post(surveys::record_survey_send))
        .route("/surveys/sends/today", get(surveys::sends_today))
        .route("/surveys/responses", post(surveys::record_survey_response))
        .route("/workflow-logs/recent", get(workflow_logs::recent));

    Router::new()
        .route("/health", get(health::readyz))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .route("/webhook", webhook_route())
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
        .layer(cors)
        .with_state(state)
}

/// State over an empty in-memory workbook with reports disabled.
pub fn test_state(api_key: &str) -> SharedState {
    test_state_with(
        api_key,
        Arc::new(MemoryWorkbook::with_default_tables()),
        Arc::new(DisabledReportGenerator),
    )
}

pub fn test_state_with(
    api_key: &str,
    workbook: SharedWorkbook,
    reports: Arc<dyn ReportGenerator>,
) -> SharedState {
    AppState::new(
        workbook,
        reports,
        AppConfig::for_tests(AuthConfig::api_key(api_key)),
    )
}

async fn open_workbook(config: &AppConfig) -> Result<SharedWorkbook, ApiError> {
    let workbook: SharedWorkbook = match &config.database_url {
        Some(url) => {
            let pool = create_pool_from_url_checked(url)
                .await
                .map_err(|err| ApiError::Database(format!("failed to create pool: {err}")))?;
            run_migrations(&pool)
                .await
                .map_err(|err| ApiError::Database(format!("failed to run migrations: {err}")))?;
            Arc::new(PgWorkbook::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory workbook, data is lost on exit");
            Arc::new(MemoryWorkbook::new())
        }
    };

    bootstrap_workbook(workbook.as_ref()).await?;
    Ok(workbook)
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));
    init_metrics(METRICS_PORT_ENV, DEFAULT_METRICS_PORT);

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;
    let workbook = open_workbook(&config).await?;
    let state = AppState::new(workbook, config.report_generator(), config.clone());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(
        %addr,
        auth_mode = ?config.auth.mode,
        workbook = state.workbook.backend(),
        reports = config.report_endpoint.is_some(),
        "hire-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state.readiness.store(false, Ordering::SeqCst);

    // let load balancers observe /readyz as not ready before connections stop
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{Request, StatusCode},
        routing::get,
    };
    use std::sync::Mutex;
    use tower::ServiceExt;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn with_envs(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
        let _guard = ENV_GUARD.lock().unwrap();

        let previous: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(var, value)| {
                let old = env::var(var).ok();
                match value {
                    Some(v) => unsafe { env::set_var(var, v) },
                    None => unsafe { env::remove_var(var) },
                }
                (*var, old)
            })
            .collect();

        f();

        for (var, previous_value) in previous {
            match previous_value {
                Some(v) => unsafe { env::set_var(var, v) },
                None => unsafe { env::remove_var(var) },
            }
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["hire-api"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn sets_request_id_when_missing() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                MakeRequestUuid::default(),
            ));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn rate_limit_config_respects_env_overrides() {
        with_envs(
            &[
                ("HIRE_RATE_LIMIT_GLOBAL_PER_SEC", Some("10")),
                ("HIRE_RATE_LIMIT_GLOBAL_BURST", Some("25")),
                ("HIRE_RATE_LIMIT_WEBHOOK_PER_SEC", Some("2")),
                ("HIRE_RATE_LIMIT_WEBHOOK_BURST", Some("5")),
            ],
            || {
                let cfg = RateLimitConfig::from_env();
                assert_eq!(
                    cfg,
                    RateLimitConfig {
                        global_per_sec: 10,
                        global_burst: 25,
                        webhook_per_sec: 2,
                        webhook_burst: 5,
                    }
                );
            },
        );
    }

    #[test]
    fn config_requires_credentials_for_the_auth_mode() {
        with_envs(
            &[
                ("HIRE_API_KEY", None),
                ("AUTH_MODE", None),
                ("JWT_SECRET", None),
                ("DATABASE_URL", None),
                ("HIRE_REPORT_ENDPOINT", None),
                ("HIRE_SURVEY_DAILY_LIMIT", None),
                ("HIRE_CORS_ORIGINS", None),
            ],
            || {
                assert!(matches!(
                    AppConfig::from_cli(cli(&[])),
                    Err(ApiError::BadRequest(msg)) if msg.contains("HIRE_API_KEY")
                ));
                assert!(matches!(
                    AppConfig::from_cli(cli(&["--auth-mode", "jwt"])),
                    Err(ApiError::BadRequest(msg)) if msg.contains("JWT_SECRET")
                ));
                assert!(matches!(
                    AppConfig::from_cli(cli(&["--api-key", "k", "--cors-origins", "*"])),
                    Err(ApiError::BadRequest(_))
                ));

                let config = AppConfig::from_cli(cli(&["--api-key", "k"])).unwrap();
                assert_eq!(config.database_url, None);
                assert_eq!(config.survey_daily_limit, DEFAULT_DAILY_LIMIT);
                assert_eq!(config.company_name, DEFAULT_COMPANY_NAME);
                assert!(!config.report_generator().is_enabled());
            },
        );
    }

    #[test]
    fn blank_report_endpoint_disables_reports() {
        with_envs(
            &[("HIRE_REPORT_ENDPOINT", None), ("HIRE_API_KEY", None)],
            || {
                let config = AppConfig::from_cli(cli(&[
                    "--api-key",
                    "k",
                    "--report-endpoint",
                    " ",
                ]))
                .unwrap();
                assert_eq!(config.report_endpoint, None);

                let config = AppConfig::from_cli(cli(&[
                    "--api-key",
                    "k",
                    "--report-endpoint",
                    "https://reports.example.com",
                ]))
                .unwrap();
                assert!(config.report_generator().is_enabled());
            },
        );
    }
}
