use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use medicredit::config::AppConfig;
use medicredit::error::AppError;
use medicredit::telemetry;
use medicredit::workflows::application::demo::{demo_service, DemoWizardService};
use medicredit::workflows::application::{
    application_router, AssetPlacement, DocumentAttachment, FileHandle, SessionId, StatePatch,
    WizardConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct OpsState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "MediCredit Wizard",
    about = "Run the medical-financing credit application wizard service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a scripted application through the wizard and print the score trail
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo().await,
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let ops_state = OpsState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let service = demo_service(WizardConfig {
        analysis_timeout_secs: config.analysis.timeout_secs,
    });

    let ops = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(ops_state);

    let app = application_router(service)
        .merge(ops)
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "credit application wizard ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<OpsState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<OpsState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn demo_file(name: &str, media_type: &str, size: usize) -> FileHandle {
    FileHandle::new(name, media_type, vec![0x4d; size])
}

/// Scripted walk through all six steps against the in-memory collaborators.
async fn run_demo() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let service = demo_service(WizardConfig {
        analysis_timeout_secs: config.analysis.timeout_secs,
    });

    let view = service.start_session();
    let session = view.session_id.clone();
    println!("Credit application wizard demo");
    println!(
        "Session {} / application {}",
        session.0, view.application_id.0
    );

    let score = service.patch_fields(
        &session,
        StatePatch {
            full_name: Some("Amina Wanjiru".to_string()),
            id_number: Some("10048211".to_string()),
            phone_number: Some("0712000111".to_string()),
            occupation: Some("Shopkeeper".to_string()),
            ..StatePatch::default()
        },
    )?;
    println!("profile details entered: score {score}");
    advance(&service, &session)?;

    let outcome = service
        .attach_document(
            &session,
            DocumentAttachment::Prescription {
                file: demo_file("prescription.jpg", "image/jpeg", 2_048),
            },
        )
        .await?;
    println!(
        "prescription analyzed: score {} ({:?})",
        outcome.score, outcome.analysis
    );
    advance(&service, &session)?;

    let outcome = service
        .attach_asset_images(
            &session,
            AssetPlacement::Outdoor,
            vec![demo_file("hilux.jpg", "image/jpeg", 4_096)],
        )
        .await?;
    println!(
        "assets detected and valued: score {} ({:?})",
        outcome.score, outcome.analysis
    );

    let snapshot = service.session(&session)?;
    println!("step '{}' score {}", snapshot.step, snapshot.score);
    let asset_id = "asset-hilux".to_string();
    let outcome = service
        .attach_ownership_proof(
            &session,
            &asset_id,
            demo_file("logbook.pdf", "application/pdf", 1_024),
        )
        .await?;
    println!(
        "ownership proof verified: score {} ({:?})",
        outcome.score, outcome.analysis
    );
    advance(&service, &session)?;

    service
        .attach_document(
            &session,
            DocumentAttachment::MobileMoneyStatement {
                file: demo_file("mpesa.pdf", "application/pdf", 8_192),
                password: None,
            },
        )
        .await?;
    let outcome = service
        .attach_document(
            &session,
            DocumentAttachment::BankStatement {
                file: demo_file("bank.pdf", "application/pdf", 9_000),
                password: Some("1234".to_string()),
            },
        )
        .await?;
    println!(
        "bank statement analyzed: score {} ({:?})",
        outcome.score, outcome.analysis
    );
    service.patch_fields(
        &session,
        StatePatch {
            guarantor_one_phone: Some("0722000333".to_string()),
            ..StatePatch::default()
        },
    )?;
    advance(&service, &session)?;

    service
        .attach_document(
            &session,
            DocumentAttachment::GuarantorOneId {
                file: demo_file("guarantor1-id.jpg", "image/jpeg", 1_500),
            },
        )
        .await?;
    advance(&service, &session)?;

    let record = service.submit(&session).await?;
    println!(
        "submitted application {} with composite score {} and {} documents",
        record.application_id.0,
        record.composite_score,
        record.documents.len()
    );
    Ok(())
}

fn advance(service: &Arc<DemoWizardService>, session: &SessionId) -> Result<(), AppError> {
    let step = service.advance(session)?;
    println!("advanced to step '{}'", step.label());
    Ok(())
}
