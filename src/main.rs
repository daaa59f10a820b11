use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use ticket_triage::api::triage_routes;
use ticket_triage::catalog::Catalog;
use ticket_triage::classifier::LocalModels;
use ticket_triage::config::TriageConfig;
use ticket_triage::intake::HttpResultSink;
use ticket_triage::llm::create_provider;
use ticket_triage::pipeline::prompts::load_classifier_prompt;
use ticket_triage::pipeline::{EventHub, Orchestrator, TriageDeps};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TriageConfig::from_env().context("invalid configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🎫 Ticket Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Threshold: {:.2}", config.threshold);
    eprintln!("   API: http://0.0.0.0:{}/api/v1", config.port);
    eprintln!("   Updates WS: ws://0.0.0.0:{}/ws/updates\n", config.port);

    // ── Generative oracle ───────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("failed to create LLM provider")?;

    // ── Catalog & prompts ───────────────────────────────────────────────
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("failed to load catalog from {}", path.display()))?,
        None => Catalog::builtin(),
    };
    info!(work_types = catalog.len(), "Catalog ready");
    let classifier_prompt = load_classifier_prompt(config.classifier_prompt_path.as_deref(), &catalog);

    // ── Local models (never fatal) ──────────────────────────────────────
    let models_dir = config.models_dir.clone();
    let embedder_repo = config.embedder_repo.clone();
    let models = tokio::task::spawn_blocking(move || {
        LocalModels::load(models_dir.as_deref(), embedder_repo.as_deref())
    })
    .await
    .context("local model loading task failed")?;
    let models_status = match (models.is_loaded(), cfg!(feature = "bert")) {
        (true, _) => "loaded",
        (false, true) => "unavailable (fast gate disabled)",
        (false, false) => "unavailable (fast gate needs a build with --features bert)",
    };
    eprintln!("   Local models: {models_status}");

    // ── Pipeline ────────────────────────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        TriageDeps {
            llm,
            models,
            catalog: Arc::new(catalog),
            classifier_prompt,
            events: EventHub::new(),
        },
        config.orchestrator_config(),
    ));

    // ── HTTP server ─────────────────────────────────────────────────────
    let results = HttpResultSink::new(config.callback_token.clone(), config.callback_timeout)
        .context("failed to create callback client")?;
    let app = triage_routes(orchestrator, Arc::new(results), &config.cors_origins);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Triage server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ticket-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
