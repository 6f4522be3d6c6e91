use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hf_llm_backends::{
    AppConfig, BackendRegistry, ModelBackend, build_router,
    evaluation::{fallback_samples, load_samples_from_path, run_evaluation},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(
        factory = %config.model.factory,
        model = %config.model.name,
        models_dir = %config.models_dir.display(),
        "constructing model backend"
    );

    let backend = construct_backend(&config)?;

    if config.smoke_on_start {
        let samples = match config.smoke_prompts_path.as_ref() {
            Some(path) => load_samples_from_path(path)?,
            None => fallback_samples(),
        };
        let report = run_evaluation(&backend, samples)?;
        tracing::info!(
            passed = report.passed(),
            avg_latency_ms = report.aggregate.avg_latency_ms,
            "startup smoke evaluation finished"
        );
        if !report.passed() {
            anyhow::bail!("backend echoed its prompts during the startup smoke evaluation");
        }
    }

    let router = build_router(config.clone(), Arc::new(RwLock::new(backend)));

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(feature = "tch-backend")]
fn construct_backend(config: &AppConfig) -> anyhow::Result<ModelBackend> {
    let runtime = hf_llm_backends::TorchRuntime::new(config.models_dir.clone());
    let backend = BackendRegistry::global().construct(&config.model.to_spec(), &runtime)?;
    Ok(backend)
}

#[cfg(not(feature = "tch-backend"))]
fn construct_backend(config: &AppConfig) -> anyhow::Result<ModelBackend> {
    // the key is still checked so a misconfigured deployment fails the same way
    BackendRegistry::global().resolve(&config.model.factory)?;
    anyhow::bail!("no model runtime compiled in; rebuild with `--features tch-backend`")
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
