use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use certflow::cert::{SelfSigner, VaultConfig, VaultSigner};
use certflow::cluster::http::HttpClusterClient;
use certflow::config::{Backend, Settings};
use certflow::observability::{init_observability, MetricsRecorder, ObservabilityConfig};
use certflow::{Certifier, Reconciler, APP_NAME, VERSION};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = Settings::parse();
    let observability = ObservabilityConfig::from_env();
    if let Err(e) = init_observability(&observability) {
        eprintln!("failed to initialize observability: {}", e);
        std::process::exit(1);
    }

    info!(app = APP_NAME, version = VERSION, "starting controller");

    if let Err(e) = run(settings).await {
        error!(error = %e, "controller exited with error");
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> certflow::Result<()> {
    let certifier: Arc<dyn Certifier> = match settings.backend {
        Backend::Delegated => {
            let config = VaultConfig::from_env(
                settings.email.clone(),
                settings.key_strength,
                settings.ttl,
            )?;
            Arc::new(VaultSigner::new(config)?)
        }
        Backend::SelfSigned => {
            Arc::new(SelfSigner::new(settings.ttl).with_key_strength(settings.key_strength))
        }
    };
    info!(backend = certifier.name(), ttl_secs = settings.ttl.as_secs(), "backend selected");

    let cluster = Arc::new(HttpClusterClient::new(
        &settings.resolve_cluster_url()?,
        settings.resolve_cluster_token(),
    )?);

    let reconciler = Arc::new(
        Reconciler::new(cluster, certifier, Arc::new(MetricsRecorder::new()), settings.ttl)
            .with_force_tls(settings.force_tls)
            .with_backend_timeout(settings.backend_timeout),
    );

    tokio::select! {
        result = reconciler.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}
