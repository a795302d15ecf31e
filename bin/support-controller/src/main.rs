use anyhow::Result;
use kube::CustomResourceExt;
use support_api::{Infrastructure, SupportingService};
use support_core::ControllerConfig;
use support_kube::ClusterClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod supporting_service_controller;

use supporting_service_controller::SupportingServiceController;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Print the operator's CRDs as a JSON list
fn print_crds() -> Result<()> {
    let crds = vec![SupportingService::crd(), Infrastructure::crd()];
    println!("{}", serde_json::to_string_pretty(&crds)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().nth(1).as_deref() == Some("crds") {
        return print_crds();
    }

    let config = ControllerConfig::from_env()?;
    init_tracing(config.json_logs);

    info!("Starting support-controller...");

    let client = ClusterClient::new().await?;
    let controller = SupportingServiceController::new(client, config);

    let handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("SupportingService controller error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");
    handle.abort();

    Ok(())
}
