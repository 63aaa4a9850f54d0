//! Process entry point: load config, init tracing, wire up the
//! collaborators, and either run the full service or a one-shot
//! algorithm invocation (`--run-once`).

use std::sync::Arc;

use clap::Parser;
use openwifi_rrm::algorithms::{AlgorithmCategory, AlgorithmRegistry};
use openwifi_rrm::config::RrmConfig;
use openwifi_rrm::config_applier::ConfigApplier;
use openwifi_rrm::device_registry::{DeviceConfig, DeviceRegistry};
use openwifi_rrm::gateway::{GatewayClient, HttpGatewayClient};
use openwifi_rrm::kafka::KafkaIngest;
use openwifi_rrm::modeler::Modeler;
use openwifi_rrm::prov_monitor::{ProvMonitor, ProvisioningClient};
use openwifi_rrm::scheduler::RRMScheduler;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "openwifi-rrm")]
struct Cli {
    /// Path to the RRM config TOML file.
    #[arg(long, default_value = "rrm.toml")]
    config: String,

    /// Override the gateway's TLS certificate verification.
    #[arg(long)]
    verify_ssl: Option<bool>,

    /// Run exactly one algorithm id to completion and exit (single-shot
    /// mode, does not start Kafka/REST/scheduler).
    #[arg(long)]
    run_once: Option<String>,

    /// Zone to target when `--run-once` is set.
    #[arg(long, default_value = "default")]
    zone: String,
}

/// A provisioning collaborator with no backing service: returns the
/// registry's current contents unchanged. Real deployments substitute
/// an HTTP-backed implementation; this keeps the binary runnable
/// without one configured (§6 "Persisted state ... not required").
struct NoopProvisioningClient;

#[async_trait::async_trait]
impl ProvisioningClient for NoopProvisioningClient {
    async fn list_devices(&self) -> anyhow::Result<Vec<DeviceConfig>> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    openwifi_rrm::telemetry::init();
    let cli = Cli::parse();

    let mut config = match RrmConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "fatal: could not load config");
            std::process::exit(1);
        }
    };
    if let Some(verify_ssl) = cli.verify_ssl {
        config.gateway.verify_ssl = verify_ssl;
    }

    let registry = DeviceRegistry::new();
    let gateway: Arc<dyn GatewayClient> = Arc::new(HttpGatewayClient::new(&config.gateway));
    let modeler = Modeler::new(
        config.data_model.state_buffer_size,
        config.data_model.wifi_scan_buffer_size,
        registry.clone(),
    );
    let algorithms = Arc::new(AlgorithmRegistry::new());
    let config_applier = Arc::new(ConfigApplier::new(gateway.clone(), modeler.clone()));

    if let Some(algorithm_id) = cli.run_once {
        info!(algorithm_id, zone = %cli.zone, "run-once mode");
        modeler.backfill(gateway.as_ref()).await.ok();
        modeler.refresh_capabilities(gateway.as_ref()).await.ok();
        let scheduler = RRMScheduler::new(
            modeler,
            registry,
            algorithms.clone(),
            config_applier,
            &config,
        );
        let category = if algorithms.make_tpc(&algorithm_id, &Default::default()).is_some() {
            AlgorithmCategory::Tpc
        } else if algorithms
            .make_channel(&algorithm_id, &Default::default())
            .is_some()
        {
            AlgorithmCategory::Channel
        } else {
            AlgorithmCategory::ClientSteering
        };
        match scheduler
            .trigger_with_algorithm(&cli.zone, category, Some(&algorithm_id), false)
            .await
        {
            Ok(_) => info!("run-once complete"),
            Err(e) => error!(error = %e, "run-once failed"),
        }
        return Ok(());
    }

    let prov_client: Arc<dyn ProvisioningClient> = Arc::new(NoopProvisioningClient);
    let prov_monitor = ProvMonitor::new(
        prov_client,
        registry.clone(),
        std::time::Duration::from_secs(300),
    );

    modeler.backfill(gateway.as_ref()).await.ok();
    modeler.refresh_capabilities(gateway.as_ref()).await.ok();

    let (ingest_tx, ingest_rx) = tokio::sync::mpsc::channel(4096);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let kafka_ingest = KafkaIngest::new(&config.kafka)?;
    let modeler_task = tokio::spawn(modeler.clone().run(ingest_rx, shutdown_rx.clone()));
    let kafka_task = tokio::spawn(kafka_ingest.run(ingest_tx, shutdown_rx.clone()));
    let prov_task = tokio::spawn(prov_monitor.run(shutdown_rx.clone()));

    let scheduler = Arc::new(RRMScheduler::new(
        modeler.clone(),
        registry.clone(),
        algorithms,
        config_applier,
        &config,
    ));

    let mut cron_scheduler = scheduler.build_cron_scheduler().await?;
    cron_scheduler.start().await?;

    let api_state = openwifi_rrm::api::ApiState {
        modeler,
        registry,
        scheduler,
    };
    let app = openwifi_rrm::api::router(api_state);
    let listener = tokio::net::TcpListener::bind(&config.rest.bind_addr).await?;
    info!(addr = %config.rest.bind_addr, "REST API listening");
    let serve_task = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(kafka_task, prov_task, modeler_task);
    serve_task.abort();
    Ok(())
}
