use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use pv_service::{
    broker::{Consumer, HttpChannelServer},
    config::AppConfig,
    metrics_server, observability,
    sinks::build_outputs,
    PvService,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "PV service: adds a simulated PV output to each meter reading and writes the sum"
)]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// IDs of the meters to subscribe to (separated by a space)
    #[arg(short = 'i', long = "meter-ids", num_args = 1.., required = true)]
    meter_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let cfg = AppConfig::load(cli.config.as_deref());

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr).await?;
    }

    let channel = Arc::new(HttpChannelServer::bind(&cfg.broker.host, cfg.broker.port).await?);
    let mut consumer = Consumer::new(channel.clone());

    for meter_id in &cli.meter_ids {
        let outputs = build_outputs(&cfg.pv_service, meter_id);
        PvService::new(meter_id.clone(), outputs)
            .bind(&mut consumer)
            .await?;
    }

    let stop = consumer.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("PV service stopped by the user"),
            Err(e) => tracing::error!(error = %e, "cannot listen for Ctrl+C, stopping"),
        }
        stop.cancel();
    });

    let result = consumer.run().await;
    channel.close();
    if let Err(e) = &result {
        tracing::error!(error = %e, "PV service stopped with an error");
    }

    result.map_err(Into::into)
}
