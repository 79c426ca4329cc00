use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use pv_service::{
    broker::HttpChannelClient,
    config::AppConfig,
    observability,
    sources::{MeterFactory, MeterIdGenerator},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated meter: publishes one consumption reading per interval"
)]
struct Cli {
    /// Path of the TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of meters to run (overrides [meter].count)
    #[arg(long)]
    count: Option<usize>,

    /// Delay between readings in milliseconds (overrides [meter].interval_ms)
    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    let cfg = AppConfig::load(cli.config.as_deref());
    let count = cli.count.unwrap_or(cfg.meter.count).max(1);
    let interval = Duration::from_millis(cli.interval_ms.unwrap_or(cfg.meter.interval_ms).max(1));

    let publisher = Arc::new(HttpChannelClient::connect(&cfg.broker.host, cfg.broker.port).await?);

    let mut factory = MeterFactory::new(MeterIdGenerator::new());
    let mut meters = Vec::with_capacity(count);
    for _ in 0..count {
        meters.push(factory.new_meter(publisher.clone()).await?);
    }

    let mut ticker = tokio::time::interval(interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "cannot listen for Ctrl+C, stopping");
                }
                tracing::info!("meter interrupted");
                break;
            }
            _ = ticker.tick() => {
                for meter in &mut meters {
                    if let Err(e) = meter.send_consumption().await {
                        tracing::error!(meter_id = %meter.meter_id(), error = %e, "publish failed");
                    }
                }
            }
        }
    }

    for meter in meters {
        let meter_id = meter.meter_id().to_string();
        if let Err(e) = meter.close().await {
            tracing::warn!(meter_id = %meter_id, error = %e, "queue deletion failed");
        }
    }

    Ok(())
}
