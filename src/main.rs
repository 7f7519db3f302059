use energy_reconcile::{Config, Ingestor};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One poll result handed over by the fetcher, one JSON object per line.
#[derive(Debug, Deserialize)]
struct Envelope {
    unit: String,
    response: Value,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cfg_path =
        std::env::var("APP_CONFIG").unwrap_or_else(|_| "config/config.example.yaml".into());
    let cfg = Config::load(&cfg_path)?;
    info!(
        ceiling_wh = cfg.reconciler.max_interval_energy_wh,
        unit_overrides = cfg.units.len(),
        "loaded config"
    );

    let ingestor = Ingestor::new(cfg)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    loop {
        tokio::select! {
            biased;
            _ = &mut sig => {
                info!("shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let env: Envelope = match serde_json::from_str(&line) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable envelope");
                        continue;
                    }
                };
                let outcome = ingestor.process_value(&env.unit, &env.response);
                for delta in &outcome.deltas {
                    let mut out = serde_json::to_vec(delta)?;
                    out.push(b'\n');
                    stdout.write_all(&out).await?;
                }
                stdout.flush().await?;
            }
        }
    }

    info!(units = ingestor.store().len(), "reconciler stopped");
    Ok(())
}
