use std::env;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use fullup_tank_monitor::tank_poller::DEFAULT_POLL_INTERVAL;
use fullup_tank_monitor::{FullupClient, TankPoller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let email = env::var("FULLUP_EMAIL").context("FULLUP_EMAIL is required")?;
    let password = env::var("FULLUP_PASSWORD").context("FULLUP_PASSWORD is required")?;
    let poll_interval = poll_interval_from_env();

    info!("Starting Fullup tank monitor for {email}");

    let client = FullupClient::new(reqwest::Client::new(), email, password);
    let (update_sender, mut updates) = mpsc::channel(1);
    TankPoller::new(client, update_sender)
        .with_poll_interval(poll_interval)
        .spawn();

    while let Some(tanks) = updates.recv().await {
        for tank in &tanks {
            info!(
                "{} ({}): volume {:?}L of {:?}L, fill {:?}%, consuming {}L/day",
                tank.info.tank_name,
                tank.info.tank_id,
                tank.info.current_volume,
                tank.info.tank_total_volume,
                tank.fill_level_percentage(),
                tank.daily_consumption,
            );
        }
    }

    Ok(())
}

/// Reads `FULLUP_POLL_MINUTES`, falling back to the default 30 minute cycle
/// on absence or garbage.
fn poll_interval_from_env() -> Duration {
    env::var("FULLUP_POLL_MINUTES")
        .ok()
        .and_then(|minutes| minutes.parse::<u64>().ok())
        .map(|minutes| Duration::from_secs(minutes * 60))
        .unwrap_or(DEFAULT_POLL_INTERVAL)
}
