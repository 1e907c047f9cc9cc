use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

use crate::fullup_client::FullupClient;
use crate::tank::TankRecord;

/// The vendor reports at most a few measurements per day, so the reference
/// integration polls every 30 minutes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Isolated task that polls the Fullup API on a fixed interval and forwards
/// each successful tank batch over a channel.
///
/// One cycle is in flight at a time. A failed cycle is logged and dropped;
/// the retry is simply the next tick.
pub struct TankPoller {
    client: FullupClient,
    poll_interval: Duration,
    update_sender: Sender<Vec<TankRecord>>,
}

impl TankPoller {
    pub fn new(client: FullupClient, update_sender: Sender<Vec<TankRecord>>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            update_sender,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawns the poller onto the runtime. The first poll fires immediately.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(
            "Starting Fullup tank poller, interval {}s",
            self.poll_interval.as_secs()
        );
        let mut poll_interval = interval(self.poll_interval);

        loop {
            poll_interval.tick().await;

            match self.client.get_tanks().await {
                Some(tanks) => {
                    info!("Polled {} tank(s) from Fullup", tanks.len());
                    if self.update_sender.send(tanks).await.is_err() {
                        info!("Tank update receiver dropped, stopping poller");
                        return;
                    }
                }
                None => {
                    warn!("Fullup poll cycle failed, retrying on the next interval");
                }
            }
        }
    }
}
