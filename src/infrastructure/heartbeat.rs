use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// Heart-beat intervals agreed during the STOMP handshake (zero = off)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartbeatPlan {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartbeatPlan {
    /// Applies the STOMP 1.2 rules to our `(cx, cy)` and the server's
    /// `heart-beat:sx,sy` header.
    pub fn negotiate(client: (u64, u64), server_header: Option<&str>) -> Self {
        let (cx, cy) = client;
        let (sx, sy) = server_header.and_then(parse_header).unwrap_or((0, 0));

        let outgoing = if cx == 0 || sy == 0 { 0 } else { cx.max(sy) };
        let incoming = if cy == 0 || sx == 0 { 0 } else { cy.max(sx) };

        Self {
            outgoing: Duration::from_millis(outgoing),
            incoming: Duration::from_millis(incoming),
        }
    }

    /// How long the read side may stay silent before the link is considered dead
    pub fn read_deadline(&self) -> Option<Duration> {
        if self.incoming.is_zero() {
            None
        } else {
            Some(self.incoming * 2)
        }
    }
}

fn parse_header(value: &str) -> Option<(u64, u64)> {
    let (x, y) = value.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Writes EOL heart-beats on the shared writer until it closes
pub struct HeartbeatManager {
    interval: Duration,
    writer: mpsc::UnboundedSender<String>,
}

impl HeartbeatManager {
    pub fn new(writer: mpsc::UnboundedSender<String>, interval: Duration) -> Self {
        Self { interval, writer }
    }

    /// Spawns the heartbeat task that runs periodically
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval_timer = time::interval(self.interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            // first tick completes immediately
            interval_timer.tick().await;

            loop {
                interval_timer.tick().await;
                if self.writer.send("\n".to_string()).is_err() {
                    tracing::debug!("Writer closed, stopping heartbeat");
                    break;
                }
                tracing::trace!("Sent heartbeat");
            }
        })
    }
}
