use std::{
    fmt::{self, Display},
    time::{Duration, Instant},
};

use arqlink_host::Diagnostics;
use tracing::info;

/// Logs aggregated diagnostics once per window, with the tick rate of the
/// window that just ended.
#[derive(Debug)]
pub(crate) struct StatisticsLog {
    window: Duration,
    window_start: Option<Instant>,
    ticks: u32,
    last_tick_rate: u32,
}

impl StatisticsLog {
    pub(crate) fn new(window: Duration) -> Self {
        Self { window, window_start: None, ticks: 0, last_tick_rate: 0 }
    }

    /// Records a tick and returns true if a window completed.
    pub(crate) fn tick(&mut self, now: Instant) -> bool {
        let start = *self.window_start.get_or_insert(now);
        self.ticks += 1;
        if now.saturating_duration_since(start) >= self.window {
            self.last_tick_rate = self.ticks;
            self.ticks = 0;
            self.window_start = Some(now);
            true
        } else {
            false
        }
    }

    /// Ticks counted in the last completed window.
    pub(crate) fn last_tick_rate(&self) -> u32 {
        self.last_tick_rate
    }

    pub(crate) fn log(&self, server: &Diagnostics, client: &Diagnostics) {
        info!(
            target: "arqlink::statistics",
            "{}",
            Report { server, client, ticks: self.last_tick_rate, window: self.window }
        );
    }
}

struct Report<'a> {
    server: &'a Diagnostics,
    client: &'a Diagnostics,
    ticks: u32,
    window: Duration,
}

impl Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server [{}] client [{}] total queued {} ({} ticks in {:?})",
            self.server,
            self.client,
            self.server.total_queued() + self.client.total_queued(),
            self.ticks,
            self.window
        )
    }
}
