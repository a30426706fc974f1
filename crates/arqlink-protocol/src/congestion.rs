/// RTO used before the first RTT sample, in milliseconds.
pub const RTO_DEFAULT: u32 = 200;
/// Lower RTO bound in normal mode.
pub const RTO_MIN: u32 = 100;
/// Lower RTO bound in no-delay mode.
pub const RTO_MIN_NO_DELAY: u32 = 30;
/// Upper RTO bound.
pub const RTO_MAX: u32 = 60_000;
/// Smallest slow-start threshold.
const SSTHRESH_MIN: u32 = 2;
/// Initial slow-start threshold.
const SSTHRESH_INIT: u32 = 2;

/// RTT tracking and retransmission timeout.
///
/// Integer EWMA in milliseconds: `srtt = 7/8 srtt + 1/8 sample`,
/// `rttvar = 3/4 rttvar + 1/4 |srtt - sample|`, and
/// `rto = srtt + max(interval, 4 rttvar)`.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: u32,
    rttvar: u32,
    rto: u32,
    min_rto: u32,
    interval: u32,
}

impl RttEstimator {
    /// Creates an estimator for an engine flushing every `interval` ms.
    pub fn new(interval: u32, no_delay: bool) -> Self {
        Self {
            srtt: 0,
            rttvar: 0,
            rto: RTO_DEFAULT,
            min_rto: if no_delay { RTO_MIN_NO_DELAY } else { RTO_MIN },
            interval,
        }
    }

    /// Updates the estimate with a new sample.
    pub fn update(&mut self, sample: u32) {
        let sample = sample.min(RTO_MAX);
        if self.srtt == 0 {
            self.srtt = sample;
            self.rttvar = sample / 2;
        } else {
            let delta = sample.abs_diff(self.srtt);
            self.rttvar = (3 * self.rttvar + delta) / 4;
            self.srtt = ((7 * self.srtt + sample) / 8).max(1);
        }
        let rto = self.srtt + self.interval.max(4 * self.rttvar);
        self.rto = rto.clamp(self.min_rto, RTO_MAX);
    }

    /// Smoothed round-trip time in milliseconds (0 before the first sample).
    pub fn srtt(&self) -> u32 {
        self.srtt
    }

    /// Current retransmission timeout in milliseconds.
    pub fn rto(&self) -> u32 {
        self.rto
    }
}

/// Additive-increase/multiplicative-decrease congestion window, in segments.
#[derive(Debug, Clone)]
pub struct CongestionWindow {
    enabled: bool,
    cwnd: u32,
    ssthresh: u32,
    incr: u32,
    mss: u32,
}

impl CongestionWindow {
    /// Creates a window for segments of `mss` bytes.
    pub fn new(enabled: bool, mss: u32) -> Self {
        let mss = mss.max(1);
        Self { enabled, cwnd: 1, ssthresh: SSTHRESH_INIT, incr: mss, mss }
    }

    /// Returns whether the congestion window limits sending.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current congestion window.
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// Number of segments that may be in flight given both windows.
    pub fn effective(&self, send_window: u32, remote_window: u32) -> u32 {
        let window = send_window.min(remote_window);
        if self.enabled {
            window.min(self.cwnd)
        } else {
            window
        }
    }

    /// Grows the window after the cumulative ack advanced.
    pub fn on_ack_progress(&mut self, remote_window: u32) {
        if self.cwnd >= remote_window {
            return;
        }
        if self.cwnd < self.ssthresh {
            // Slow start
            self.cwnd += 1;
            self.incr = self.incr.saturating_add(self.mss);
        } else {
            self.incr = self.incr.max(self.mss);
            self.incr = self.incr.saturating_add(self.mss.saturating_mul(self.mss) / self.incr + self.mss / 16);
            if (self.cwnd + 1).saturating_mul(self.mss) <= self.incr {
                self.cwnd = self.incr.div_ceil(self.mss);
            }
        }
        if self.cwnd > remote_window {
            self.cwnd = remote_window;
            self.incr = remote_window.saturating_mul(self.mss);
        }
    }

    /// Shrinks the window after segments were fast-resent.
    pub fn on_fast_resend(&mut self, in_flight: u32, resend_threshold: u32) {
        self.ssthresh = (in_flight / 2).max(SSTHRESH_MIN);
        self.cwnd = self.ssthresh.saturating_add(resend_threshold);
        self.incr = self.cwnd.saturating_mul(self.mss);
    }

    /// Collapses the window after a retransmission timeout.
    pub fn on_loss(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(SSTHRESH_MIN);
        self.cwnd = 1;
        self.incr = self.mss;
    }
}
