use std::{collections::VecDeque, io::Cursor};

use arqlink_core::{
    config::Config,
    constants::{CHANNEL_HEADER_SIZE, SEGMENT_HEADER_SIZE},
    error::{ErrorKind, Result},
};

use crate::{
    congestion::{CongestionWindow, RttEstimator, RTO_MAX},
    segment::{Command, Segment},
    sequence::{sequence_diff, sequence_greater_than, sequence_less_than},
    QueueCounters,
};
use tracing::{debug, trace};

/// First wait before probing a zero remote window, in milliseconds.
const PROBE_INIT: u32 = 7_000;
/// Upper bound of the window probe backoff.
const PROBE_LIMIT: u32 = 120_000;
/// Fast resends allowed per segment before only the RTO may resend it.
const FAST_RESEND_LIMIT: u32 = 5;
/// Timer jumps larger than this resynchronise the flush clock.
const FLUSH_RESYNC: i32 = 10_000;

/// A pushed segment that is waiting for its ack.
#[derive(Debug)]
struct SentSegment {
    segment: Segment,
    resend_at: u32,
    rto: u32,
    fast_ack: u32,
    transmissions: u32,
}

/// Collects encoded segments into datagrams of at most `mtu` bytes.
struct DatagramWriter {
    mtu: usize,
    current: Vec<u8>,
    datagrams: Vec<Vec<u8>>,
}

impl DatagramWriter {
    fn new(mtu: usize) -> Self {
        Self { mtu, current: Vec::with_capacity(mtu), datagrams: Vec::new() }
    }

    fn write(&mut self, segment: &Segment) {
        if !self.current.is_empty() && self.current.len() + segment.encoded_len() > self.mtu {
            self.datagrams.push(std::mem::replace(&mut self.current, Vec::with_capacity(self.mtu)));
        }
        segment.encode(&mut self.current);
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        if !self.current.is_empty() {
            self.datagrams.push(self.current);
        }
        self.datagrams
    }
}

/// Window-based ARQ stream.
///
/// Messages move through four queues:
///
/// ```text
/// send(): message ─▶ send_queue ─(window)─▶ send_buffer ─(ack)─▶ gone
/// input(): segment ─▶ receive_buffer ─(in order)─▶ receive_queue ─▶ recv()
/// ```
///
/// Time is a u32 millisecond counter supplied by the caller; it only needs to
/// be monotonic for one stream.
#[derive(Debug)]
pub struct Arq {
    mtu: usize,
    mss: usize,
    max_fragments: usize,

    snd_una: u32,
    snd_nxt: u32,
    rcv_nxt: u32,

    snd_wnd: u16,
    rcv_wnd: u16,
    rmt_wnd: u16,

    interval: u32,
    no_delay: bool,
    fast_resend: u32,
    dead_link: u32,
    dead: bool,

    rtt: RttEstimator,
    congestion: CongestionWindow,

    current: u32,
    ts_flush: u32,
    updated: bool,

    probe_wait: u32,
    ts_probe: u32,
    ask_send: bool,
    ask_tell: bool,

    snd_queue: VecDeque<Segment>,
    snd_buf: VecDeque<SentSegment>,
    rcv_queue: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,
    acks: Vec<(u32, u32)>,
}

impl Arq {
    /// Creates a stream tuned by `config`.
    pub fn new(config: &Config) -> Self {
        let mtu = config.mtu.saturating_sub(CHANNEL_HEADER_SIZE);
        let mss = config.segment_payload_size().max(1);
        Self {
            mtu,
            mss,
            max_fragments: config.max_fragments(),
            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,
            snd_wnd: config.send_window_size.max(1),
            rcv_wnd: config.receive_window_size.max(1),
            rmt_wnd: config.receive_window_size.max(1),
            interval: config.interval_ms.clamp(1, 5_000),
            no_delay: config.no_delay,
            fast_resend: config.fast_resend,
            dead_link: config.max_retransmits.max(1),
            dead: false,
            rtt: RttEstimator::new(config.interval_ms, config.no_delay),
            congestion: CongestionWindow::new(config.congestion_window, mss as u32),
            current: 0,
            ts_flush: 0,
            updated: false,
            probe_wait: 0,
            ts_probe: 0,
            ask_send: false,
            ask_tell: false,
            snd_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            rcv_buf: VecDeque::new(),
            acks: Vec::new(),
        }
    }

    /// Largest message accepted by [`send`](Self::send).
    pub fn max_message_size(&self) -> usize {
        self.mss * self.max_fragments
    }

    /// Queues a message, splitting it into segments.
    ///
    /// Nothing is transmitted until the next flush.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let count = if data.len() <= self.mss { 1 } else { (data.len() + self.mss - 1) / self.mss };
        if count > self.max_fragments {
            return Err(ErrorKind::PayloadTooLarge {
                size: data.len(),
                max: self.max_message_size(),
            });
        }

        if data.is_empty() {
            self.snd_queue.push_back(Segment::push(Vec::new(), 0));
            return Ok(());
        }
        for (index, chunk) in data.chunks(self.mss).enumerate() {
            let frg = (count - index - 1) as u8;
            self.snd_queue.push_back(Segment::push(chunk.to_vec(), frg));
        }
        Ok(())
    }

    /// Size of the next complete message, if one is ready.
    pub fn peek_size(&self) -> Option<usize> {
        let front = self.rcv_queue.front()?;
        if front.frg == 0 {
            return Some(front.data.len());
        }
        if self.rcv_queue.len() < front.frg as usize + 1 {
            return None;
        }
        let mut size = 0;
        for segment in &self.rcv_queue {
            size += segment.data.len();
            if segment.frg == 0 {
                break;
            }
        }
        Some(size)
    }

    /// Pops the next complete message.
    pub fn recv(&mut self) -> Option<Vec<u8>> {
        let size = self.peek_size()?;
        let recover = self.rcv_queue.len() >= self.rcv_wnd as usize;

        let mut message = Vec::with_capacity(size);
        while let Some(segment) = self.rcv_queue.pop_front() {
            message.extend_from_slice(&segment.data);
            if segment.frg == 0 {
                break;
            }
        }

        self.move_receive_buffer();

        // Tell the peer our window reopened.
        if recover && self.rcv_queue.len() < self.rcv_wnd as usize {
            self.ask_tell = true;
        }
        Some(message)
    }

    /// Feeds one received datagram (without its channel tag) into the stream.
    pub fn input(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < SEGMENT_HEADER_SIZE {
            return Err(ErrorKind::ReceivedDataToShort);
        }

        let prev_una = self.snd_una;
        let mut max_ack: Option<u32> = None;
        let mut cursor = Cursor::new(data);

        while (data.len() - cursor.position() as usize) >= SEGMENT_HEADER_SIZE {
            let segment = Segment::decode(&mut cursor)?;

            self.rmt_wnd = segment.wnd;
            self.parse_una(segment.una);
            self.shrink_buffer();

            match segment.cmd {
                Command::Ack => {
                    let elapsed = sequence_diff(self.current, segment.ts);
                    if elapsed >= 0 {
                        self.rtt.update(elapsed as u32);
                    }
                    self.parse_ack(segment.sn);
                    self.shrink_buffer();
                    max_ack = Some(match max_ack {
                        Some(max) if !sequence_greater_than(segment.sn, max) => max,
                        _ => segment.sn,
                    });
                }
                Command::Push => {
                    let window_end = self.rcv_nxt.wrapping_add(self.rcv_wnd as u32);
                    if sequence_less_than(segment.sn, window_end) {
                        self.acks.push((segment.sn, segment.ts));
                        if !sequence_less_than(segment.sn, self.rcv_nxt) {
                            self.parse_data(segment);
                        }
                    } else {
                        trace!("Dropping segment {} beyond receive window end {}", segment.sn, window_end);
                    }
                }
                Command::WindowProbe => self.ask_tell = true,
                Command::WindowTell => {}
            }
        }

        if let Some(max_ack) = max_ack {
            self.parse_fast_ack(max_ack);
        }
        if sequence_greater_than(self.snd_una, prev_una) {
            self.congestion.on_ack_progress(self.rmt_wnd as u32);
        }
        Ok(())
    }

    /// Advances the clock to `current` and flushes when the interval elapsed.
    ///
    /// Returns the datagrams to transmit, without channel tags.
    pub fn update(&mut self, current: u32) -> Vec<Vec<u8>> {
        self.current = current;
        if !self.updated {
            self.updated = true;
            self.ts_flush = current;
        }

        let mut slap = sequence_diff(current, self.ts_flush);
        if !(-FLUSH_RESYNC..FLUSH_RESYNC).contains(&slap) {
            self.ts_flush = current;
            slap = 0;
        }
        if slap < 0 {
            return Vec::new();
        }

        self.ts_flush = self.ts_flush.wrapping_add(self.interval);
        if sequence_diff(current, self.ts_flush) >= 0 {
            self.ts_flush = current.wrapping_add(self.interval);
        }
        self.flush()
    }

    /// Emits acks, probes, new segments and due retransmissions right away.
    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        if !self.updated {
            return Vec::new();
        }
        let current = self.current;
        let wnd_unused = self.window_unused();
        let mut writer = DatagramWriter::new(self.mtu);

        for (sn, ts) in self.acks.drain(..) {
            writer.write(&Segment::control(Command::Ack, sn, ts, wnd_unused, self.rcv_nxt));
        }

        self.update_probe(current);
        if self.ask_send {
            writer.write(&Segment::control(Command::WindowProbe, 0, current, wnd_unused, self.rcv_nxt));
        }
        if self.ask_tell {
            writer.write(&Segment::control(Command::WindowTell, 0, current, wnd_unused, self.rcv_nxt));
        }
        self.ask_send = false;
        self.ask_tell = false;

        // Move as many queued segments into flight as the windows allow.
        let window = self.congestion.effective(self.snd_wnd as u32, self.rmt_wnd as u32);
        let window_end = self.snd_una.wrapping_add(window);
        while sequence_less_than(self.snd_nxt, window_end) {
            let Some(mut segment) = self.snd_queue.pop_front() else {
                break;
            };
            segment.sn = self.snd_nxt;
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
            self.snd_buf.push_back(SentSegment {
                segment,
                resend_at: current,
                rto: self.rtt.rto(),
                fast_ack: 0,
                transmissions: 0,
            });
        }

        let resend_threshold = if self.fast_resend > 0 { self.fast_resend } else { u32::MAX };
        let rto_slack = if self.no_delay { 0 } else { self.rtt.rto() >> 3 };
        let mut fast_resent = false;
        let mut lost = false;

        for sent in self.snd_buf.iter_mut() {
            let mut transmit = false;
            if sent.transmissions == 0 {
                transmit = true;
                sent.transmissions = 1;
                sent.rto = self.rtt.rto();
                sent.resend_at = current.wrapping_add(sent.rto + rto_slack);
            } else if sequence_diff(current, sent.resend_at) >= 0 {
                transmit = true;
                sent.transmissions += 1;
                sent.rto = if self.no_delay {
                    sent.rto.saturating_add(sent.rto / 2)
                } else {
                    sent.rto.saturating_add(sent.rto.max(self.rtt.rto()))
                }
                .min(RTO_MAX);
                sent.resend_at = current.wrapping_add(sent.rto);
                lost = true;
            } else if sent.fast_ack >= resend_threshold && sent.transmissions <= FAST_RESEND_LIMIT {
                transmit = true;
                sent.transmissions += 1;
                sent.fast_ack = 0;
                sent.resend_at = current.wrapping_add(sent.rto);
                fast_resent = true;
            }

            if transmit {
                sent.segment.ts = current;
                sent.segment.wnd = wnd_unused;
                sent.segment.una = self.rcv_nxt;
                writer.write(&sent.segment);
                if sent.transmissions >= self.dead_link && !self.dead {
                    debug!("Segment {} sent {} times without ack, link is dead", sent.segment.sn, sent.transmissions);
                    self.dead = true;
                }
            }
        }

        if fast_resent {
            trace!("Fast resend, shrinking congestion window");
            let in_flight = self.snd_nxt.wrapping_sub(self.snd_una);
            self.congestion.on_fast_resend(in_flight, resend_threshold);
        }
        if lost {
            self.congestion.on_loss();
        }

        writer.finish()
    }

    /// Returns true once a segment was retransmitted `max_retransmits` times.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Smoothed round-trip time in milliseconds.
    pub fn srtt(&self) -> u32 {
        self.rtt.srtt()
    }

    /// Current retransmission timeout in milliseconds.
    pub fn rto(&self) -> u32 {
        self.rtt.rto()
    }

    /// Current congestion window in segments.
    pub fn cwnd(&self) -> u32 {
        self.congestion.cwnd()
    }

    /// Segments queued or in flight.
    pub fn waiting_to_send(&self) -> usize {
        self.snd_queue.len() + self.snd_buf.len()
    }

    /// Current queue depths.
    pub fn counters(&self) -> QueueCounters {
        QueueCounters {
            send_queue: self.snd_queue.len(),
            send_buffer: self.snd_buf.len(),
            receive_queue: self.rcv_queue.len(),
            receive_buffer: self.rcv_buf.len(),
        }
    }

    fn window_unused(&self) -> u16 {
        (self.rcv_wnd as usize).saturating_sub(self.rcv_queue.len()) as u16
    }

    fn update_probe(&mut self, current: u32) {
        if self.rmt_wnd != 0 {
            self.ts_probe = 0;
            self.probe_wait = 0;
            return;
        }
        if self.probe_wait == 0 {
            self.probe_wait = PROBE_INIT;
            self.ts_probe = current.wrapping_add(self.probe_wait);
        } else if sequence_diff(current, self.ts_probe) >= 0 {
            self.probe_wait = (self.probe_wait + self.probe_wait / 2).min(PROBE_LIMIT);
            self.ts_probe = current.wrapping_add(self.probe_wait);
            self.ask_send = true;
        }
    }

    fn parse_una(&mut self, una: u32) {
        while let Some(front) = self.snd_buf.front() {
            if sequence_less_than(front.segment.sn, una) {
                self.snd_buf.pop_front();
            } else {
                break;
            }
        }
    }

    fn shrink_buffer(&mut self) {
        self.snd_una = match self.snd_buf.front() {
            Some(front) => front.segment.sn,
            None => self.snd_nxt,
        };
    }

    fn parse_ack(&mut self, sn: u32) {
        if sequence_less_than(sn, self.snd_una) || !sequence_less_than(sn, self.snd_nxt) {
            return;
        }
        if let Some(index) = self.snd_buf.iter().position(|sent| sent.segment.sn == sn) {
            self.snd_buf.remove(index);
        }
    }

    fn parse_fast_ack(&mut self, sn: u32) {
        if sequence_less_than(sn, self.snd_una) || !sequence_less_than(sn, self.snd_nxt) {
            return;
        }
        for sent in self.snd_buf.iter_mut() {
            if sequence_less_than(sent.segment.sn, sn) {
                sent.fast_ack += 1;
            } else {
                break;
            }
        }
    }

    fn parse_data(&mut self, segment: Segment) {
        let sn = segment.sn;
        let window_end = self.rcv_nxt.wrapping_add(self.rcv_wnd as u32);
        if !sequence_less_than(sn, window_end) || sequence_less_than(sn, self.rcv_nxt) {
            return;
        }

        // Keep the receive buffer sorted; scan from the back since most
        // segments arrive in order.
        let mut insert_at = 0;
        for (index, existing) in self.rcv_buf.iter().enumerate().rev() {
            if existing.sn == sn {
                return;
            }
            if sequence_less_than(existing.sn, sn) {
                insert_at = index + 1;
                break;
            }
        }
        self.rcv_buf.insert(insert_at, segment);
        self.move_receive_buffer();
    }

    fn move_receive_buffer(&mut self) {
        while let Some(front) = self.rcv_buf.front() {
            if front.sn == self.rcv_nxt && self.rcv_queue.len() < self.rcv_wnd as usize {
                if let Some(segment) = self.rcv_buf.pop_front() {
                    self.rcv_queue.push_back(segment);
                    self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
                }
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(config: &Config) -> (Arq, Arq) {
        (Arq::new(config), Arq::new(config))
    }

    /// Runs both streams for `rounds` ticks of `step` ms, passing every
    /// datagram through `deliver` which may drop it.
    fn exchange(
        a: &mut Arq,
        b: &mut Arq,
        start: u32,
        rounds: u32,
        step: u32,
        mut deliver: impl FnMut(usize) -> bool,
    ) -> u32 {
        let mut counter = 0;
        let mut now = start;
        for _ in 0..rounds {
            for datagram in a.update(now) {
                counter += 1;
                if deliver(counter) {
                    b.input(&datagram).unwrap();
                }
            }
            for datagram in b.update(now) {
                counter += 1;
                if deliver(counter) {
                    a.input(&datagram).unwrap();
                }
            }
            now += step;
        }
        now
    }

    fn drain(arq: &mut Arq) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        while let Some(message) = arq.recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_messages_arrive_in_order() {
        let (mut a, mut b) = pair(&Config::default());
        for i in 0..10u8 {
            a.send(&[i; 4]).unwrap();
        }

        exchange(&mut a, &mut b, 0, 50, 10, |_| true);

        let received = drain(&mut b);
        assert_eq!(received.len(), 10);
        for (i, message) in received.iter().enumerate() {
            assert_eq!(message, &vec![i as u8; 4]);
        }
        assert_eq!(a.waiting_to_send(), 0);
    }

    #[test]
    fn test_large_message_is_fragmented_and_reassembled() {
        let (mut a, mut b) = pair(&Config::default());
        let message: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        a.send(&message).unwrap();
        assert!(a.counters().send_queue > 1);

        exchange(&mut a, &mut b, 0, 100, 10, |_| true);

        assert_eq!(b.recv(), Some(message));
        assert_eq!(b.recv(), None);
    }

    #[test]
    fn test_retransmission_recovers_from_loss() {
        let (mut a, mut b) = pair(&Config::default());
        for i in 0..20u8 {
            a.send(&[i]).unwrap();
        }

        // Drop every third datagram in both directions.
        exchange(&mut a, &mut b, 0, 1000, 10, |n| n % 3 != 0);

        let received = drain(&mut b);
        assert_eq!(received, (0..20u8).map(|i| vec![i]).collect::<Vec<_>>());
    }

    #[test]
    fn test_too_large_message_is_rejected_without_queueing() {
        let config = Config::default();
        let mut arq = Arq::new(&config);
        let too_large = vec![0u8; arq.max_message_size() + 1];

        let result = arq.send(&too_large);
        assert!(matches!(result, Err(ErrorKind::PayloadTooLarge { .. })));
        assert_eq!(arq.counters(), QueueCounters::default());

        let fits = vec![0u8; arq.max_message_size()];
        assert!(arq.send(&fits).is_ok());
        assert_eq!(arq.counters().send_queue, config.max_fragments());
    }

    #[test]
    fn test_send_window_limits_in_flight_segments() {
        let mut config = Config::default();
        config.send_window_size = 4;
        config.congestion_window = false;
        let mut arq = Arq::new(&config);
        for i in 0..10u8 {
            arq.send(&[i]).unwrap();
        }

        arq.update(0);
        let counters = arq.counters();
        assert_eq!(counters.send_buffer, 4);
        assert_eq!(counters.send_queue, 6);
    }

    #[test]
    fn test_congestion_window_starts_small() {
        let config = Config::default();
        let mut arq = Arq::new(&config);
        for i in 0..10u8 {
            arq.send(&[i]).unwrap();
        }
        arq.update(0);
        assert_eq!(arq.counters().send_buffer, 1);
    }

    #[test]
    fn test_link_dies_without_acks() {
        let mut config = Config::default();
        config.max_retransmits = 3;
        let mut arq = Arq::new(&config);
        arq.send(b"lost").unwrap();

        let mut now = 0;
        while !arq.is_dead() && now < 60_000 {
            arq.update(now);
            now += 10;
        }
        assert!(arq.is_dead());
    }

    #[test]
    fn test_backoff_is_capped_for_many_retransmits() {
        for no_delay in [true, false] {
            let config = Config { max_retransmits: 100, no_delay, ..Config::default() };
            let mut arq = Arq::new(&config);
            arq.send(b"lost").unwrap();

            let mut now: u32 = 0;
            while !arq.is_dead() && now < 10_000_000 {
                arq.update(now);
                now += 1_000;
            }
            assert!(arq.is_dead());
        }
    }

    fn split_segments(datagram: &[u8]) -> Vec<Segment> {
        let mut cursor = Cursor::new(datagram);
        let mut segments = Vec::new();
        while (datagram.len() - cursor.position() as usize) >= SEGMENT_HEADER_SIZE {
            segments.push(Segment::decode(&mut cursor).unwrap());
        }
        segments
    }

    #[test]
    fn test_fast_resend_beats_rto() {
        let mut config = Config::default();
        config.fast_resend = 2;
        config.congestion_window = false;
        let (mut a, mut b) = pair(&config);
        for i in 0..6u8 {
            a.send(&[i]).unwrap();
        }

        let first = a.update(0);
        assert_eq!(first.len(), 1);

        // Lose the head segment, deliver the rest.
        let mut tail = Vec::new();
        for segment in split_segments(&first[0]).into_iter().skip(1) {
            segment.encode(&mut tail);
        }
        b.input(&tail).unwrap();

        // Deliver each ack on its own so every one counts as a skip of sn 0.
        for datagram in b.update(1) {
            for ack in split_segments(&datagram) {
                let mut single = Vec::new();
                ack.encode(&mut single);
                a.input(&single).unwrap();
            }
        }
        assert_eq!(a.counters().send_buffer, 1);

        // The RTO is still far away; only the fast resend can send sn 0 now.
        let resent = a.update(20);
        assert!(!resent.is_empty());
        for datagram in resent {
            b.input(&datagram).unwrap();
        }
        assert_eq!(drain(&mut b).len(), 6);
    }

    #[test]
    fn test_input_rejects_short_datagram() {
        let mut arq = Arq::new(&Config::default());
        assert!(matches!(arq.input(&[1, 2, 3]), Err(ErrorKind::ReceivedDataToShort)));
    }

    #[test]
    fn test_duplicate_segments_are_delivered_once() {
        let (mut a, mut b) = pair(&Config::default());
        a.send(b"once").unwrap();
        let datagrams = a.update(0);
        for datagram in &datagrams {
            b.input(datagram).unwrap();
            b.input(datagram).unwrap();
        }
        assert_eq!(drain(&mut b), vec![b"once".to_vec()]);
    }
}
