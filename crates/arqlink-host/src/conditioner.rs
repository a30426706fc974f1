use rand::{rngs::StdRng, Rng, SeedableRng};

/// Drops outgoing datagrams at random to exercise loss recovery.
///
/// Attach one to a [`UdpTransport`](crate::UdpTransport) with
/// [`with_conditioner`](crate::UdpTransport::with_conditioner). Seeded
/// conditioners drop the same datagrams on every run.
#[derive(Debug, Clone)]
pub struct LinkConditioner {
    packet_loss: f64,
    rng: StdRng,
    dropped: u64,
    passed: u64,
}

impl LinkConditioner {
    /// Creates a conditioner dropping `packet_loss` (0.0 to 1.0) of all datagrams.
    pub fn new(packet_loss: f64) -> Self {
        Self::with_seed(packet_loss, rand::random())
    }

    /// Creates a conditioner with a fixed seed.
    pub fn with_seed(packet_loss: f64, seed: u64) -> Self {
        Self { packet_loss: packet_loss.clamp(0.0, 1.0), rng: StdRng::seed_from_u64(seed), dropped: 0, passed: 0 }
    }

    /// Decides the fate of the next datagram.
    pub fn should_drop(&mut self) -> bool {
        let drop = self.rng.random_bool(self.packet_loss);
        if drop {
            self.dropped += 1;
        } else {
            self.passed += 1;
        }
        drop
    }

    /// Configured loss ratio.
    pub fn packet_loss(&self) -> f64 {
        self.packet_loss
    }

    /// Number of datagrams dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of datagrams let through so far.
    pub fn passed(&self) -> u64 {
        self.passed
    }
}
