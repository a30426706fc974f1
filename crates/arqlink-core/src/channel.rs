/// Delivery channel a message is sent on.
///
/// The engine runs a single reliable ARQ stream per connection. Unreliable
/// messages bypass it and travel as one raw datagram each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// Ordered, retransmitted delivery through the ARQ stream.
    #[default]
    Reliable,
    /// Best-effort delivery limited to a single datagram.
    Unreliable,
}

impl Channel {
    /// Framework channel id of the reliable channel.
    pub const RELIABLE_ID: u8 = 0;
    /// Framework channel id of the unreliable channel.
    pub const UNRELIABLE_ID: u8 = 1;

    /// Maps a framework channel id onto a channel.
    ///
    /// Only `UNRELIABLE_ID` selects the unreliable channel; every other id is
    /// delivered reliably.
    pub fn from_id(id: u8) -> Self {
        match id {
            Self::UNRELIABLE_ID => Channel::Unreliable,
            _ => Channel::Reliable,
        }
    }

    /// Returns the framework channel id for this channel.
    pub fn id(self) -> u8 {
        match self {
            Channel::Reliable => Self::RELIABLE_ID,
            Channel::Unreliable => Self::UNRELIABLE_ID,
        }
    }
}

impl From<u8> for Channel {
    fn from(id: u8) -> Self {
        Self::from_id(id)
    }
}
