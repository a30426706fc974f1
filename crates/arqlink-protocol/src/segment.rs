use std::io::{Cursor, Read};

use arqlink_core::{
    constants::SEGMENT_HEADER_SIZE,
    error::{ErrorKind, Result},
};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

/// Kind of an ARQ segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Carries (a fragment of) a message.
    Push,
    /// Acknowledges one pushed segment.
    Ack,
    /// Asks the peer to advertise its receive window.
    WindowProbe,
    /// Advertises the receive window.
    WindowTell,
}

impl Command {
    fn to_u8(self) -> u8 {
        match self {
            Command::Push => 1,
            Command::Ack => 2,
            Command::WindowProbe => 3,
            Command::WindowTell => 4,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Command::Push),
            2 => Ok(Command::Ack),
            3 => Ok(Command::WindowProbe),
            4 => Ok(Command::WindowTell),
            other => Err(ErrorKind::CouldNotReadHeader(format!("unknown segment command {}", other))),
        }
    }
}

/// A single ARQ segment.
///
/// Wire layout, big-endian:
///
/// ```text
/// | cmd u8 | frg u8 | wnd u16 | ts u32 | sn u32 | una u32 | len u32 | data ... |
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Segment kind.
    pub cmd: Command,
    /// Number of fragments that follow this one in the same message.
    pub frg: u8,
    /// Sender's free receive window.
    pub wnd: u16,
    /// Send timestamp in engine milliseconds, echoed back by acks.
    pub ts: u32,
    /// Sequence number.
    pub sn: u32,
    /// Sender's next expected sequence number (cumulative ack).
    pub una: u32,
    /// Payload.
    pub data: Vec<u8>,
}

impl Segment {
    /// Creates a push segment carrying `data`. Header fields are filled in
    /// when the segment is sent.
    pub fn push(data: Vec<u8>, frg: u8) -> Self {
        Self { cmd: Command::Push, frg, wnd: 0, ts: 0, sn: 0, una: 0, data }
    }

    /// Creates a control segment without payload.
    pub fn control(cmd: Command, sn: u32, ts: u32, wnd: u16, una: u32) -> Self {
        Self { cmd, frg: 0, wnd, ts, sn, una, data: Vec::new() }
    }

    /// Encoded size of this segment.
    pub fn encoded_len(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.data.len()
    }

    /// Appends the encoded segment to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        header[0] = self.cmd.to_u8();
        header[1] = self.frg;
        BigEndian::write_u16(&mut header[2..4], self.wnd);
        BigEndian::write_u32(&mut header[4..8], self.ts);
        BigEndian::write_u32(&mut header[8..12], self.sn);
        BigEndian::write_u32(&mut header[12..16], self.una);
        BigEndian::write_u32(&mut header[16..20], self.data.len() as u32);
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.data);
    }

    /// Decodes the next segment from `cursor`.
    pub fn decode(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let read_err = |e: std::io::Error| ErrorKind::CouldNotReadHeader(e.to_string());

        let cmd = Command::from_u8(cursor.read_u8().map_err(read_err)?)?;
        let frg = cursor.read_u8().map_err(read_err)?;
        let wnd = cursor.read_u16::<BigEndian>().map_err(read_err)?;
        let ts = cursor.read_u32::<BigEndian>().map_err(read_err)?;
        let sn = cursor.read_u32::<BigEndian>().map_err(read_err)?;
        let una = cursor.read_u32::<BigEndian>().map_err(read_err)?;
        let len = cursor.read_u32::<BigEndian>().map_err(read_err)? as usize;

        let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
        if len > remaining {
            return Err(ErrorKind::CouldNotReadHeader(format!(
                "segment announces {} bytes but only {} remain",
                len, remaining
            )));
        }
        let mut data = vec![0u8; len];
        cursor.read_exact(&mut data).map_err(read_err)?;

        Ok(Self { cmd, frg, wnd, ts, sn, una, data })
    }
}
