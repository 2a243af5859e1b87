/*!
    byte stuffed framing of packets on the bus

    A packet on the wire is its payload, a [Trailer] (command byte then id byte), and an additive checksum of all these, followed by the [HEADER] byte terminating the packet. Any of these bytes equal to [HEADER] or [ESCAPE] is sent as [ESCAPE] followed by the byte with bit 0 flipped, so a raw [HEADER] byte always ends a packet and the stream resynchronizes on it.

    The expected packet length is derived from the command's declared size, so any garbage preceding a packet (such as padding) is ignored by the receiver.
*/

use log::*;
use packbytes::{FromBytes, ToBytes};

use crate::command::{Command, Trailer, Channel};


/// byte terminating every packet
pub const HEADER: u8 = 0xAA;
/// byte announcing that the next byte has its bit 0 flipped
pub const ESCAPE: u8 = 0x55;

/// biggest payload a packet can carry
pub const MAX_PAYLOAD: usize = 8;
/// biggest packet on the wire: every byte of payload, trailer and checksum escaped, plus the header
pub const MAX_FRAME: usize = 2 * (MAX_PAYLOAD + 3) + 1;
/// bytes buffered while waiting for a header, data beyond is discarded
const RECEIVE_CAPACITY: usize = 1024;


/// additive checksum used by the bus
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// the packet does not fit in a frame
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Overflow;

/// packet escaped and terminated, ready to be sent
#[derive(Clone, Debug, Default)]
pub struct Frame {
    bytes: heapless::Vec<u8, MAX_FRAME>,
}
impl Frame {
    /// frame the given payload and trailer
    pub fn encode(payload: &[u8], trailer: Trailer) -> Result<Self, Overflow> {
        if payload.len() > MAX_PAYLOAD
            {return Err(Overflow)}
        let mut frame = Self::default();
        let trailer = trailer.to_le_bytes();
        let mut sum = 0u8;
        for &byte in payload.iter().chain(trailer.iter()) {
            sum = sum.wrapping_add(byte);
            frame.push_escaped(byte)?;
        }
        frame.push_escaped(sum)?;
        frame.bytes.push(HEADER).map_err(|_| Overflow)?;
        Ok(frame)
    }
    fn push_escaped(&mut self, byte: u8) -> Result<(), Overflow> {
        if byte == HEADER || byte == ESCAPE {
            self.bytes.push(ESCAPE).map_err(|_| Overflow)?;
            self.bytes.push(byte ^ 1).map_err(|_| Overflow)?;
        }
        else {
            self.bytes.push(byte).map_err(|_| Overflow)?;
        }
        Ok(())
    }
    pub fn as_bytes(&self) -> &[u8] {&self.bytes}
    /// number of zero bytes to send ahead of this frame so that the whole is at least `minimum` bytes long
    pub fn padding(&self, minimum: usize) -> usize {
        minimum.saturating_sub(self.bytes.len())
    }
}


/// packet received and validated
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub trailer: Trailer,
    /// payload in wire order
    pub payload: heapless::Vec<u8, MAX_PAYLOAD>,
}
impl Packet {
    /// raw command id, without the flag bit
    pub fn command_id(&self) -> u8 {self.trailer.command.command().value()}
    pub fn command(&self) -> Option<Command> {Command::from_id(self.command_id())}
    /// has-message flag for a packet from a board
    pub fn flag(&self) -> bool {self.trailer.command.flag()}
    pub fn board(&self) -> u8 {self.trailer.id.board().value()}
    pub fn channel(&self) -> Channel {self.trailer.id.channel()}

    /// last payload byte
    pub fn byte_from_back(&self) -> Option<u8> {
        self.payload.last().copied()
    }
    /**
        little endian integer in the payload, counted from its end

        `index` 0 is the last 4 bytes, 1 the 4 bytes before
    */
    pub fn int_from_back(&self, index: usize) -> Option<i32> {
        let end = self.payload.len().checked_sub(4 * index)?;
        let start = end.checked_sub(4)?;
        let bytes: [u8; 4] = self.payload[start .. end].try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }
}


/**
    de-framing state machine, fed one received byte at a time

    malformed packets are dropped and counted, never reported as errors
*/
pub struct Decoder {
    buffer: heapless::Vec<u8, RECEIVE_CAPACITY>,
    escaped: bool,
    bad_checksums: u32,
    malformed: u32,
}
impl Default for Decoder {
    fn default() -> Self {Self::new()}
}
impl Decoder {
    pub const fn new() -> Self {
        Self {
            buffer: heapless::Vec::new(),
            escaped: false,
            bad_checksums: 0,
            malformed: 0,
        }
    }
    /// number of packets dropped because of their checksum since creation
    pub fn bad_checksums(&self) -> u32 {self.bad_checksums}
    /// number of packets dropped because too short or too long since creation
    pub fn malformed(&self) -> u32 {self.malformed}

    /// process one received byte, return a packet when this byte completes a valid one
    pub fn push(&mut self, byte: u8) -> Option<Packet> {
        match byte {
            HEADER => {
                let packet = self.complete();
                self.buffer.clear();
                self.escaped = false;
                packet
            },
            ESCAPE => {
                self.escaped = true;
                None
            },
            _ => {
                let byte = if self.escaped {byte ^ 1} else {byte};
                self.escaped = false;
                if self.buffer.push(byte).is_err() {
                    debug!("receive buffer full, dropping {} bytes", self.buffer.len());
                    self.buffer.clear();
                    self.malformed += 1;
                }
                None
            },
        }
    }

    fn complete(&mut self) -> Option<Packet> {
        if self.buffer.is_empty()
            {return None}
        // command, id and checksum at least
        if self.buffer.len() < 3 {
            debug!("packet stub received");
            self.malformed += 1;
            return None
        }
        let (&received, body) = self.buffer.split_last()?;
        let command = body[body.len() - 2] & 0x7f;
        let expected = match Command::from_id(command) {
            Some(command) => 2 + command.size().bytes(),
            // unknown commands are passed up whole, the dispatcher decides
            None => body.len(),
        };
        if body.len() < expected || expected > MAX_PAYLOAD + 2 {
            warn!("improper packet size {} for command {}", body.len(), command);
            self.malformed += 1;
            return None
        }
        let packet = &body[body.len() - expected ..];
        let calculated = checksum(packet);
        if calculated != received {
            warn!("packet with bad checksum received, calculated: {}, received: {}", calculated, received);
            self.bad_checksums += 1;
            return None
        }
        let (payload, trailer) = packet.split_at(expected - 2);
        Some(Packet {
            trailer: Trailer::from_le_bytes([trailer[0], trailer[1]]),
            payload: heapless::Vec::from_slice(payload).ok()?,
        })
    }
}
