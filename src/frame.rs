//! Ranging frames
//!
//! The three frames of a DS-TWR exchange share a 10 byte header: an
//! IEEE 802.15.4 data frame header with PAN ID compression and short source and
//! destination addresses, followed by a function code.
//!
//! | Offset | Size | Field                                     |
//! |--------|------|-------------------------------------------|
//! | 0      | 2    | frame control, `0x8841`                   |
//! | 2      | 1    | sequence number                           |
//! | 3      | 2    | PAN ID                                    |
//! | 5      | 2    | destination short address                 |
//! | 7      | 2    | source short address                      |
//! | 9      | 1    | function code                             |
//! | 10     | 3    | Response: opaque payload                  |
//! | 10     | 4    | Final: poll TX timestamp, low 32 bits     |
//! | 14     | 4    | Final: response RX timestamp, low 32 bits |
//! | 18     | 4    | Final: final TX timestamp, low 32 bits    |
//!
//! All fields are little-endian. The frame check sequence is handled by the
//! transceiver and ignored here.
//!
//! Timestamps are carried as their lower 32 bits. Ranging intervals are much
//! shorter than 2^32 ticks (about 67 ms), so the difference of two truncated
//! timestamps is the difference of the full 40-bit values.

use core::convert::TryFrom;

use byte::{BytesExt as _, LE};
#[cfg(feature = "defmt")]
use defmt::Format;
use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

use crate::time::Instant;

/// Frame control of a data frame with short addresses and PAN ID compression
pub const FRAME_CONTROL: u16 = 0x8841;

/// Length of the header shared by all frames, function code included
pub const HEADER_LEN: usize = 10;

/// Length of the opaque Response payload
pub const RESPONSE_PAYLOAD_LEN: usize = 3;

/// Length of one timestamp in a Final frame
pub const FINAL_TS_LEN: usize = 4;

/// Offset of the poll TX timestamp in a Final frame
pub const FINAL_POLL_TX_TS_IDX: usize = 10;
/// Offset of the response RX timestamp in a Final frame
pub const FINAL_RESP_RX_TS_IDX: usize = 14;
/// Offset of the final TX timestamp in a Final frame
pub const FINAL_FINAL_TX_TS_IDX: usize = 18;

/// Largest frame the standard PHY header allows
pub const MAX_FRAME_LEN: usize = 127;

const SEQ_IDX: usize = 2;
const PAN_ID_IDX: usize = 3;
const DST_IDX: usize = 5;
const SRC_IDX: usize = 7;
const FUNCTION_CODE_IDX: usize = 9;

/// An error that can occur while encoding or decoding a frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum DecodeError {
    /// The frame is shorter than its kind requires
    Truncated {
        /// Indicates how long the frame would have to be
        required_len: usize,
    },

    /// The function code is none of Poll, Response or Final
    UnknownFunctionCode(u8),

    /// Buffer too small to encode the frame into
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },

    /// Only short addresses can be encoded
    UnsupportedAddress,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Discriminates the frames of an exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[repr(u8)]
pub enum FunctionCode {
    /// Sent by the Initiator to start an exchange
    Poll = 0x21,
    /// The Responder's answer to a Poll
    Response = 0x10,
    /// The Initiator's last frame, carrying its timestamps
    Final = 0x23,
}

impl FunctionCode {
    /// The minimum length of a frame of this kind
    pub fn min_len(&self) -> usize {
        match self {
            FunctionCode::Poll => HEADER_LEN,
            FunctionCode::Response => HEADER_LEN + RESPONSE_PAYLOAD_LEN,
            FunctionCode::Final => HEADER_LEN + 3 * FINAL_TS_LEN,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = DecodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x21 => Ok(FunctionCode::Poll),
            0x10 => Ok(FunctionCode::Response),
            0x23 => Ok(FunctionCode::Final),
            code => Err(DecodeError::UnknownFunctionCode(code)),
        }
    }
}

/// The header shared by all ranging frames
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct Header {
    /// Frame control field, [`FRAME_CONTROL`] for frames we send
    pub frame_control: u16,
    /// Incremented by the transmitter for every frame, diagnostic only
    pub sequence_number: u8,
    /// Network id
    pub pan_id: Ieee802154Pan,
    /// Recipient
    pub destination: Ieee802154Address,
    /// Sender
    pub source: Ieee802154Address,
}

impl Header {
    /// Creates the header of a frame we are going to send
    pub fn new(
        sequence_number: u8,
        pan_id: Ieee802154Pan,
        destination: Ieee802154Address,
        source: Ieee802154Address,
    ) -> Self {
        Header {
            frame_control: FRAME_CONTROL,
            sequence_number,
            pan_id,
            destination,
            source,
        }
    }

    /// Parses the header of a frame
    ///
    /// The function code isn't looked at, so the addressing of any frame long
    /// enough can be checked before the frame itself is decoded.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                required_len: HEADER_LEN,
            });
        }

        let truncated = |_| DecodeError::Truncated {
            required_len: HEADER_LEN,
        };

        let read_u16 = |mut offset: usize| bytes.read_with::<u16>(&mut offset, LE).map_err(truncated);
        Ok(Header {
            frame_control: read_u16(0)?,
            sequence_number: bytes[SEQ_IDX],
            pan_id: Ieee802154Pan(read_u16(PAN_ID_IDX)?),
            destination: Ieee802154Address::Short(read_u16(DST_IDX)?.to_be_bytes()),
            source: Ieee802154Address::Short(read_u16(SRC_IDX)?.to_be_bytes()),
        })
    }

    /// Returns `true` if this is one of our frames, sent by `peer` to `address`
    /// on `pan_id`
    pub fn matches(
        &self,
        pan_id: Ieee802154Pan,
        address: Ieee802154Address,
        peer: Ieee802154Address,
    ) -> bool {
        self.frame_control == FRAME_CONTROL
            && self.pan_id == pan_id
            && self.destination == address
            && self.source == peer
    }
}

/// The timestamps the Initiator reports in its Final frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct FinalTimestamps {
    /// When the Poll left the Initiator
    pub poll_tx: Instant,
    /// When the Response arrived at the Initiator
    pub resp_rx: Instant,
    /// When the Final left the Initiator
    pub final_tx: Instant,
}

/// The part of a frame following the header
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum FramePayload {
    /// No payload
    Poll,
    /// Opaque application payload, not used for ranging
    Response([u8; RESPONSE_PAYLOAD_LEN]),
    /// Timestamps, decoded to values below 2^32
    Final(FinalTimestamps),
}

impl FramePayload {
    /// The function code identifying this payload
    pub fn function_code(&self) -> FunctionCode {
        match self {
            FramePayload::Poll => FunctionCode::Poll,
            FramePayload::Response(_) => FunctionCode::Response,
            FramePayload::Final(_) => FunctionCode::Final,
        }
    }
}

/// A ranging protocol message
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct RangingFrame {
    /// The common header
    pub header: Header,
    /// Kind specific content
    pub payload: FramePayload,
}

impl RangingFrame {
    /// The function code of this frame
    pub fn function_code(&self) -> FunctionCode {
        self.payload.function_code()
    }

    /// Encoded length of this frame
    pub fn encoded_len(&self) -> usize {
        self.function_code().min_len()
    }

    /// Writes this frame into `buffer` and returns its length
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, DecodeError> {
        let len = self.encoded_len();
        if buffer.len() < len {
            return Err(DecodeError::BufferTooSmall { required_len: len });
        }

        let header = &self.header;
        let destination = short_address(header.destination)?;
        let source = short_address(header.source)?;

        let too_small = |_| DecodeError::BufferTooSmall { required_len: len };
        let offset = &mut 0;
        buffer.write_with::<u16>(offset, header.frame_control, LE).map_err(too_small)?;
        buffer[SEQ_IDX] = header.sequence_number;
        *offset += 1;
        buffer.write_with::<u16>(offset, header.pan_id.0, LE).map_err(too_small)?;
        buffer.write_with::<u16>(offset, destination, LE).map_err(too_small)?;
        buffer.write_with::<u16>(offset, source, LE).map_err(too_small)?;
        buffer[FUNCTION_CODE_IDX] = self.function_code() as u8;
        *offset += 1;

        match &self.payload {
            FramePayload::Poll => {}
            FramePayload::Response(data) => {
                buffer[HEADER_LEN..len].copy_from_slice(data);
            }
            FramePayload::Final(timestamps) => {
                for ts in [timestamps.poll_tx, timestamps.resp_rx, timestamps.final_tx] {
                    buffer.write_with::<u32>(offset, ts.low32(), LE).map_err(too_small)?;
                }
            }
        }

        Ok(len)
    }

    /// Parses a frame
    ///
    /// Bytes following the frame, like the FCS, are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let header = Header::decode(bytes)?;

        let function_code = FunctionCode::try_from(bytes[FUNCTION_CODE_IDX])?;
        let required_len = function_code.min_len();
        if bytes.len() < required_len {
            return Err(DecodeError::Truncated { required_len });
        }

        let truncated = |_| DecodeError::Truncated { required_len };

        let payload = match function_code {
            FunctionCode::Poll => FramePayload::Poll,
            FunctionCode::Response => {
                let mut data = [0; RESPONSE_PAYLOAD_LEN];
                data.copy_from_slice(&bytes[HEADER_LEN..required_len]);
                FramePayload::Response(data)
            }
            FunctionCode::Final => {
                let mut offset = FINAL_POLL_TX_TS_IDX;
                let mut next = || {
                    bytes
                        .read_with::<u32>(&mut offset, LE)
                        .map(|ts| Instant::wrapping(ts as u64))
                        .map_err(truncated)
                };
                FramePayload::Final(FinalTimestamps {
                    poll_tx: next()?,
                    resp_rx: next()?,
                    final_tx: next()?,
                })
            }
        };

        Ok(RangingFrame { header, payload })
    }
}

/// Encodes `frame` into `buffer`, returning the frame length
pub fn encode(frame: &RangingFrame, buffer: &mut [u8]) -> Result<usize, DecodeError> {
    frame.encode(buffer)
}

/// Decodes a received frame
pub fn decode(bytes: &[u8]) -> Result<RangingFrame, DecodeError> {
    RangingFrame::decode(bytes)
}

/// The 16-bit value of a short address
///
/// `Ieee802154Address::Short` holds the big-endian form of the address.
fn short_address(address: Ieee802154Address) -> Result<u16, DecodeError> {
    let Ieee802154Address::Short(short_addr) = address else {
        return Err(DecodeError::UnsupportedAddress);
    };

    Ok(u16::from_be_bytes(short_addr))
}
