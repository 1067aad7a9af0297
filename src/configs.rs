//! Configuration structs for the radio and the ranging exchange
//!
//! [`Config`] is the physical layer configuration that is handed to the
//! transceiver once, before ranging starts. Both nodes must use the same one.
//! [`RangingConfig`] holds everything the ranging state machine needs:
//! addressing, antenna delays, reply delays and timeouts.

#[cfg(feature = "defmt")]
use defmt::Format;
use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

use crate::distance::DistanceEstimator;
use crate::frame::RESPONSE_PAYLOAD_LEN;

/// Physical layer configuration
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// The channel that the radio will transmit and listen at.
    pub channel: UwbChannel,
    /// The length of the preamble. Used in TX only.
    pub preamble_length: PreambleLength,
    /// Preamble acquisition chunk size. Used in RX only.
    pub pac_size: PacSize,
    /// TX preamble code.
    pub tx_preamble_code: u8,
    /// RX preamble code.
    pub rx_preamble_code: u8,
    /// The SFD sequence that is used to transmit and detect a frame.
    pub sfd_sequence: SfdSequence,
    /// Sets the bitrate of the transmission.
    pub bitrate: BitRate,
    /// Standard or extended PHY header.
    pub phr_mode: PhrMode,
    /// Data rate of the PHY header.
    pub phr_rate: PhrRate,
    /// SFD timeout in symbols (preamble length + 1 + SFD length - PAC size).
    pub sfd_timeout: u16,
    /// Scrambled timestamp sequence mode.
    pub sts_mode: StsMode,
    /// Scrambled timestamp sequence length.
    pub sts_length: StsLength,
    /// Phase difference of arrival mode.
    pub pdoa_mode: PdoaMode,
    /// Transmit spectrum parameters.
    pub tx_rf: TxRfConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channel: Default::default(),
            preamble_length: Default::default(),
            pac_size: Default::default(),
            tx_preamble_code: 9,
            rx_preamble_code: 9,
            sfd_sequence: Default::default(),
            bitrate: Default::default(),
            phr_mode: Default::default(),
            phr_rate: Default::default(),
            sfd_timeout: 129 + 8 - 8,
            sts_mode: Default::default(),
            sts_length: Default::default(),
            pdoa_mode: Default::default(),
            tx_rf: Default::default(),
        }
    }
}

/// All the available UWB channels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UwbChannel {
    /// Channel 5
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    #[default]
    Channel5 = 0,
    /// Channel 9
    /// - Center frequency: 7987.2 Mhz
    /// - Bandwidth: 499.2 Mhz
    Channel9 = 1,
}

impl UwbChannel {
    /// Returns the center frequency of the channel in Hz
    pub fn center_frequency(&self) -> u64 {
        match self {
            UwbChannel::Channel5 => 6_489_600_000,
            UwbChannel::Channel9 => 7_987_200_000,
        }
    }
}

/// The length of the preamble, in symbols.
///
/// Longer preambles improve the reception quality and thus range, at the cost
/// of longer transmissions.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PreambleLength {
    /// 64 symbols of preamble.
    Symbols64,
    /// 128 symbols of preamble.
    #[default]
    Symbols128,
    /// 256 symbols of preamble.
    Symbols256,
    /// 512 symbols of preamble.
    Symbols512,
    /// 1024 symbols of preamble.
    Symbols1024,
    /// 2048 symbols of preamble.
    Symbols2048,
    /// 4096 symbols of preamble.
    Symbols4096,
}

impl PreambleLength {
    /// Number of preamble symbols
    pub fn symbols(&self) -> u16 {
        match self {
            PreambleLength::Symbols64 => 64,
            PreambleLength::Symbols128 => 128,
            PreambleLength::Symbols256 => 256,
            PreambleLength::Symbols512 => 512,
            PreambleLength::Symbols1024 => 1024,
            PreambleLength::Symbols2048 => 2048,
            PreambleLength::Symbols4096 => 4096,
        }
    }

    /// Gets the recommended PAC size based on the preamble length.
    pub fn recommended_pac_size(&self) -> PacSize {
        match self {
            PreambleLength::Symbols64 | PreambleLength::Symbols128 => PacSize::Symbols8,
            PreambleLength::Symbols256 | PreambleLength::Symbols512 => PacSize::Symbols16,
            PreambleLength::Symbols1024 => PacSize::Symbols32,
            PreambleLength::Symbols2048 | PreambleLength::Symbols4096 => PacSize::Symbols32,
        }
    }
}

/// Preamble acquisition chunk size
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacSize {
    /// 8 symbols, for preambles of 128 symbols or less
    #[default]
    Symbols8 = 0,
    /// 16 symbols, for 256 and 512 symbol preambles
    Symbols16 = 1,
    /// 32 symbols, for 1024 symbol preambles
    Symbols32 = 2,
    /// 4 symbols, for 64 symbol preambles
    Symbols4 = 3,
}

/// The SFD sequence
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SfdSequence {
    /// The standard 8 symbol sequence defined by the IEEE standard.
    Ieee = 0b00,
    /// Decawave-defined 8 symbol sequence.
    #[default]
    Decawave8 = 0b01,
    /// Decawave-defined 16 symbol sequence.
    Decawave16 = 0b10,
    /// IEEE 802.15.4z 4a sequence, 8 symbols.
    Ieee4z = 0b11,
}

/// The bitrate at which a message is transmitted
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitRate {
    /// 850 kilobits per second.
    Kbps850 = 0,
    /// 6.8 megabits per second.
    #[default]
    Kbps6800 = 1,
}

/// PHY header mode
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhrMode {
    /// Standard PHR, frames of up to 127 bytes
    #[default]
    Standard = 0,
    /// Extended PHR, frames of up to 1023 bytes
    Extended = 1,
}

/// PHY header rate
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PhrRate {
    /// PHR at 850 kbps
    #[default]
    Standard = 0,
    /// PHR at the data rate
    DataRate = 1,
}

/// Scrambled timestamp sequence mode
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StsMode {
    /// STS is off
    #[default]
    Off = 0,
    /// STS follows the SFD
    Mode1 = 1,
    /// STS follows the payload
    Mode2 = 2,
    /// STS, no payload
    ModeND = 3,
}

/// Scrambled timestamp sequence length, in units of 8 symbols
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StsLength {
    /// 32 symbols
    Symbols32 = 0,
    /// 64 symbols
    #[default]
    Symbols64 = 1,
    /// 128 symbols
    Symbols128 = 2,
    /// 256 symbols
    Symbols256 = 3,
    /// 512 symbols
    Symbols512 = 4,
    /// 1024 symbols
    Symbols1024 = 5,
    /// 2048 symbols
    Symbols2048 = 6,
}

/// Phase difference of arrival mode
///
/// Note that PDoA needs STS to be configured.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PdoaMode {
    /// PDoA is disabled
    #[default]
    Disabled = 0,
    /// PDoA mode 1
    Mode1 = 1,
    /// PDoA mode 3, requires the STS length to be a multiple of 128
    Mode3 = 3,
}

/// Transmit spectrum parameters
///
/// These reflect the bandwidth and power of the spectrum and can be calibrated
/// per board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxRfConfig {
    /// Pulse generator delay
    pub pg_delay: u8,
    /// TX power
    pub power: u32,
    /// Pulse generator count
    pub pg_count: u16,
}

impl Default for TxRfConfig {
    fn default() -> Self {
        TxRfConfig {
            pg_delay: 0x34,
            power: 0xfdfdfdfd,
            pg_count: 0,
        }
    }
}

/// Configuration of the ranging exchange
///
/// The addresses are from the point of view of the node that owns the config:
/// `address` is this node, `peer` is the node it ranges with. All delays are in
/// UWB microseconds (UUS).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct RangingConfig {
    /// Network id shared by both nodes
    pub pan_id: Ieee802154Pan,
    /// Short address of this node
    pub address: Ieee802154Address,
    /// Short address of the peer
    pub peer: Ieee802154Address,
    /// Opaque payload carried by Response frames
    pub response_payload: [u8; RESPONSE_PAYLOAD_LEN],

    /// TX antenna delay, in device ticks
    pub tx_antenna_delay: u16,
    /// RX antenna delay, in device ticks
    pub rx_antenna_delay: u16,

    /// Initiator: delay from the end of the Poll transmission to the receiver
    /// being enabled for the Response
    pub poll_tx_to_resp_rx_delay_uus: u32,
    /// Initiator: delay from the Response RX timestamp to the Final TX time
    pub resp_rx_to_final_tx_delay_uus: u32,
    /// Initiator: how long to wait for the Response
    pub resp_rx_timeout_uus: u32,

    /// Responder: delay from the Poll RX timestamp to the Response TX time
    pub poll_rx_to_resp_tx_delay_uus: u32,
    /// Responder: delay from the end of the Response transmission to the
    /// receiver being enabled for the Final
    pub resp_tx_to_final_rx_delay_uus: u32,
    /// Responder: how long to wait for the Final
    pub final_rx_timeout_uus: u32,

    /// Preamble detection timeout, in multiples of the PAC size
    pub preamble_timeout: u16,
    /// Microseconds to yield between two status polls while waiting
    pub poll_interval_us: u32,

    /// Converts the six timestamps into a distance
    pub estimator: DistanceEstimator,
}

impl Default for RangingConfig {
    fn default() -> Self {
        RangingConfig {
            pan_id: Ieee802154Pan(0xDECA),
            // "VE" and "WA" on the wire
            address: Ieee802154Address::Short([0x45, 0x56]),
            peer: Ieee802154Address::Short([0x41, 0x57]),
            response_payload: [0x02, 0x00, 0x00],
            tx_antenna_delay: 16385,
            rx_antenna_delay: 16385,
            poll_tx_to_resp_rx_delay_uus: 700,
            resp_rx_to_final_tx_delay_uus: 700,
            resp_rx_timeout_uus: 300,
            poll_rx_to_resp_tx_delay_uus: 900,
            resp_tx_to_final_rx_delay_uus: 500,
            final_rx_timeout_uus: 220,
            preamble_timeout: 5,
            poll_interval_us: 10,
            estimator: DistanceEstimator::default(),
        }
    }
}

impl RangingConfig {
    /// Returns the same configuration as seen from the peer
    ///
    /// Handy to configure both ends of a link from one value.
    pub fn mirrored(&self) -> Self {
        RangingConfig {
            address: self.peer,
            peer: self.address,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_swaps_addresses() {
        let config = RangingConfig::default();
        let mirrored = config.mirrored();

        assert_eq!(mirrored.address, config.peer);
        assert_eq!(mirrored.peer, config.address);
        assert_eq!(mirrored.pan_id, config.pan_id);
        assert_eq!(mirrored.mirrored(), config);
    }

    #[test]
    fn default_pac_fits_preamble() {
        let config = Config::default();

        assert_eq!(config.preamble_length.recommended_pac_size(), config.pac_size);
        assert_eq!(config.sfd_timeout, 129);
    }
}
