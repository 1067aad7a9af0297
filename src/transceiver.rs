//! The interface the ranging engine needs from a radio driver
//!
//! A hardware backend implements [`Transceiver`] once, and the implementation
//! is injected into [`Ranging`]. The methods map one-to-one onto the
//! transceiver operations a DS-TWR exchange uses, so an implementation is
//! usually a thin layer over a register-level driver.
//!
//! All timestamps returned by the driver must already be compensated for the
//! antenna delays configured with [`Transceiver::set_antenna_delay`].
//!
//! [`Ranging`]: crate::twr::Ranging

use core::ops::{BitAnd, BitOr, Not};

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{configs::Config, time::Instant};

/// A set of event flags, laid out like the DW3000 SYS_STATUS register
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct Status(pub u32);

impl Status {
    /// No flags
    pub const NONE: Status = Status(0);
    /// Transmit Frame Sent
    pub const TXFRS: Status = Status(1 << 7);
    /// Receiver PHY Header Error
    pub const RXPHE: Status = Status(1 << 12);
    /// Receiver FCS Good
    pub const RXFCG: Status = Status(1 << 14);
    /// Receiver FCS Error
    pub const RXFCE: Status = Status(1 << 15);
    /// Receiver Reed Solomon Frame Sync Loss
    pub const RXFSL: Status = Status(1 << 16);
    /// Receiver Frame Wait Timeout
    pub const RXFTO: Status = Status(1 << 17);
    /// Leading edge detection / CIA processing error
    pub const CIAERR: Status = Status(1 << 18);
    /// Preamble Detection Timeout
    pub const RXPTO: Status = Status(1 << 21);
    /// Receiver SFD Timeout
    pub const RXSTO: Status = Status(1 << 26);
    /// Automatic Frame Filtering rejection
    pub const ARFE: Status = Status(1 << 29);

    /// All receive timeout events
    pub const ALL_RX_TO: Status = Status(Self::RXFTO.0 | Self::RXPTO.0);
    /// All receive error events
    pub const ALL_RX_ERR: Status = Status(
        Self::RXPHE.0 | Self::RXFCE.0 | Self::RXFSL.0 | Self::RXSTO.0 | Self::ARFE.0 | Self::CIAERR.0,
    );
    /// Every event a reception can end with
    pub const RX_DONE: Status = Status(Self::RXFCG.0 | Self::ALL_RX_TO.0 | Self::ALL_RX_ERR.0);

    /// Returns `true` if all flags of `other` are set
    pub fn contains(&self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag of `other` is set
    pub fn intersects(&self, other: Status) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns `true` if no flag is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl BitAnd for Status {
    type Output = Status;

    fn bitand(self, rhs: Status) -> Status {
        Status(self.0 & rhs.0)
    }
}

impl Not for Status {
    type Output = Status;

    fn not(self) -> Status {
        Status(!self.0)
    }
}

/// When a transmission starts
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum TxMode {
    /// As fast as possible
    Immediate,
    /// At the time programmed with [`Transceiver::set_delayed_tx_time`]
    Delayed,
}

/// The result of starting a transmission
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum TxStart {
    /// The transmission is under way, or scheduled
    Started,
    /// The programmed delayed TX time had already passed, nothing was sent
    TooLate,
}

/// Capabilities a radio must provide to run a ranging exchange
pub trait Transceiver {
    /// Error reported by the driver, typically a bus error
    type Error;

    /// Applies the physical layer configuration
    fn configure(&mut self, config: &Config) -> Result<(), Self::Error>;

    /// Sets the RX and TX antenna delays, in device ticks
    fn set_antenna_delay(&mut self, rx_delay: u16, tx_delay: u16) -> Result<(), Self::Error>;

    /// Sets the delay between the end of a transmission started with
    /// `expect_response` and the receiver being turned on
    fn set_rx_after_tx_delay(&mut self, uus: u32) -> Result<(), Self::Error>;

    /// Sets the receive frame wait timeout, 0 disables it
    fn set_rx_timeout(&mut self, uus: u32) -> Result<(), Self::Error>;

    /// Sets the preamble detection timeout, in multiples of the PAC size
    fn set_preamble_detect_timeout(&mut self, pac: u16) -> Result<(), Self::Error>;

    /// Writes a frame into the TX buffer
    ///
    /// The frame check sequence is appended by the hardware.
    fn write_tx_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Starts transmitting the frame in the TX buffer
    ///
    /// With `expect_response`, the receiver is enabled automatically after the
    /// frame was sent and the RX-after-TX delay elapsed.
    fn start_tx(&mut self, mode: TxMode, expect_response: bool) -> Result<TxStart, Self::Error>;

    /// Enables the receiver immediately
    fn enable_rx(&mut self) -> Result<(), Self::Error>;

    /// Checks for events
    ///
    /// Returns the current status if any flag of `mask` is set, and
    /// `WouldBlock` otherwise. Flags stay set until cleared with
    /// [`Transceiver::clear_status`].
    fn wait_for_status(&mut self, mask: Status) -> nb::Result<Status, Self::Error>;

    /// Copies the received frame into `buffer` and returns its length
    fn read_rx_frame(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error>;

    /// Returns the TX timestamp of the last transmitted frame
    fn tx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// Returns the RX timestamp of the last received frame
    fn rx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// Programs the delayed TX time
    ///
    /// `dx_time` holds bits 8 to 39 of the target device time.
    fn set_delayed_tx_time(&mut self, dx_time: u32) -> Result<(), Self::Error>;

    /// Clears the given status flags
    fn clear_status(&mut self, mask: Status) -> Result<(), Self::Error>;

    /// Aborts any ongoing RX/TX operation and returns to idle
    fn force_idle(&mut self) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_masks() {
        let status = Status::RXFCG | Status::TXFRS;

        assert!(status.contains(Status::RXFCG));
        assert!(status.intersects(Status::RX_DONE));
        assert!(!status.intersects(Status::ALL_RX_ERR));
        assert_eq!(status & !Status::RXFCG, Status::TXFRS);
        assert!(Status::NONE.is_empty());
        assert!(Status::RX_DONE.contains(Status::RXPTO | Status::RXFCE));
    }
}
