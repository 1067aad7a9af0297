//! Double-sided two-way ranging for DW3000-class UWB transceivers
//!
//! Two nodes measure their distance by exchanging three frames, Poll,
//! Response and Final, and combining the six hardware timestamps of the
//! exchange. The result is insensitive to the frequency offset between the two
//! nodes' crystals.
//!
//! The [ranging engine] drives an exchange in either role. It talks to the
//! radio through the [`Transceiver`] trait, which a hardware backend
//! implements on top of its register-level driver. The [frame codec],
//! [time conversions] and [distance arithmetic] can be used on their own.
//!
//! The engine is built on top of [`nb`] and [`embedded-hal`], like the DW3000
//! driver crates, so it runs on any platform and with or without an executor.
//!
//! [ranging engine]: twr/index.html
//! [frame codec]: frame/index.html
//! [time conversions]: time/index.html
//! [distance arithmetic]: distance/index.html
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "async")]
use maybe_async::must_be_async as maybe_async_attr;
#[cfg(not(feature = "async"))]
use maybe_async::must_be_sync as maybe_async_attr;

#[cfg(not(feature = "async"))]
use embedded_hal as delay_type;
#[cfg(feature = "async")]
use embedded_hal_async as delay_type;

// Must come first, the other modules use its macros
#[macro_use]
mod fmt;

pub mod configs;
pub mod distance;
pub mod frame;
pub mod time;
pub mod transceiver;
pub mod twr;

#[cfg(test)]
mod mock;

/// Redirection of nb::block
pub mod block {
    pub use nb::block;
}

pub use crate::{
    block::block,
    configs::{Config, RangingConfig},
    distance::{estimate, Distance, DistanceError, DistanceEstimator},
    frame::{decode, encode, DecodeError, RangingFrame},
    time::{from_device_ticks, to_device_ticks, Duration, Instant},
    transceiver::{Status, Transceiver, TxMode, TxStart},
    twr::{Outcome, Ranging, RangingError, RangingSession, Role, State},
};
