//! Double-sided two-way ranging
//!
//! The entry point is [`Ranging`], which owns a [`Transceiver`] and the
//! [`RangingConfig`]. Every exchange runs in a [`RangingSession`], created by
//! [`Ranging::start_session`]:
//!
//! - An Initiator sends a Poll, waits for the Response and sends a Final
//!   carrying its own timestamps. It doesn't learn the distance.
//! - A Responder listens for a Poll, answers with a Response and computes the
//!   distance once the Final arrives.
//!
//! A session is driven by [`RangingSession::poll`], which handles at most one
//! radio event per call and returns `WouldBlock` in between, like the methods
//! of `nb`-based drivers. [`RangingSession::wait`] polls until the exchange is
//! over.
//!
//! ``` rust
//! use dw3000_twr::{
//!     twr::{Outcome, Ranging, Role},
//!     Config, RangingConfig, Transceiver,
//! };
//!
//! fn measure<T: Transceiver>(radio: T) -> Option<f64> {
//!     let mut ranging = Ranging::new(radio, Config::default(), RangingConfig::default());
//!     ranging.init().ok()?;
//!
//!     let mut session = ranging.start_session(Role::Responder).ok()?;
//!     match nb::block!(session.poll()) {
//!         Ok(Outcome::Measured(distance)) => Some(distance.meters()),
//!         _ => None,
//!     }
//! }
//! ```

use core::num::Wrapping;

#[cfg(feature = "defmt")]
use defmt::Format;
use smoltcp::wire::Ieee802154Address;

pub use error::*;

use crate::{
    configs::{Config, RangingConfig},
    delay_type,
    distance::Distance,
    frame::{FunctionCode, Header, RangingFrame, MAX_FRAME_LEN},
    maybe_async_attr,
    time::Instant,
    transceiver::{Status, Transceiver, TxMode, TxStart},
};

mod error;
mod initiator;
mod responder;

/// Every event a session waits for
const EXCHANGE_EVENTS: Status = Status(Status::TXFRS.0 | Status::RX_DONE.0);

/// The part a node plays in an exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Role {
    /// Starts the exchange with a Poll
    Initiator,
    /// Answers Polls and computes the distance
    Responder,
}

/// The state of a session
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum State {
    /// Initiator: the Poll was sent, the receiver waits for the Response
    AwaitingResponse,
    /// Initiator: the Final is scheduled
    AwaitingFinalSent,
    /// Responder: listening for a Poll
    AwaitingPoll,
    /// Responder: the Response is scheduled, the receiver will wait for the
    /// Final
    AwaitingFinal,
    /// The exchange is over
    Completed,
    /// The exchange failed and won't be resumed
    Failed(Failure),
    /// The exchange was cancelled
    Cancelled,
}

impl State {
    /// Returns `true` if the session won't make any more progress
    pub fn is_finished(&self) -> bool {
        matches!(self, State::Completed | State::Failed(_) | State::Cancelled)
    }
}

/// What a completed session yields
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Outcome {
    /// Initiator: the Final was sent, carrying these timestamps
    FinalSent {
        /// When the Poll was sent
        poll_tx: Instant,
        /// When the Response was received
        resp_rx: Instant,
        /// When the Final was sent
        final_tx: Instant,
    },
    /// Responder: the measured distance
    Measured(Distance),
}

/// The timestamps captured during an exchange
///
/// Each node only ever sees its own three, plus the Initiator's three on the
/// Responder once the Final arrives.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct Timestamps {
    /// Poll TX, Initiator clock
    pub poll_tx: Option<Instant>,
    /// Poll RX, Responder clock
    pub poll_rx: Option<Instant>,
    /// Response TX, Responder clock
    pub resp_tx: Option<Instant>,
    /// Response RX, Initiator clock
    pub resp_rx: Option<Instant>,
    /// Final TX, Initiator clock
    pub final_tx: Option<Instant>,
    /// Final RX, Responder clock
    pub final_rx: Option<Instant>,
}

impl Timestamps {
    /// Returns `true` if no timestamp was captured yet
    pub fn is_empty(&self) -> bool {
        *self == Timestamps::default()
    }
}

/// Ranging engine, owning the transceiver
pub struct Ranging<T> {
    radio: T,
    phy: Config,
    config: RangingConfig,
    seq: Wrapping<u8>,
}

impl<T> Ranging<T>
where
    T: Transceiver,
{
    /// Creates the engine. Call [`Ranging::init`] before the first session.
    pub fn new(radio: T, phy: Config, config: RangingConfig) -> Self {
        Ranging {
            radio,
            phy,
            config,
            seq: Wrapping(0),
        }
    }

    /// Configures the transceiver
    ///
    /// Applies the PHY configuration, the antenna delays and the preamble
    /// detection timeout. Fails with `InvalidConfiguration` unless both
    /// addresses are short addresses.
    pub fn init(&mut self) -> Result<(), RangingError<T::Error>> {
        let (Ieee802154Address::Short(_), Ieee802154Address::Short(_)) =
            (self.config.address, self.config.peer)
        else {
            return Err(RangingError::InvalidConfiguration);
        };

        self.radio.configure(&self.phy).map_err(RangingError::Driver)?;
        self.radio
            .set_antenna_delay(self.config.rx_antenna_delay, self.config.tx_antenna_delay)
            .map_err(RangingError::Driver)?;
        self.radio
            .set_preamble_detect_timeout(self.config.preamble_timeout)
            .map_err(RangingError::Driver)?;

        debug!("ranging initialized, pan {:#x}", self.config.pan_id.0);
        Ok(())
    }

    /// Starts an exchange
    ///
    /// An Initiator sends its Poll right away, a Responder starts listening.
    /// The session borrows the engine, so only one exchange can run at a
    /// time.
    pub fn start_session(
        &mut self,
        role: Role,
    ) -> Result<RangingSession<'_, T>, RangingError<T::Error>> {
        let mut session = RangingSession {
            ranging: self,
            role,
            state: match role {
                Role::Initiator => State::AwaitingResponse,
                Role::Responder => State::AwaitingPoll,
            },
            poll_seq: None,
            tx_confirmed: true,
            timestamps: Timestamps::default(),
            outcome: None,
        };

        let started = match role {
            Role::Initiator => session.send_poll(),
            Role::Responder => session.listen(),
        };
        if let Err(error) = started {
            session.fail(&error);
            return Err(error);
        }

        Ok(session)
    }

    /// The sequence number of the next frame sent
    pub fn seq(&self) -> u8 {
        self.seq.0
    }

    /// The ranging configuration
    pub fn config(&self) -> &RangingConfig {
        &self.config
    }

    /// Direct access to the transceiver
    pub fn radio(&mut self) -> &mut T {
        &mut self.radio
    }

    /// Releases the transceiver
    pub fn release(self) -> T {
        self.radio
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq.0;
        self.seq += Wrapping(1);
        seq
    }

    /// Writes `frame` to the transceiver and starts sending it
    fn transmit(
        &mut self,
        frame: &RangingFrame,
        mode: TxMode,
        expect_response: bool,
    ) -> Result<(), RangingError<T::Error>> {
        let mut buffer = [0; MAX_FRAME_LEN];
        let len = frame.encode(&mut buffer)?;

        self.radio
            .write_tx_frame(&buffer[..len])
            .map_err(RangingError::Driver)?;

        match self
            .radio
            .start_tx(mode, expect_response)
            .map_err(RangingError::Driver)?
        {
            TxStart::Started => {
                trace!("sending {:?}, seq {}", frame.function_code(), frame.header.sequence_number);
                Ok(())
            }
            TxStart::TooLate => {
                warn!("{:?} scheduled too late", frame.function_code());
                Err(RangingError::TxError)
            }
        }
    }

    /// Reads and decodes the frame that was just received
    ///
    /// The addressing is checked first: a frame that isn't sent to us by our
    /// peer is a `FrameMismatch`, whether its content can be decoded or not.
    fn receive(&mut self) -> Result<RangingFrame, RangingError<T::Error>> {
        let mut buffer = [0; MAX_FRAME_LEN];
        let len = self
            .radio
            .read_rx_frame(&mut buffer)
            .map_err(RangingError::Driver)?;
        let bytes = &buffer[..len.min(MAX_FRAME_LEN)];

        let header = Header::decode(bytes)?;
        let config = &self.config;
        if !header.matches(config.pan_id, config.address, config.peer) {
            debug!(
                "discarding frame from {:?}, seq {}",
                header.source,
                header.sequence_number
            );
            return Err(RangingError::FrameMismatch);
        }

        Ok(RangingFrame::decode(bytes)?)
    }

    /// Returns the radio to idle and clears all flags of the exchange
    fn reset_radio(&mut self) -> Result<(), T::Error> {
        self.radio.force_idle()?;
        self.radio.clear_status(EXCHANGE_EVENTS)
    }
}

/// A single ranging exchange in progress
pub struct RangingSession<'r, T> {
    ranging: &'r mut Ranging<T>,
    role: Role,
    state: State,
    poll_seq: Option<u8>,
    /// The last frame sent is out, the receiver is on
    tx_confirmed: bool,
    timestamps: Timestamps,
    outcome: Option<Outcome>,
}

impl<'r, T> RangingSession<'r, T>
where
    T: Transceiver,
{
    /// Advances the exchange
    ///
    /// Handles at most one radio event. Returns `WouldBlock` while the
    /// exchange is in progress and the outcome once it's completed. Frames
    /// that don't belong to the exchange are discarded on the way.
    ///
    /// Once the session failed, the error is returned once and
    /// `RangingError::Finished` afterwards. [`RangingSession::state`] keeps
    /// the reason.
    pub fn poll(&mut self) -> nb::Result<Outcome, RangingError<T::Error>> {
        let result = match self.state {
            State::AwaitingResponse => self.on_response(),
            State::AwaitingFinalSent => self.on_final_sent(),
            State::AwaitingPoll => self.on_poll(),
            State::AwaitingFinal => self.on_final(),
            State::Completed => return self.outcome.ok_or(nb::Error::Other(RangingError::Finished)),
            State::Failed(_) | State::Cancelled => {
                return Err(nb::Error::Other(RangingError::Finished))
            }
        };

        match result {
            Ok(Some(outcome)) => {
                self.state = State::Completed;
                self.outcome = Some(outcome);
                info!("{:?} completed: {:?}", self.role, outcome);
                Ok(outcome)
            }
            Ok(None) => Err(nb::Error::WouldBlock),
            Err(error) => {
                self.fail(&error);
                Err(nb::Error::Other(error))
            }
        }
    }

    /// Polls until the exchange is over
    ///
    /// Yields for the configured poll interval between two polls.
    #[maybe_async_attr]
    pub async fn wait<D>(&mut self, delay: &mut D) -> Result<Outcome, RangingError<T::Error>>
    where
        D: delay_type::delay::DelayNs,
    {
        let interval = self.ranging.config.poll_interval_us;

        loop {
            match self.poll() {
                Ok(outcome) => return Ok(outcome),
                Err(nb::Error::Other(error)) => return Err(error),
                Err(nb::Error::WouldBlock) => delay.delay_us(interval).await,
            }
        }
    }

    /// Cancels the exchange
    ///
    /// Only possible while the radio is listening. Returns `WouldBlock` while
    /// a frame is being sent, try again once it's out. Cancelling a finished
    /// session does nothing.
    pub fn cancel(&mut self) -> nb::Result<(), RangingError<T::Error>> {
        match self.state {
            State::Completed | State::Failed(_) | State::Cancelled => return Ok(()),
            State::AwaitingFinalSent => return Err(nb::Error::WouldBlock),
            State::AwaitingResponse | State::AwaitingFinal if !self.tx_confirmed => {
                // The receiver is only turned on once the preceding frame is out
                match self.ranging.radio.wait_for_status(Status::TXFRS) {
                    Ok(_) => self.tx_confirmed = true,
                    Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
                    Err(nb::Error::Other(error)) => {
                        return Err(nb::Error::Other(RangingError::Driver(error)))
                    }
                }
            }
            State::AwaitingResponse | State::AwaitingFinal | State::AwaitingPoll => {}
        }

        self.ranging
            .reset_radio()
            .map_err(|error| nb::Error::Other(RangingError::Driver(error)))?;
        self.state = State::Cancelled;
        debug!("{:?} cancelled", self.role);

        Ok(())
    }

    /// The role of this node
    pub fn role(&self) -> Role {
        self.role
    }

    /// The current state
    pub fn state(&self) -> State {
        self.state
    }

    /// The timestamps captured so far
    pub fn timestamps(&self) -> &Timestamps {
        &self.timestamps
    }

    /// The sequence number of this exchange's Poll, once it's known
    pub fn sequence_number(&self) -> Option<u8> {
        self.poll_seq
    }

    /// Ends the session with `error`, if it is a terminal one
    fn fail(&mut self, error: &RangingError<T::Error>) {
        let Some(failure) = Failure::from_error(error) else {
            return;
        };

        warn!("{:?} failed: {:?}", self.role, failure);
        self.state = State::Failed(failure);

        // Best effort, the error that ended the session is what gets reported
        if self.ranging.reset_radio().is_err() {
            warn!("could not reset radio");
        }
    }

    /// Checks for events in `mask`, `None` if there are none yet
    fn check_status(&mut self, mask: Status) -> Result<Option<Status>, RangingError<T::Error>> {
        match self.ranging.radio.wait_for_status(mask) {
            Ok(status) => {
                // Receptions only start once the preceding frame is out
                if status.intersects(EXCHANGE_EVENTS) {
                    self.tx_confirmed = true;
                }
                Ok(Some(status))
            }
            Err(nb::Error::WouldBlock) => Ok(None),
            Err(nb::Error::Other(error)) => Err(RangingError::Driver(error)),
        }
    }

    /// Fails with `FrameMismatch` unless `frame` is a `function_code` frame
    ///
    /// The addressing was already checked by [`Ranging::receive`].
    fn check_frame(
        &self,
        frame: &RangingFrame,
        function_code: FunctionCode,
    ) -> Result<(), RangingError<T::Error>> {
        if frame.function_code() != function_code {
            debug!(
                "discarding {:?}, seq {}",
                frame.function_code(),
                frame.header.sequence_number
            );
            return Err(RangingError::FrameMismatch);
        }

        Ok(())
    }

    /// Drops the received frame and turns the receiver back on
    fn discard(&mut self) -> Result<(), RangingError<T::Error>> {
        self.ranging.radio.enable_rx().map_err(RangingError::Driver)
    }
}
