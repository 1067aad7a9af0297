//! Scripted transceiver for tests
//!
//! Events are queued up front. Every status check that doesn't find a matching
//! flag applies the next event, so each `poll` of a session consumes at most
//! one of them.

use std::collections::VecDeque;

use crate::{
    configs::Config,
    time::Instant,
    transceiver::{Status, Transceiver, TxMode, TxStart},
};

#[derive(Debug, PartialEq)]
pub struct MockError;

#[derive(Debug)]
pub enum Event {
    /// Nothing happens during this check
    Idle,
    /// The pending transmission went out at the given time
    TxDone(Instant),
    /// A good frame was received at the given time
    Rx(Vec<u8>, Instant),
    /// Reception ended without a frame
    RxFailed(Status),
}

#[derive(Debug, Default)]
pub struct MockRadio {
    pub events: VecDeque<Event>,
    pub status: Status,

    pub config: Option<Config>,
    pub antenna_delay: Option<(u16, u16)>,
    pub preamble_timeout: Option<u16>,
    pub rx_after_tx_delay: Option<u32>,
    pub rx_timeout: Option<u32>,
    pub dx_time: Option<u32>,

    /// Every frame written, in order
    pub sent: Vec<Vec<u8>>,
    pub tx_starts: Vec<(TxMode, bool)>,
    pub rx_enabled: usize,
    pub forced_idle: usize,
    /// Delayed transmissions report `TooLate`
    pub too_late: bool,
    /// `force_idle` fails
    pub broken: bool,

    rx_frame: Vec<u8>,
    rx_time: Option<Instant>,
    tx_time: Option<Instant>,
}

impl MockRadio {
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        MockRadio {
            events: events.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    fn apply(&mut self, event: Event) {
        match event {
            Event::Idle => {}
            Event::TxDone(time) => {
                self.tx_time = Some(time);
                self.status = self.status | Status::TXFRS;
            }
            Event::Rx(frame, time) => {
                self.rx_frame = frame;
                self.rx_time = Some(time);
                self.status = self.status | Status::RXFCG;
            }
            Event::RxFailed(flags) => self.status = self.status | flags,
        }
    }
}

impl Transceiver for MockRadio {
    type Error = MockError;

    fn configure(&mut self, config: &Config) -> Result<(), MockError> {
        self.config = Some(*config);
        Ok(())
    }

    fn set_antenna_delay(&mut self, rx_delay: u16, tx_delay: u16) -> Result<(), MockError> {
        self.antenna_delay = Some((rx_delay, tx_delay));
        Ok(())
    }

    fn set_rx_after_tx_delay(&mut self, uus: u32) -> Result<(), MockError> {
        self.rx_after_tx_delay = Some(uus);
        Ok(())
    }

    fn set_rx_timeout(&mut self, uus: u32) -> Result<(), MockError> {
        self.rx_timeout = Some(uus);
        Ok(())
    }

    fn set_preamble_detect_timeout(&mut self, pac: u16) -> Result<(), MockError> {
        self.preamble_timeout = Some(pac);
        Ok(())
    }

    fn write_tx_frame(&mut self, frame: &[u8]) -> Result<(), MockError> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn start_tx(&mut self, mode: TxMode, expect_response: bool) -> Result<TxStart, MockError> {
        self.tx_starts.push((mode, expect_response));

        if mode == TxMode::Delayed && self.too_late {
            return Ok(TxStart::TooLate);
        }
        Ok(TxStart::Started)
    }

    fn enable_rx(&mut self) -> Result<(), MockError> {
        self.rx_enabled += 1;
        Ok(())
    }

    fn wait_for_status(&mut self, mask: Status) -> nb::Result<Status, MockError> {
        if !self.status.intersects(mask) {
            if let Some(event) = self.events.pop_front() {
                self.apply(event);
            }
        }

        if self.status.intersects(mask) {
            Ok(self.status)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn read_rx_frame(&mut self, buffer: &mut [u8]) -> Result<usize, MockError> {
        let len = self.rx_frame.len().min(buffer.len());
        buffer[..len].copy_from_slice(&self.rx_frame[..len]);
        Ok(len)
    }

    fn tx_timestamp(&mut self) -> Result<Instant, MockError> {
        self.tx_time.ok_or(MockError)
    }

    fn rx_timestamp(&mut self) -> Result<Instant, MockError> {
        self.rx_time.ok_or(MockError)
    }

    fn set_delayed_tx_time(&mut self, dx_time: u32) -> Result<(), MockError> {
        self.dx_time = Some(dx_time);
        Ok(())
    }

    fn clear_status(&mut self, mask: Status) -> Result<(), MockError> {
        self.status = self.status & !mask;
        Ok(())
    }

    fn force_idle(&mut self) -> Result<(), MockError> {
        if self.broken {
            return Err(MockError);
        }
        self.forced_idle += 1;
        Ok(())
    }
}

/// Delay that returns at once, adding up how long it was asked to wait
#[derive(Debug, Default)]
pub struct MockDelay {
    pub waited_ns: u64,
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.waited_ns += ns as u64;
    }
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waited_ns += ns as u64;
    }
}
