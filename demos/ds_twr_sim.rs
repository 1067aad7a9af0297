//! Both ends of a DS-TWR exchange over a simulated link
//!
//! Two `Transceiver`s share an `Air`: a frame sent by one node is received by
//! the other one, if its receiver is on, after a fixed time of flight. Each
//! node has its own clock offset. The Responder ends up with the distance.
//!
//! Run with `RUST_LOG=info cargo run --example ds_twr_sim --features log`.

use std::{cell::RefCell, convert::Infallible, rc::Rc};

use dw3000_twr::{
    time::TIME_MAX,
    transceiver::{Status, TxMode, TxStart},
    Config, Instant, Outcome, Ranging, RangingConfig, Role, State, Transceiver,
};
use log::info;

/// Time of flight between the two nodes, in device ticks (about 14 m)
const TIME_OF_FLIGHT: u64 = 3000;

#[derive(Default)]
struct Node {
    clock_offset: u64,
    tx_antenna_delay: u16,
    status: Status,
    rx_on: bool,
    dx_time: u32,
    tx_buffer: Vec<u8>,
    tx_time: u64,
    rx_buffer: Vec<u8>,
    rx_time: u64,
}

impl Node {
    fn local(&self, time: u64) -> u64 {
        time.wrapping_add(self.clock_offset) & TIME_MAX
    }

    fn global(&self, local: u64) -> u64 {
        local.wrapping_sub(self.clock_offset) & TIME_MAX
    }
}

/// The medium both nodes transmit on, keeping time in the reference clock
struct Air {
    now: u64,
    nodes: [Node; 2],
}

struct SimRadio {
    air: Rc<RefCell<Air>>,
    id: usize,
}

impl SimRadio {
    fn node<R>(&self, f: impl FnOnce(&mut Node) -> R) -> R {
        f(&mut self.air.borrow_mut().nodes[self.id])
    }
}

impl Transceiver for SimRadio {
    type Error = Infallible;

    fn configure(&mut self, _config: &Config) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_antenna_delay(&mut self, _rx_delay: u16, tx_delay: u16) -> Result<(), Infallible> {
        self.node(|node| node.tx_antenna_delay = tx_delay);
        Ok(())
    }

    fn set_rx_after_tx_delay(&mut self, _uus: u32) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_rx_timeout(&mut self, _uus: u32) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_preamble_detect_timeout(&mut self, _pac: u16) -> Result<(), Infallible> {
        Ok(())
    }

    fn write_tx_frame(&mut self, frame: &[u8]) -> Result<(), Infallible> {
        self.node(|node| node.tx_buffer = frame.to_vec());
        Ok(())
    }

    fn start_tx(&mut self, mode: TxMode, expect_response: bool) -> Result<TxStart, Infallible> {
        let mut air = self.air.borrow_mut();
        let now = air.now;
        let sender = &mut air.nodes[self.id];

        // Delayed frames leave at the programmed time, antenna delay included
        let departure = match mode {
            TxMode::Immediate => now,
            TxMode::Delayed => {
                let local = (((sender.dx_time & !1) as u64) << 8) + sender.tx_antenna_delay as u64;
                sender.global(local & TIME_MAX)
            }
        };
        sender.tx_time = sender.local(departure);
        sender.status = sender.status | Status::TXFRS;
        sender.rx_on = expect_response;
        let frame = sender.tx_buffer.clone();

        let receiver = &mut air.nodes[1 - self.id];
        if receiver.rx_on {
            receiver.rx_buffer = frame;
            receiver.rx_time = receiver.local(departure + TIME_OF_FLIGHT);
            receiver.status = receiver.status | Status::RXFCG;
            receiver.rx_on = false;
        }

        air.now = departure + TIME_OF_FLIGHT;
        Ok(TxStart::Started)
    }

    fn enable_rx(&mut self) -> Result<(), Infallible> {
        self.node(|node| node.rx_on = true);
        Ok(())
    }

    fn wait_for_status(&mut self, mask: Status) -> nb::Result<Status, Infallible> {
        let status = self.node(|node| node.status);
        if status.intersects(mask) {
            Ok(status)
        } else {
            Err(nb::Error::WouldBlock)
        }
    }

    fn read_rx_frame(&mut self, buffer: &mut [u8]) -> Result<usize, Infallible> {
        Ok(self.node(|node| {
            let len = node.rx_buffer.len().min(buffer.len());
            buffer[..len].copy_from_slice(&node.rx_buffer[..len]);
            len
        }))
    }

    fn tx_timestamp(&mut self) -> Result<Instant, Infallible> {
        Ok(Instant::wrapping(self.node(|node| node.tx_time)))
    }

    fn rx_timestamp(&mut self) -> Result<Instant, Infallible> {
        Ok(Instant::wrapping(self.node(|node| node.rx_time)))
    }

    fn set_delayed_tx_time(&mut self, dx_time: u32) -> Result<(), Infallible> {
        self.node(|node| node.dx_time = dx_time);
        Ok(())
    }

    fn clear_status(&mut self, mask: Status) -> Result<(), Infallible> {
        self.node(|node| node.status = node.status & !mask);
        Ok(())
    }

    fn force_idle(&mut self) -> Result<(), Infallible> {
        self.node(|node| node.rx_on = false);
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let air = Rc::new(RefCell::new(Air {
        now: 0x10_0000_0000,
        nodes: [
            Node::default(),
            Node {
                clock_offset: 0xab_cdef_0123,
                ..Node::default()
            },
        ],
    }));

    let config = RangingConfig::default();
    let mut tag = Ranging::new(
        SimRadio {
            air: air.clone(),
            id: 0,
        },
        Config::default(),
        config,
    );
    let mut anchor = Ranging::new(SimRadio { air, id: 1 }, Config::default(), config.mirrored());
    tag.init().unwrap();
    anchor.init().unwrap();

    // The anchor must be listening before the tag sends its Poll
    let mut responder = anchor.start_session(Role::Responder).unwrap();
    let mut initiator = tag.start_session(Role::Initiator).unwrap();

    while !(initiator.state().is_finished() && responder.state().is_finished()) {
        for session in [&mut responder, &mut initiator] {
            if session.state().is_finished() {
                continue;
            }

            match session.poll() {
                Ok(Outcome::FinalSent { final_tx, .. }) => {
                    info!("{:?}: final sent at {:?}", session.role(), final_tx)
                }
                Ok(Outcome::Measured(distance)) => {
                    info!("{:?}: {:.2} m", session.role(), distance.meters())
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(error)) => panic!("{:?}: {:?}", session.role(), error),
            }
        }
    }

    assert_eq!(responder.state(), State::Completed);
    info!("timestamps: {:?}", responder.timestamps());
}
