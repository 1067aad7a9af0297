use super::{Outcome, RangingError, RangingSession, State, Timestamps};
use crate::{
    frame::{FinalTimestamps, FramePayload, FunctionCode, Header, RangingFrame},
    time::{DelayedTx, Duration},
    transceiver::{Status, Transceiver, TxMode},
};

impl<'r, T> RangingSession<'r, T>
where
    T: Transceiver,
{
    /// Sends the Poll and arms the receiver for the Response
    pub(super) fn send_poll(&mut self) -> Result<(), RangingError<T::Error>> {
        let ranging = &mut *self.ranging;
        let config = ranging.config;

        ranging
            .radio
            .set_rx_after_tx_delay(config.poll_tx_to_resp_rx_delay_uus)
            .map_err(RangingError::Driver)?;
        ranging
            .radio
            .set_rx_timeout(config.resp_rx_timeout_uus)
            .map_err(RangingError::Driver)?;

        let seq = ranging.next_seq();
        let poll = RangingFrame {
            header: Header::new(seq, config.pan_id, config.peer, config.address),
            payload: FramePayload::Poll,
        };
        ranging.transmit(&poll, TxMode::Immediate, true)?;

        self.tx_confirmed = false;
        self.poll_seq = Some(seq);
        Ok(())
    }

    pub(super) fn on_response(&mut self) -> Result<Option<Outcome>, RangingError<T::Error>> {
        let Some(status) = self.check_status(Status::RX_DONE)? else {
            return Ok(None);
        };

        if !status.contains(Status::RXFCG) {
            debug!("no response, status {:#x}", status.0);
            self.ranging
                .radio
                .clear_status(Status::ALL_RX_TO | Status::ALL_RX_ERR)
                .map_err(RangingError::Driver)?;
            return Err(RangingError::Timeout);
        }

        self.ranging
            .radio
            .clear_status(Status::RXFCG | Status::TXFRS)
            .map_err(RangingError::Driver)?;

        let response = match self.ranging.receive() {
            Err(RangingError::FrameMismatch) => {
                self.discard()?;
                return Ok(None);
            }
            result => result?,
        };
        if let Err(RangingError::FrameMismatch) = self.check_frame(&response, FunctionCode::Response) {
            self.discard()?;
            return Ok(None);
        }

        let config = self.ranging.config;
        let radio = &mut self.ranging.radio;
        let poll_tx = radio.tx_timestamp().map_err(RangingError::Driver)?;
        let resp_rx = radio.rx_timestamp().map_err(RangingError::Driver)?;
        self.timestamps.poll_tx = Some(poll_tx);
        self.timestamps.resp_rx = Some(resp_rx);

        let slot = DelayedTx::after(
            resp_rx,
            Duration::from_uus(config.resp_rx_to_final_tx_delay_uus),
            config.tx_antenna_delay,
        );
        radio
            .set_delayed_tx_time(slot.dx_time)
            .map_err(RangingError::Driver)?;
        self.timestamps.final_tx = Some(slot.tx_time);

        let seq = self.ranging.next_seq();
        let final_frame = RangingFrame {
            header: Header::new(seq, config.pan_id, config.peer, config.address),
            payload: FramePayload::Final(FinalTimestamps {
                poll_tx,
                resp_rx,
                final_tx: slot.tx_time,
            }),
        };
        self.ranging.transmit(&final_frame, TxMode::Delayed, false)?;

        self.tx_confirmed = false;
        self.state = State::AwaitingFinalSent;
        debug!("response received, final scheduled at {:?}", slot.tx_time);

        Ok(None)
    }

    pub(super) fn on_final_sent(&mut self) -> Result<Option<Outcome>, RangingError<T::Error>> {
        if self.check_status(Status::TXFRS)?.is_none() {
            return Ok(None);
        }

        self.ranging
            .radio
            .clear_status(Status::TXFRS)
            .map_err(RangingError::Driver)?;

        match self.timestamps {
            Timestamps {
                poll_tx: Some(poll_tx),
                resp_rx: Some(resp_rx),
                final_tx: Some(final_tx),
                ..
            } => Ok(Some(Outcome::FinalSent {
                poll_tx,
                resp_rx,
                final_tx,
            })),
            // All three are captured before the Final is scheduled
            _ => Err(RangingError::TxError),
        }
    }
}
