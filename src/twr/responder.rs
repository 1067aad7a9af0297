use super::{Outcome, RangingError, RangingSession, State};
use crate::{
    frame::{FramePayload, FunctionCode, Header, RangingFrame},
    time::{DelayedTx, Duration},
    transceiver::{Status, Transceiver, TxMode},
};

impl<'r, T> RangingSession<'r, T>
where
    T: Transceiver,
{
    /// Turns the receiver on until a Poll arrives
    pub(super) fn listen(&mut self) -> Result<(), RangingError<T::Error>> {
        let radio = &mut self.ranging.radio;

        radio.set_rx_timeout(0).map_err(RangingError::Driver)?;
        radio
            .clear_status(Status::RX_DONE)
            .map_err(RangingError::Driver)?;
        radio.enable_rx().map_err(RangingError::Driver)?;

        trace!("listening for polls");
        Ok(())
    }

    pub(super) fn on_poll(&mut self) -> Result<Option<Outcome>, RangingError<T::Error>> {
        let Some(status) = self.check_status(Status::RX_DONE)? else {
            return Ok(None);
        };

        // No exchange has started yet, so errors just mean listening again
        if !status.contains(Status::RXFCG) {
            trace!("rx error while listening, status {:#x}", status.0);
            self.ranging
                .radio
                .clear_status(Status::ALL_RX_TO | Status::ALL_RX_ERR)
                .map_err(RangingError::Driver)?;
            self.ranging.radio.enable_rx().map_err(RangingError::Driver)?;
            return Ok(None);
        }

        self.ranging
            .radio
            .clear_status(Status::RXFCG)
            .map_err(RangingError::Driver)?;

        let poll = match self.ranging.receive() {
            Ok(poll) => poll,
            Err(RangingError::FrameMismatch) => {
                self.discard()?;
                return Ok(None);
            }
            Err(RangingError::FrameError(error)) => {
                debug!("undecodable frame while listening: {:?}", error);
                self.discard()?;
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        if let Err(RangingError::FrameMismatch) = self.check_frame(&poll, FunctionCode::Poll) {
            self.discard()?;
            return Ok(None);
        }

        let config = self.ranging.config;
        let radio = &mut self.ranging.radio;
        let poll_rx = radio.rx_timestamp().map_err(RangingError::Driver)?;
        self.timestamps.poll_rx = Some(poll_rx);
        self.poll_seq = Some(poll.header.sequence_number);

        let slot = DelayedTx::after(
            poll_rx,
            Duration::from_uus(config.poll_rx_to_resp_tx_delay_uus),
            config.tx_antenna_delay,
        );
        radio
            .set_delayed_tx_time(slot.dx_time)
            .map_err(RangingError::Driver)?;
        radio
            .set_rx_after_tx_delay(config.resp_tx_to_final_rx_delay_uus)
            .map_err(RangingError::Driver)?;
        radio
            .set_rx_timeout(config.final_rx_timeout_uus)
            .map_err(RangingError::Driver)?;

        let seq = self.ranging.next_seq();
        let response = RangingFrame {
            header: Header::new(seq, config.pan_id, config.peer, config.address),
            payload: FramePayload::Response(config.response_payload),
        };
        self.ranging.transmit(&response, TxMode::Delayed, true)?;

        self.tx_confirmed = false;
        self.state = State::AwaitingFinal;
        debug!(
            "poll {} received, response scheduled at {:?}",
            poll.header.sequence_number,
            slot.tx_time
        );

        Ok(None)
    }

    pub(super) fn on_final(&mut self) -> Result<Option<Outcome>, RangingError<T::Error>> {
        let Some(status) = self.check_status(Status::RX_DONE)? else {
            return Ok(None);
        };

        if !status.contains(Status::RXFCG) {
            debug!("no final, status {:#x}", status.0);
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

        let final_frame = match self.ranging.receive() {
            Err(RangingError::FrameMismatch) => {
                self.discard()?;
                return Ok(None);
            }
            result => result?,
        };
        let expected_seq = self.poll_seq.map(|seq| seq.wrapping_add(1));
        let carried = match final_frame.payload {
            FramePayload::Final(carried)
                if self.check_frame(&final_frame, FunctionCode::Final).is_ok()
                    && Some(final_frame.header.sequence_number) == expected_seq =>
            {
                carried
            }
            _ => {
                debug!(
                    "discarding {:?}, seq {}",
                    final_frame.function_code(),
                    final_frame.header.sequence_number
                );
                self.discard()?;
                return Ok(None);
            }
        };

        let radio = &mut self.ranging.radio;
        let resp_tx = radio.tx_timestamp().map_err(RangingError::Driver)?;
        let final_rx = radio.rx_timestamp().map_err(RangingError::Driver)?;

        let timestamps = &mut self.timestamps;
        timestamps.resp_tx = Some(resp_tx);
        timestamps.final_rx = Some(final_rx);
        timestamps.poll_tx = Some(carried.poll_tx);
        timestamps.resp_rx = Some(carried.resp_rx);
        timestamps.final_tx = Some(carried.final_tx);

        // Captured before the Response is scheduled
        let Some(poll_rx) = timestamps.poll_rx else {
            return Err(RangingError::TxError);
        };

        let distance = self.ranging.config.estimator.estimate(
            carried.poll_tx,
            carried.resp_rx,
            resp_tx,
            poll_rx,
            carried.final_tx,
            final_rx,
        )?;

        Ok(Some(Outcome::Measured(distance)))
    }
}
