// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Half-duplex transport: request framing, CRC, session and heartbeat.

use byteorder::{BigEndian, ByteOrder};

use crate::{
    frame::*,
    timebase::{Timebase, us_to_100ns},
};

/// Reception state machine.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    WaitForCommand,
    WaitForSubfunction,
    WaitForLength,
    WaitForData,
    WaitForCrc,
    WaitForProcess,
    Error,
}

/// Timing parameters of the transport.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommConfig {
    pub rx_timeout_us: u32,
    pub heartbeat_timeout_us: u32,
    /// First session id handed out.
    pub session_counter_seed: u32,
}

/// Transport and session layer over caller-owned buffers.
#[derive(Debug)]
pub struct CommHandler<'a> {
    rx_buffer: &'a mut [u8],
    tx_buffer: &'a mut [u8],
    config: CommConfig,
    timebase: Timebase,
    enabled: bool,

    rx_state: RxState,
    rx_error: RxError,
    command_id: u8,
    subfunction_id: u8,
    data_length: u16,
    crc: u32,
    length_bytes_received: u8,
    data_bytes_received: usize,
    crc_bytes_received: u8,
    request_received: bool,
    last_rx_timestamp: u32,

    tx_error: TxError,
    transmitting: bool,
    tx_header: [u8; RESPONSE_HEADER_SIZE],
    tx_crc: [u8; CRC_SIZE],
    tx_data_length: usize,
    nbytes_sent: usize,

    session_active: bool,
    session_id: u32,
    session_counter: u32,
    heartbeat_timestamp: u32,
    last_heartbeat_challenge: Option<u16>,
}

impl<'a> CommHandler<'a> {
    pub fn new(rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8], config: CommConfig) -> Self {
        Self {
            rx_buffer,
            tx_buffer,
            config,
            timebase: Timebase::new(),
            enabled: true,
            rx_state: RxState::WaitForCommand,
            rx_error: RxError::None,
            command_id: 0,
            subfunction_id: 0,
            data_length: 0,
            crc: 0,
            length_bytes_received: 0,
            data_bytes_received: 0,
            crc_bytes_received: 0,
            request_received: false,
            last_rx_timestamp: 0,
            tx_error: TxError::None,
            transmitting: false,
            tx_header: [0; RESPONSE_HEADER_SIZE],
            tx_crc: [0; CRC_SIZE],
            tx_data_length: 0,
            nbytes_sent: 0,
            session_active: false,
            session_id: 0,
            session_counter: config.session_counter_seed,
            heartbeat_timestamp: 0,
            last_heartbeat_challenge: None,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop the transport; the session and any pending exchange are dropped.
    pub fn disable(&mut self) {
        self.reset();
        self.enabled = false;
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Update the clock and drop the session when the heartbeat watchdog
    /// expires.
    pub fn process(&mut self, timebase: &Timebase) {
        self.timebase = *timebase;
        if self.session_active
            && self.timebase.has_expired(
                self.heartbeat_timestamp,
                us_to_100ns(self.config.heartbeat_timeout_us),
            )
        {
            log::warn!("Heartbeat timeout, dropping session 0x{:08X}", self.session_id);
            self.reset();
        }
    }

    /// Feed bytes received from the link.
    pub fn receive_data(&mut self, data: &[u8]) {
        if !self.enabled {
            self.rx_error = RxError::Disabled;
            return;
        }
        if self.transmitting || data.is_empty() {
            return;
        }

        if self.rx_state != RxState::WaitForCommand
            && self.rx_state != RxState::WaitForProcess
            && self.timebase.has_expired(
                self.last_rx_timestamp,
                us_to_100ns(self.config.rx_timeout_us),
            )
        {
            log::debug!("Reception timeout in state {:?}", self.rx_state);
            self.reset_rx();
        }
        self.last_rx_timestamp = self.timebase.timestamp();

        let mut i = 0;
        while i < data.len() {
            match self.rx_state {
                RxState::WaitForCommand => {
                    self.command_id = data[i] & 0x7F;
                    self.rx_state = RxState::WaitForSubfunction;
                    i += 1;
                }
                RxState::WaitForSubfunction => {
                    self.subfunction_id = data[i];
                    self.rx_state = RxState::WaitForLength;
                    i += 1;
                }
                RxState::WaitForLength => {
                    self.data_length = (self.data_length << 8) | u16::from(data[i]);
                    self.length_bytes_received += 1;
                    i += 1;
                    if self.length_bytes_received == 2 {
                        if usize::from(self.data_length) > self.rx_buffer.len() {
                            log::warn!(
                                "Request of {} bytes exceeds the reception buffer",
                                self.data_length
                            );
                            self.rx_error = RxError::Overflow;
                            self.rx_state = RxState::Error;
                        } else if self.data_length == 0 {
                            self.rx_state = RxState::WaitForCrc;
                        } else {
                            self.rx_state = RxState::WaitForData;
                        }
                    }
                }
                RxState::WaitForData => {
                    let expected = usize::from(self.data_length) - self.data_bytes_received;
                    let n = expected.min(data.len() - i);
                    let start = self.data_bytes_received;
                    self.rx_buffer[start..start + n].copy_from_slice(&data[i..i + n]);
                    self.data_bytes_received += n;
                    i += n;
                    if self.data_bytes_received == usize::from(self.data_length) {
                        self.rx_state = RxState::WaitForCrc;
                    }
                }
                RxState::WaitForCrc => {
                    self.crc = (self.crc << 8) | u32::from(data[i]);
                    self.crc_bytes_received += 1;
                    i += 1;
                    if self.crc_bytes_received == 4 {
                        self.complete_reception();
                    }
                }
                // A pending request or a failed one swallows the rest.
                RxState::WaitForProcess | RxState::Error => break,
            }
        }
    }

    fn complete_reception(&mut self) {
        let Some(request) = self.pending_request() else {
            return;
        };
        if !request.is_crc_valid() {
            log::debug!(
                "Dropping request with bad CRC: expected 0x{:08X}, got 0x{:08X}",
                request.compute_crc(),
                request.crc
            );
            self.reset_rx();
            return;
        }
        if !self.session_active && !is_session_opener(&request) {
            log::debug!(
                "Dropping request 0x{:02X}/0x{:02X} outside a session",
                request.command_id,
                request.subfunction_id
            );
            self.reset_rx();
            return;
        }
        self.rx_state = RxState::WaitForProcess;
        self.request_received = true;
    }

    fn pending_request(&self) -> Option<Request<'_>> {
        Some(Request {
            command_id: self.command_id,
            subfunction_id: self.subfunction_id,
            data_length: self.data_length,
            data: self.rx_buffer.get(..usize::from(self.data_length))?,
            crc: self.crc,
        })
    }

    #[must_use]
    pub const fn request_received(&self) -> bool {
        self.request_received
    }

    /// The request waiting to be processed, if any.
    #[must_use]
    pub fn request(&self) -> Option<Request<'_>> {
        if !self.request_received {
            return None;
        }
        self.pending_request()
    }

    /// The pending request together with the buffer its response is
    /// written to.
    pub fn request_and_response_buffer(&mut self) -> (Option<Request<'_>>, &mut [u8]) {
        let request = if self.request_received {
            Some(Request {
                command_id: self.command_id,
                subfunction_id: self.subfunction_id,
                data_length: self.data_length,
                data: &self.rx_buffer[..usize::from(self.data_length)],
                crc: self.crc,
            })
        } else {
            None
        };
        (request, &mut *self.tx_buffer)
    }

    /// Buffer receiving the payload of the next response.
    pub fn response_buffer(&mut self) -> &mut [u8] {
        &mut *self.tx_buffer
    }

    /// Release the current request and listen for the next one.
    pub fn wait_next_request(&mut self) {
        self.request_received = false;
        self.reset_rx();
    }

    /// Start sending `response`, whose payload was written into the
    /// response buffer.
    ///
    /// The CRC is computed here and stored back into `response`.
    pub fn send_response(&mut self, response: &mut Response) -> Result<(), TxError> {
        let err = if !self.enabled {
            Some(TxError::Disabled)
        } else if self.transmitting || self.is_receiving() {
            Some(TxError::Busy)
        } else if usize::from(response.data_length) > self.tx_buffer.len() {
            Some(TxError::Overflow)
        } else {
            None
        };
        if let Some(err) = err {
            self.tx_error = err;
            return Err(err);
        }

        let len = usize::from(response.data_length);
        response.crc = response.compute_crc(&self.tx_buffer[..len]);
        self.tx_header = response.header();
        BigEndian::write_u32(&mut self.tx_crc, response.crc);
        self.tx_data_length = len;
        self.nbytes_sent = 0;
        self.tx_error = TxError::None;
        self.transmitting = true;
        Ok(())
    }

    /// Number of bytes of the current response still to be popped.
    #[must_use]
    pub const fn data_to_send(&self) -> usize {
        if self.transmitting {
            self.frame_size() - self.nbytes_sent
        } else {
            0
        }
    }

    const fn frame_size(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.tx_data_length + CRC_SIZE
    }

    /// Copy the next bytes to transmit into `out`.
    ///
    /// It returns the number of bytes copied. Any chunking is supported.
    pub fn pop_data(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() && self.data_to_send() > 0 {
            let cursor = self.nbytes_sent;
            let (src, offset) = if cursor < RESPONSE_HEADER_SIZE {
                (&self.tx_header[..], cursor)
            } else if cursor < RESPONSE_HEADER_SIZE + self.tx_data_length {
                (
                    &self.tx_buffer[..self.tx_data_length],
                    cursor - RESPONSE_HEADER_SIZE,
                )
            } else {
                (
                    &self.tx_crc[..],
                    cursor - RESPONSE_HEADER_SIZE - self.tx_data_length,
                )
            };
            let count = (src.len() - offset).min(out.len() - n);
            out[n..n + count].copy_from_slice(&src[offset..offset + count]);
            n += count;
            self.nbytes_sent += count;
        }
        if self.transmitting && self.nbytes_sent >= self.frame_size() {
            self.transmitting = false;
        }
        n
    }

    #[must_use]
    pub const fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Whether a request is partially received.
    #[must_use]
    pub const fn is_receiving(&self) -> bool {
        !matches!(
            self.rx_state,
            RxState::WaitForCommand | RxState::WaitForProcess | RxState::Error
        )
    }

    #[must_use]
    pub const fn rx_state(&self) -> RxState {
        self.rx_state
    }

    #[must_use]
    pub const fn rx_error(&self) -> RxError {
        self.rx_error
    }

    #[must_use]
    pub const fn tx_error(&self) -> TxError {
        self.tx_error
    }

    #[must_use]
    pub fn rx_buffer_size(&self) -> usize {
        self.rx_buffer.len()
    }

    #[must_use]
    pub fn tx_buffer_size(&self) -> usize {
        self.tx_buffer.len()
    }

    #[must_use]
    pub const fn config(&self) -> &CommConfig {
        &self.config
    }

    /// Open a session; fails if one is already open.
    pub fn connect(&mut self) -> bool {
        if self.session_active {
            return false;
        }
        self.session_id = self.session_counter;
        self.session_counter = self.session_counter.wrapping_add(1);
        self.session_active = true;
        self.heartbeat_timestamp = self.timebase.timestamp();
        self.last_heartbeat_challenge = None;
        log::info!("Session 0x{:08X} opened", self.session_id);
        true
    }

    pub fn disconnect(&mut self) {
        if self.session_active {
            log::info!("Session 0x{:08X} closed", self.session_id);
        }
        self.session_active = false;
        self.session_id = 0;
        self.last_heartbeat_challenge = None;
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.session_active
    }

    #[must_use]
    pub const fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Accept a heartbeat unless `challenge` replays the last accepted one.
    pub fn heartbeat(&mut self, challenge: u16) -> bool {
        if !self.session_active || self.last_heartbeat_challenge == Some(challenge) {
            return false;
        }
        self.last_heartbeat_challenge = Some(challenge);
        self.heartbeat_timestamp = self.timebase.timestamp();
        true
    }

    /// Drop the session and any exchange in progress.
    pub fn reset(&mut self) {
        self.request_received = false;
        self.reset_rx();
        self.reset_tx();
        self.disconnect();
    }

    fn reset_rx(&mut self) {
        self.rx_state = RxState::WaitForCommand;
        self.rx_error = RxError::None;
        self.command_id = 0;
        self.subfunction_id = 0;
        self.data_length = 0;
        self.crc = 0;
        self.length_bytes_received = 0;
        self.data_bytes_received = 0;
        self.crc_bytes_received = 0;
        self.request_received = false;
    }

    fn reset_tx(&mut self) {
        self.transmitting = false;
        self.tx_error = TxError::None;
        self.tx_data_length = 0;
        self.nbytes_sent = 0;
    }
}

/// Discover or Connect requests carrying their magic value.
fn is_session_opener(request: &Request<'_>) -> bool {
    match CommandId::try_from(request.command_id) {
        Ok(CommandId::CommControl) => match CommControl::try_from(request.subfunction_id) {
            Ok(CommControl::Discover) => request.data == DISCOVER_MAGIC,
            Ok(CommControl::Connect) => request.data == CONNECT_MAGIC,
            _ => false,
        },
        _ => false,
    }
}
