// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent entry point: request dispatch in the main context.

use crate::{
    codec::*,
    comm::{CommConfig, CommHandler},
    config::*,
    datalogging::DataLogger,
    error::Error,
    frame::*,
    guard::MemoryGuard,
    loop_handler::{Loop2Main, LoopChannel, Main2Loop},
    rpv::RpvTable,
    timebase::Timebase,
    util::ADDRESS_SIZE,
};

type HandlerResult = Result<usize, ResponseCode>;

/// Datalogger bookkeeping of the main context.
#[derive(Debug)]
struct Datalogging<'a> {
    /// Present while the main context owns the datalogger.
    datalogger: Option<&'a mut DataLogger<'a>>,
    /// Loop holding the datalogger, or about to.
    owner: Option<usize>,
    release_requested: bool,
    /// Set by a configure or an arm, cleared once the loop is given the datalogger.
    hand_off_pending: bool,
    /// Loop the current configuration runs in.
    target_loop: Option<usize>,
    /// Last status seen while a loop owns the datalogger.
    status: DataloggerStatus,
    setup: DataloggingSetup,
    rolling_counter: u8,
}

impl<'a> Datalogging<'a> {
    fn new(datalogger: &'a mut DataLogger<'a>) -> Self {
        let setup = DataloggingSetup {
            buffer_size: u32::try_from(datalogger.buffer_size()).unwrap_or(u32::MAX),
            encoding: EncodingType::Raw,
            max_signal_count: MAX_SIGNALS as u8,
        };
        Self {
            status: datalogger.status(),
            datalogger: Some(datalogger),
            owner: None,
            release_requested: false,
            hand_off_pending: false,
            target_loop: None,
            setup,
            rolling_counter: 0,
        }
    }

    fn status(&self) -> DataloggerStatus {
        match &self.datalogger {
            Some(datalogger) => datalogger.status(),
            None => self.status,
        }
    }

    /// The datalogger, once it is back in the main context.
    ///
    /// While a loop holds it, its release is requested and the caller is
    /// told to try again.
    fn claim(&mut self, loops: &[LoopChannel<'a>]) -> Result<&mut DataLogger<'a>, ResponseCode> {
        if self.datalogger.is_some() {
            return self
                .datalogger
                .as_deref_mut()
                .ok_or(ResponseCode::FailureToProceed);
        }
        let Some(owner) = self.owner else {
            return Err(ResponseCode::FailureToProceed);
        };
        if !self.release_requested {
            let channel = loops.get(owner).ok_or(ResponseCode::FailureToProceed)?;
            if channel.main2loop().send(Main2Loop::ReleaseOwnership).is_ok() {
                self.release_requested = true;
            }
        }
        Err(ResponseCode::ProcessAgain)
    }

    /// Forward `message` to the owning loop.
    fn post(&mut self, loops: &[LoopChannel<'a>], message: Main2Loop<'a>) -> Result<(), ResponseCode> {
        if self.release_requested {
            return Err(ResponseCode::ProcessAgain);
        }
        let owner = self.owner.ok_or(ResponseCode::FailureToProceed)?;
        let channel = loops.get(owner).ok_or(ResponseCode::FailureToProceed)?;
        channel
            .main2loop()
            .send(message)
            .map_err(|_| ResponseCode::ProcessAgain)
    }

    fn handle_notice(&mut self, loop_id: usize, notice: Loop2Main<'a>) {
        match notice {
            Loop2Main::OwnershipTaken => {
                log::debug!("Datalogger taken by loop {loop_id}");
            }
            Loop2Main::OwnershipReleased(datalogger) => {
                if self.owner == Some(loop_id) {
                    self.status = datalogger.status();
                    self.datalogger = Some(datalogger);
                    self.owner = None;
                    self.release_requested = false;
                } else {
                    log::error!("Datalogger released by loop {loop_id} which did not own it");
                }
            }
            Loop2Main::DataAcquired => {
                log::info!("Datalogging acquisition completed in loop {loop_id}");
            }
            Loop2Main::StatusUpdate(status) => {
                if self.owner == Some(loop_id) {
                    self.status = status;
                }
            }
        }
    }

    /// Give the datalogger to its loop once it has sampling to do.
    ///
    /// Only a configure or an arm hands it off. A datalogger given back for
    /// another request stays in the main context.
    fn hand_off(&mut self, loops: &[LoopChannel<'a>]) {
        if !self.hand_off_pending {
            return;
        }
        let Some(target) = self.target_loop else {
            return;
        };
        let Some(channel) = loops.get(target) else {
            return;
        };
        let sampling = self.datalogger.as_deref().is_some_and(|dl| {
            matches!(
                dl.state(),
                DataloggerState::Configured | DataloggerState::Armed | DataloggerState::Triggered
            )
        });
        if !sampling {
            self.hand_off_pending = false;
            return;
        }
        if channel.main2loop().has_content() {
            return;
        }
        let Some(datalogger) = self.datalogger.take() else {
            return;
        };
        self.status = datalogger.status();
        match channel.main2loop().send(Main2Loop::TakeOwnership(datalogger)) {
            Ok(()) => {
                self.owner = Some(target);
                self.hand_off_pending = false;
            }
            Err(Main2Loop::TakeOwnership(datalogger)) => self.datalogger = Some(datalogger),
            Err(_) => {}
        }
    }
}

/// The debug agent, driven from the main context.
///
/// Bytes received from the link are fed with [`MainHandler::receive_data`],
/// bytes to transmit are fetched with [`MainHandler::pop_data`] and
/// [`MainHandler::process`] is called periodically with the elapsed time.
#[derive(Debug)]
pub struct MainHandler<'a> {
    comm: CommHandler<'a>,
    timebase: Timebase,
    guard: MemoryGuard<'a>,
    rpvs: RpvTable<'a>,
    user_command: Option<UserCommandCallback>,
    display_name: &'a str,
    software_id: &'a [u8; SOFTWARE_ID_LENGTH],
    max_bitrate: u32,
    loops: &'a [LoopChannel<'a>],
    memory_write_enable: bool,
    datalogging: Option<Datalogging<'a>>,
    disconnect_pending: bool,
}

impl<'a> MainHandler<'a> {
    /// Build the agent from `config`.
    ///
    /// Missing or undersized buffers and too many loops are rejected.
    pub fn new(config: Config<'a>) -> Result<Self, Error> {
        let guard = config.memory_guard();
        let rpvs = config.rpv_table();
        let Config {
            rx_buffer,
            tx_buffer,
            user_command,
            display_name,
            software_id,
            max_bitrate,
            session_counter_seed,
            loops,
            datalogger,
            memory_write_enable,
            ..
        } = config;

        let (Some(rx_buffer), Some(tx_buffer)) = (rx_buffer, tx_buffer) else {
            return Err(Error::BufferSize);
        };
        if rx_buffer.len() < MINIMUM_RX_BUFFER_SIZE
            || tx_buffer.len() < MINIMUM_TX_BUFFER_SIZE
            || tx_buffer.len() > usize::from(u16::MAX)
            || loops.len() > MAX_LOOP
        {
            return Err(Error::BufferSize);
        }

        let comm = CommHandler::new(
            rx_buffer,
            tx_buffer,
            CommConfig {
                rx_timeout_us: COMM_RX_TIMEOUT_US,
                heartbeat_timeout_us: COMM_HEARTBEAT_TIMEOUT_US,
                session_counter_seed,
            },
        );
        Ok(Self {
            comm,
            timebase: Timebase::new(),
            guard,
            rpvs,
            user_command,
            display_name,
            software_id,
            max_bitrate,
            loops,
            memory_write_enable,
            datalogging: datalogger.map(Datalogging::new),
            disconnect_pending: false,
        })
    }

    #[must_use]
    pub const fn comm(&self) -> &CommHandler<'a> {
        &self.comm
    }

    #[must_use]
    pub const fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.comm.is_connected()
    }

    pub fn receive_data(&mut self, data: &[u8]) {
        self.comm.receive_data(data);
    }

    #[must_use]
    pub const fn data_to_send(&self) -> usize {
        self.comm.data_to_send()
    }

    pub fn pop_data(&mut self, out: &mut [u8]) -> usize {
        self.comm.pop_data(out)
    }

    /// Run one iteration that lasted `timestep_100ns`.
    pub fn process(&mut self, timestep_100ns: u32) {
        self.timebase.step(timestep_100ns);
        self.comm.process(&self.timebase);
        self.process_loop_notices();
        if let Some(datalogging) = &mut self.datalogging {
            datalogging.hand_off(self.loops);
        }

        if self.comm.request_received() && !self.comm.is_transmitting() {
            self.process_request();
        }

        if self.disconnect_pending && !self.comm.is_transmitting() {
            self.comm.disconnect();
            self.disconnect_pending = false;
        }
    }

    fn process_loop_notices(&mut self) {
        let Some(datalogging) = &mut self.datalogging else {
            return;
        };
        for (loop_id, channel) in self.loops.iter().enumerate() {
            if let Some(notice) = channel.loop2main().pop() {
                datalogging.handle_notice(loop_id, notice);
            }
        }
    }

    fn process_request(&mut self) {
        let Some((command_id, subfunction_id)) = self
            .comm
            .request()
            .map(|req| (req.command_id, req.subfunction_id))
        else {
            return;
        };
        let mut response = Response::new(command_id, subfunction_id);

        let result = match CommandId::try_from(command_id) {
            Ok(CommandId::GetInfo) => self.process_get_info(subfunction_id),
            Ok(CommandId::CommControl) => self.process_comm_control(subfunction_id),
            Ok(CommandId::MemoryControl) => self.process_memory_control(subfunction_id),
            Ok(CommandId::UserCommand) => self.process_user_command(subfunction_id),
            Ok(CommandId::DataLogControl) => self.process_datalog_control(subfunction_id),
            Err(err) => Err(err.into()),
        };
        let result = result.and_then(|len| u16::try_from(len).map_err(|_| ResponseCode::Overflow));

        match result {
            Ok(len) => response.data_length = len,
            Err(ResponseCode::ProcessAgain) => return,
            Err(ResponseCode::NoResponseToSend) => {
                self.comm.wait_next_request();
                return;
            }
            Err(code) => {
                log::debug!(
                    "Request 0x{command_id:02X}/0x{subfunction_id:02X} failed: {code}"
                );
                response.response_code = code;
                response.data_length = 0;
            }
        }

        if let Err(err) = self.comm.send_response(&mut response) {
            log::error!("Cannot send response: {err:?}");
        }
        self.comm.wait_next_request();
    }

    fn process_get_info(&mut self, subfunction_id: u8) -> HandlerResult {
        let (request, tx) = self.comm.request_and_response_buffer();
        let request = request.ok_or(ResponseCode::NoResponseToSend)?;

        let len = match GetInfo::try_from(subfunction_id)? {
            GetInfo::GetProtocolVersion => encode_protocol_version(tx)?,
            GetInfo::GetSoftwareId => encode_software_id(self.software_id, tx)?,
            GetInfo::GetSupportedFeatures => {
                let features = SupportedFeatures {
                    memory_write: self.memory_write_enable,
                    datalogging: self.datalogging.is_some(),
                    user_command: self.user_command.is_some(),
                    sixtyfour_bits: ADDRESS_SIZE == 8,
                };
                encode_supported_features(features, tx)?
            }
            GetInfo::GetSpecialMemoryRegionCount => encode_special_memory_region_count(
                count_u8(self.guard.readonly_ranges().len()),
                count_u8(self.guard.forbidden_ranges().len()),
                tx,
            )?,
            GetInfo::GetSpecialMemoryLocation => {
                let req = decode_special_memory_location(request.data)?;
                let ranges = match req.region_type {
                    MemoryRegionType::ReadOnly => self.guard.readonly_ranges(),
                    MemoryRegionType::Forbidden => self.guard.forbidden_ranges(),
                };
                let range = ranges
                    .get(usize::from(req.region_index))
                    .ok_or(ResponseCode::FailureToProceed)?;
                encode_special_memory_location(req, range, tx)?
            }
            GetInfo::GetRpvCount => encode_rpv_count(
                u16::try_from(self.rpvs.len()).unwrap_or(u16::MAX),
                tx,
            )?,
            GetInfo::GetRpvDefinition => {
                let req = decode_rpv_definition(request.data)?;
                let start = usize::from(req.start_index);
                let end = start + usize::from(req.count);
                let rpvs = self
                    .rpvs
                    .values()
                    .get(start..end)
                    .ok_or(ResponseCode::FailureToProceed)?;
                encode_rpv_definitions(rpvs, tx)?
            }
            GetInfo::GetLoopCount => encode_loop_count(count_u8(self.loops.len()), tx)?,
            GetInfo::GetLoopDefinition => {
                let loop_id = decode_loop_definition(request.data)?;
                let channel = self
                    .loops
                    .get(usize::from(loop_id))
                    .ok_or(ResponseCode::FailureToProceed)?;
                encode_loop_definition(loop_id, &channel.definition(), tx)?
            }
        };
        Ok(len)
    }

    fn process_comm_control(&mut self, subfunction_id: u8) -> HandlerResult {
        let subfunction = CommControl::try_from(subfunction_id)?;
        let data = self
            .comm
            .request()
            .ok_or(ResponseCode::NoResponseToSend)?
            .data;

        let len = match subfunction {
            CommControl::Discover => {
                decode_discover(data)?;
                let tx = self.comm.response_buffer();
                encode_discover(self.software_id, self.display_name, tx)?
            }
            CommControl::Heartbeat => {
                let req = decode_heartbeat(data)?;
                if !self.comm.is_connected() || req.session_id != self.comm.session_id() {
                    return Err(ResponseCode::InvalidRequest);
                }
                if !self.comm.heartbeat(req.challenge) {
                    log::debug!("Heartbeat challenge 0x{:04X} replayed", req.challenge);
                    return Err(ResponseCode::InvalidRequest);
                }
                let session_id = self.comm.session_id();
                encode_heartbeat(session_id, !req.challenge, self.comm.response_buffer())?
            }
            CommControl::GetParams => {
                let params = CommParams {
                    rx_buffer_size: u16::try_from(self.comm.rx_buffer_size()).unwrap_or(u16::MAX),
                    tx_buffer_size: u16::try_from(self.comm.tx_buffer_size()).unwrap_or(u16::MAX),
                    max_bitrate: self.max_bitrate,
                    heartbeat_timeout_us: self.comm.config().heartbeat_timeout_us,
                    rx_timeout_us: self.comm.config().rx_timeout_us,
                    address_size: ADDRESS_SIZE as u8,
                };
                encode_comm_params(&params, self.comm.response_buffer())?
            }
            CommControl::Connect => {
                decode_connect(data)?;
                if !self.comm.connect() {
                    return Err(ResponseCode::Busy);
                }
                let session_id = self.comm.session_id();
                encode_connect(session_id, self.comm.response_buffer())?
            }
            CommControl::Disconnect => {
                let session_id = decode_disconnect(data)?;
                if !self.comm.is_connected() || session_id != self.comm.session_id() {
                    return Err(ResponseCode::InvalidRequest);
                }
                // Dropped once the response is sent.
                self.disconnect_pending = true;
                0
            }
        };
        Ok(len)
    }

    fn process_memory_control(&mut self, subfunction_id: u8) -> HandlerResult {
        let subfunction = MemoryControl::try_from(subfunction_id)?;
        let (request, tx) = self.comm.request_and_response_buffer();
        let request = request.ok_or(ResponseCode::NoResponseToSend)?;

        match subfunction {
            MemoryControl::Read => {
                let parser = ReadMemoryBlocksParser::new(request.data);
                if !parser.is_valid() {
                    return Err(ResponseCode::InvalidRequest);
                }
                if parser.required_tx_size() > tx.len() {
                    return Err(ResponseCode::Overflow);
                }
                for block in parser.clone() {
                    self.guard.check_read(block.start_address, block.len())?;
                }
                let mut encoder = ReadMemoryBlocksEncoder::new(tx);
                for block in parser {
                    if let Some(dst) = encoder.write(&block) {
                        self.guard.read(block.start_address, dst)?;
                    }
                }
                Ok(encoder.finish()?)
            }
            MemoryControl::Write | MemoryControl::WriteMasked => {
                if !self.memory_write_enable {
                    return Err(ResponseCode::Forbidden);
                }
                let masked = subfunction == MemoryControl::WriteMasked;
                let parser = WriteMemoryBlocksParser::new(request.data, masked);
                if !parser.is_valid() {
                    return Err(ResponseCode::InvalidRequest);
                }
                if parser.required_tx_size() > tx.len() {
                    return Err(ResponseCode::Overflow);
                }
                for block in parser.clone() {
                    self.guard.check_write(block.start_address, block.len())?;
                }
                let mut encoder = WriteMemoryBlocksEncoder::new(tx);
                for block in parser {
                    match (block.source_data, block.mask) {
                        (Some(src), Some(mask)) => {
                            self.guard.write_masked(block.start_address, src, mask)?;
                        }
                        (Some(src), None) => self.guard.write(block.start_address, src)?,
                        _ => {}
                    }
                    encoder.write(&block);
                }
                Ok(encoder.finish()?)
            }
            MemoryControl::ReadRpv => {
                let parser = ReadRpvParser::new(request.data);
                if !parser.is_valid() {
                    return Err(ResponseCode::InvalidRequest);
                }
                let required = parser
                    .required_tx_size(&self.rpvs)
                    .ok_or(ResponseCode::InvalidRequest)?;
                if required > tx.len() {
                    return Err(ResponseCode::Overflow);
                }
                let mut encoder = ReadRpvEncoder::new(tx);
                for id in parser {
                    let rpv = self.rpvs.get(id).ok_or(ResponseCode::InvalidRequest)?;
                    let value = self.rpvs.read(&rpv)?;
                    encoder.write(id, &value);
                }
                Ok(encoder.finish()?)
            }
            MemoryControl::WriteRpv => {
                let parser = WriteRpvParser::new(request.data, &self.rpvs);
                if !parser.is_valid() {
                    return Err(ResponseCode::InvalidRequest);
                }
                if parser.required_tx_size() > tx.len() {
                    return Err(ResponseCode::Overflow);
                }
                let mut encoder = WriteRpvEncoder::new(tx);
                for (rpv, value) in parser {
                    self.rpvs.write(&rpv, value)?;
                    encoder.write(&rpv);
                }
                Ok(encoder.finish()?)
            }
        }
    }

    fn process_user_command(&mut self, subfunction_id: u8) -> HandlerResult {
        let callback = self.user_command.ok_or(ResponseCode::UnsupportedFeature)?;
        let (request, tx) = self.comm.request_and_response_buffer();
        let request = request.ok_or(ResponseCode::NoResponseToSend)?;
        let len = callback(subfunction_id, request.data, tx)?;
        if len > tx.len() {
            return Err(ResponseCode::Overflow);
        }
        Ok(len)
    }

    fn process_datalog_control(&mut self, subfunction_id: u8) -> HandlerResult {
        let Some(datalogging) = &mut self.datalogging else {
            return Err(ResponseCode::UnsupportedFeature);
        };
        let subfunction = DataLogControl::try_from(subfunction_id)?;
        let (request, tx) = self.comm.request_and_response_buffer();
        let request = request.ok_or(ResponseCode::NoResponseToSend)?;
        let loops = self.loops;

        let len = match subfunction {
            DataLogControl::GetSetup => encode_datalogging_setup(&datalogging.setup, tx)?,
            DataLogControl::ConfigureDatalog => {
                let req = decode_configure(request.data)?;
                let channel = loops
                    .get(usize::from(req.loop_id))
                    .ok_or(ResponseCode::FailureToProceed)?;
                if !channel.datalogging_allowed() {
                    return Err(ResponseCode::FailureToProceed);
                }
                let datalogger = datalogging.claim(loops)?;
                datalogger
                    .configure(&req.config, req.config_id)
                    .map_err(|_| ResponseCode::InvalidRequest)?;
                datalogging.target_loop = Some(usize::from(req.loop_id));
                datalogging.hand_off_pending = true;
                datalogging.rolling_counter = 0;
                0
            }
            DataLogControl::ArmTrigger => {
                if let Some(datalogger) = datalogging.datalogger.as_deref_mut() {
                    if !datalogger.arm_trigger() {
                        return Err(ResponseCode::FailureToProceed);
                    }
                    datalogging.hand_off_pending = true;
                } else {
                    if matches!(
                        datalogging.status.state,
                        DataloggerState::Idle | DataloggerState::Error
                    ) {
                        return Err(ResponseCode::FailureToProceed);
                    }
                    datalogging.post(loops, Main2Loop::ArmTrigger)?;
                }
                0
            }
            DataLogControl::DisarmTrigger => {
                if let Some(datalogger) = datalogging.datalogger.as_deref_mut() {
                    datalogger.disarm_trigger();
                } else {
                    datalogging.post(loops, Main2Loop::DisarmTrigger)?;
                }
                0
            }
            DataLogControl::GetStatus => encode_datalogger_status(&datalogging.status(), tx)?,
            DataLogControl::GetAcquisitionMetadata => {
                let metadata = datalogging
                    .claim(loops)?
                    .metadata()
                    .ok_or(ResponseCode::FailureToProceed)?;
                encode_acquisition_metadata(&metadata, tx)?
            }
            DataLogControl::ReadAcquisition => {
                let rolling_counter = datalogging.rolling_counter;
                let datalogger = datalogging.claim(loops)?;
                if !datalogger.data_acquired() {
                    return Err(ResponseCode::FailureToProceed);
                }
                let data_end = tx.len() - CRC_SIZE;
                let data = tx
                    .get_mut(READ_ACQUISITION_HEADER_SIZE..data_end)
                    .ok_or(ResponseCode::Overflow)?;
                let data_len = datalogger.read_acquisition(data);
                let finished = datalogger.read_finished();
                let crc = finished.then(|| datalogger.read_crc());
                let chunk = AcquisitionChunk {
                    finished,
                    rolling_counter,
                    acquisition_id: datalogger.acquisition_id(),
                };
                if finished {
                    datalogger.reset_reader();
                }
                datalogging.rolling_counter = rolling_counter.wrapping_add(1);
                encode_read_acquisition(&chunk, data_len, crc, tx)?
            }
            DataLogControl::ResetDatalogger => {
                datalogging.claim(loops)?.reset();
                datalogging.hand_off_pending = false;
                datalogging.rolling_counter = 0;
                0
            }
        };
        Ok(len)
    }
}

fn count_u8(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};
    use std::vec::Vec;

    use super::*;
    use crate::{
        loop_handler::LoopHandler,
        testing::{SimMemory, parse_response, request_frame},
        util::{crc32, encode_address},
    };

    const FORBIDDEN: [AddressRange; 1] = [AddressRange::new(0x1100, 0x11FF)];
    const READONLY: [AddressRange; 1] = [AddressRange::new(0x1200, 0x12FF)];
    const RPVS: [RuntimePublishedValue; 2] = [
        RuntimePublishedValue {
            id: 0x1000,
            var_type: VariableType::Uint16,
        },
        RuntimePublishedValue {
            id: 0x2000,
            var_type: VariableType::Float32,
        },
    ];
    const SEED: u32 = 0x0100;

    static RPV_FLOAT: AtomicU32 = AtomicU32::new(0);

    fn read_rpv(rpv: &RuntimePublishedValue) -> Result<AnyType, Error> {
        match rpv.id {
            0x1000 => Ok(AnyType::Uint16(0xABCD)),
            0x2000 => Ok(AnyType::Float32(f32::from_bits(
                RPV_FLOAT.load(Ordering::Relaxed),
            ))),
            id => Err(Error::RpvAccess(id)),
        }
    }

    fn write_rpv(rpv: &RuntimePublishedValue, value: AnyType) -> Result<(), Error> {
        match (rpv.id, value) {
            (0x2000, AnyType::Float32(v)) => {
                RPV_FLOAT.store(v.to_bits(), Ordering::Relaxed);
                Ok(())
            }
            (id, _) => Err(Error::RpvAccess(id)),
        }
    }

    fn user_command(subfunction: u8, data: &[u8], out: &mut [u8]) -> Result<usize, ResponseCode> {
        if subfunction == 0xFF {
            return Err(ResponseCode::FailureToProceed);
        }
        out[0] = subfunction;
        out[1..=data.len()].copy_from_slice(data);
        Ok(data.len() + 1)
    }

    fn base_config(mem: &SimMemory) -> Config<'_> {
        Config::new(mem)
            .set_forbidden_address_range(&FORBIDDEN)
            .set_readonly_address_range(&READONLY)
            .set_published_values(&RPVS, Some(read_rpv), Some(write_rpv))
            .set_user_command_callback(user_command)
            .set_display_name("bench")
            .set_max_bitrate(115_200)
            .set_session_counter_seed(SEED)
    }

    #[derive(Debug)]
    struct Reply {
        command_id: u8,
        subfunction_id: u8,
        code: u8,
        data: Vec<u8>,
    }

    impl Reply {
        fn is(&self, code: ResponseCode) -> bool {
            self.code == u8::from(code)
        }
    }

    fn send(handler: &mut MainHandler<'_>, command: u8, subfunction: u8, data: &[u8]) {
        let mut frame = [0; 512];
        let len = request_frame(command, subfunction, data, &mut frame);
        handler.receive_data(&frame[..len]);
        handler.process(10);
    }

    fn pop_reply(handler: &mut MainHandler<'_>) -> Option<Reply> {
        let mut out = [0; 512];
        let n = handler.pop_data(&mut out);
        if n == 0 {
            return None;
        }
        let parsed = parse_response(&out[..n]);
        Some(Reply {
            command_id: parsed.command_id,
            subfunction_id: parsed.subfunction_id,
            code: parsed.code,
            data: parsed.data.to_vec(),
        })
    }

    fn request(
        handler: &mut MainHandler<'_>,
        command: u8,
        subfunction: u8,
        data: &[u8],
    ) -> Option<Reply> {
        send(handler, command, subfunction, data);
        pop_reply(handler)
    }

    fn connect(handler: &mut MainHandler<'_>) -> u32 {
        let reply = request(handler, 2, 4, &CONNECT_MAGIC).unwrap();
        assert!(reply.is(ResponseCode::Ok));
        u32::from_be_bytes([reply.data[4], reply.data[5], reply.data[6], reply.data[7]])
    }

    fn address(value: usize) -> Vec<u8> {
        let mut buf = [0; 8];
        let n = encode_address(value, ADDRESS_SIZE, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn undersized_buffers_are_rejected() {
        let mem = SimMemory::new(0x1000);
        let (rx, tx) = (&mut [0; 31], &mut [0; 64]);
        assert_eq!(
            MainHandler::new(base_config(&mem).set_buffers(rx, tx)).err(),
            Some(Error::BufferSize)
        );
        assert_eq!(
            MainHandler::new(base_config(&mem)).err(),
            Some(Error::BufferSize)
        );
    }

    mod comm_control {
        use super::*;

        #[test]
        fn discover_while_disconnected() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();

            // Nothing but discover and connect is answered.
            assert!(request(&mut handler, 1, 1, &[]).is_none());
            assert!(request(&mut handler, 2, 1, &[0, 0, 0, 0]).is_none());

            let reply = request(&mut handler, 2, 1, &DISCOVER_MAGIC).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!(reply.command_id, 0x82);
            assert_eq!(reply.subfunction_id, 1);
            assert_eq!(&reply.data[..2], &[1, 0]);
            assert_eq!(&reply.data[2..18], &DEFAULT_SOFTWARE_ID);
            assert_eq!(reply.data[18], 5);
            assert_eq!(&reply.data[19..], b"bench");
            assert!(!handler.is_connected());
        }

        #[test]
        fn connect_and_heartbeat() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();

            let session = connect(&mut handler);
            assert_eq!(session, SEED);
            assert!(handler.is_connected());

            let reply = request(&mut handler, 2, 4, &CONNECT_MAGIC).unwrap();
            assert!(reply.is(ResponseCode::Busy));
            assert!(reply.data.is_empty());

            let mut hb = Vec::from(session.to_be_bytes());
            hb.extend_from_slice(&0x1234_u16.to_be_bytes());
            let reply = request(&mut handler, 2, 2, &hb).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!(&reply.data[..4], &session.to_be_bytes());
            assert_eq!(&reply.data[4..], &[0xED, 0xCB]);

            // Replayed challenge.
            let reply = request(&mut handler, 2, 2, &hb).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));

            let mut wrong = Vec::from((session + 1).to_be_bytes());
            wrong.extend_from_slice(&[0, 1]);
            let reply = request(&mut handler, 2, 2, &wrong).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
        }

        #[test]
        fn heartbeat_timeout() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);
            handler.process(crate::timebase::us_to_100ns(COMM_HEARTBEAT_TIMEOUT_US));
            assert!(!handler.is_connected());
            assert!(request(&mut handler, 1, 1, &[]).is_none());
        }

        #[test]
        fn disconnect_after_response() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            let session = connect(&mut handler);

            let reply = request(&mut handler, 2, 5, &(session ^ 1).to_be_bytes()).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));

            send(&mut handler, 2, 5, &session.to_be_bytes());
            assert!(handler.is_connected());
            let reply = pop_reply(&mut handler).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            handler.process(10);
            assert!(!handler.is_connected());

            assert_eq!(connect(&mut handler), SEED + 1);
        }

        #[test]
        fn get_params() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 48]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            let reply = request(&mut handler, 2, 3, &[]).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            let mut expected = Vec::new();
            expected.extend_from_slice(&64_u16.to_be_bytes());
            expected.extend_from_slice(&48_u16.to_be_bytes());
            expected.extend_from_slice(&115_200_u32.to_be_bytes());
            expected.extend_from_slice(&COMM_HEARTBEAT_TIMEOUT_US.to_be_bytes());
            expected.extend_from_slice(&COMM_RX_TIMEOUT_US.to_be_bytes());
            expected.push(ADDRESS_SIZE as u8);
            assert_eq!(reply.data, expected);
        }
    }

    mod get_info {
        use super::*;

        fn connected<'a>(mem: &'a SimMemory, rx: &'a mut [u8], tx: &'a mut [u8]) -> MainHandler<'a> {
            let mut handler = MainHandler::new(base_config(mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);
            handler
        }

        #[test]
        fn versions_and_features() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = connected(&mem, rx, tx);

            let reply = request(&mut handler, 1, 1, &[]).unwrap();
            assert_eq!(reply.data, [1, 0]);

            let reply = request(&mut handler, 1, 2, &[]).unwrap();
            assert_eq!(reply.data, DEFAULT_SOFTWARE_ID);

            let reply = request(&mut handler, 1, 3, &[]).unwrap();
            let sixtyfour = if ADDRESS_SIZE == 8 { 0x10 } else { 0 };
            assert_eq!(reply.data, [0x80 | 0x20 | sixtyfour]);
        }

        #[test]
        fn special_memory_regions() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = connected(&mem, rx, tx);

            let reply = request(&mut handler, 1, 4, &[]).unwrap();
            assert_eq!(reply.data, [1, 1]);

            let reply = request(&mut handler, 1, 5, &[1, 0]).unwrap();
            let mut expected = Vec::from([1, 0]);
            expected.extend(address(0x1100));
            expected.extend(address(0x11FF));
            assert_eq!(reply.data, expected);

            let reply = request(&mut handler, 1, 5, &[0, 0]).unwrap();
            assert_eq!(&reply.data[2..2 + ADDRESS_SIZE], &address(0x1200)[..]);

            let reply = request(&mut handler, 1, 5, &[1, 1]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
            let reply = request(&mut handler, 1, 5, &[2, 0]).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
            let reply = request(&mut handler, 1, 5, &[0]).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
        }

        #[test]
        fn published_values() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = connected(&mem, rx, tx);

            let reply = request(&mut handler, 1, 6, &[]).unwrap();
            assert_eq!(reply.data, [0, 2]);

            let reply = request(&mut handler, 1, 7, &[0, 0, 0, 2]).unwrap();
            assert_eq!(reply.data, [0x10, 0x00, 0x11, 0x20, 0x00, 0x22]);

            let reply = request(&mut handler, 1, 7, &[0, 1, 0, 1]).unwrap();
            assert_eq!(reply.data, [0x20, 0x00, 0x22]);

            let reply = request(&mut handler, 1, 7, &[0, 1, 0, 2]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
        }

        #[test]
        fn loops() {
            let mem = SimMemory::new(0x1000);
            let loops = [
                LoopChannel::new(
                    LoopType::FixedFrequency {
                        timestep_100ns: 0x0102,
                    },
                    "fast",
                    true,
                ),
                LoopChannel::new(LoopType::VariableFrequency, "idle", false),
            ];
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let config = base_config(&mem).set_buffers(rx, tx).set_loops(&loops);
            let mut handler = MainHandler::new(config).unwrap();
            connect(&mut handler);

            let reply = request(&mut handler, 1, 8, &[]).unwrap();
            assert_eq!(reply.data, [2]);

            let reply = request(&mut handler, 1, 9, &[0]).unwrap();
            assert_eq!(reply.data, [0, 0, 0x80, 0, 0, 1, 2, 4, b'f', b'a', b's', b't']);
            let reply = request(&mut handler, 1, 9, &[1]).unwrap();
            assert_eq!(reply.data, [1, 1, 0, 4, b'i', b'd', b'l', b'e']);
            let reply = request(&mut handler, 1, 9, &[2]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
        }
    }

    mod memory_control {
        use super::*;

        fn read_block(addr: usize, len: u16) -> Vec<u8> {
            let mut data = address(addr);
            data.extend_from_slice(&len.to_be_bytes());
            data
        }

        fn write_block(addr: usize, src: &[u8], mask: Option<&[u8]>) -> Vec<u8> {
            let mut data = read_block(addr, src.len() as u16);
            data.extend_from_slice(src);
            if let Some(mask) = mask {
                data.extend_from_slice(mask);
            }
            data
        }

        #[test]
        fn read() {
            let mem = SimMemory::new(0x1000);
            mem.fill(0x1010, &[1, 2, 3, 4]);
            mem.fill(0x1200, &[9]);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            let mut data = read_block(0x1010, 4);
            data.extend(read_block(0x1200, 1));
            let reply = request(&mut handler, 3, 1, &data).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            let mut expected = read_block(0x1010, 4);
            expected.extend_from_slice(&[1, 2, 3, 4]);
            expected.extend(read_block(0x1200, 1));
            expected.push(9);
            assert_eq!(reply.data, expected);
        }

        #[test]
        fn read_refused() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            // Overlaps the start of the forbidden range.
            let reply = request(&mut handler, 3, 1, &read_block(0x10F0, 0x20)).unwrap();
            assert!(reply.is(ResponseCode::Forbidden));
            assert!(reply.data.is_empty());
            let reply = request(&mut handler, 3, 1, &read_block(0x1150, 4)).unwrap();
            assert!(reply.is(ResponseCode::Forbidden));

            let reply = request(&mut handler, 3, 1, &read_block(0x1000, 60)).unwrap();
            assert!(reply.is(ResponseCode::Overflow));

            let mut truncated = read_block(0x1000, 1);
            truncated.pop();
            let reply = request(&mut handler, 3, 1, &truncated).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
        }

        #[test]
        fn write_and_write_masked() {
            let mem = SimMemory::new(0x1000);
            mem.fill(0x1020, &[0xFF, 0x00]);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            let reply = request(&mut handler, 3, 2, &write_block(0x1010, &[5, 6], None)).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!(reply.data, read_block(0x1010, 2));
            assert_eq!((mem.get(0x1010), mem.get(0x1011)), (5, 6));

            let data = write_block(0x1020, &[0x00, 0xFF], Some(&[0x0F, 0xF0][..]));
            let reply = request(&mut handler, 3, 3, &data).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!((mem.get(0x1020), mem.get(0x1021)), (0xF0, 0xF0));
        }

        #[test]
        fn write_refused() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            // The first block is valid but nothing is written.
            let mut data = write_block(0x1010, &[5], None);
            data.extend(write_block(0x12F0, &[7; 4], None));
            let reply = request(&mut handler, 3, 2, &data).unwrap();
            assert!(reply.is(ResponseCode::Forbidden));
            assert_eq!(mem.get(0x1010), 0);
            assert_eq!(mem.get(0x12F0), 0);

            let reply = request(&mut handler, 3, 2, &write_block(0x1100, &[1], None)).unwrap();
            assert!(reply.is(ResponseCode::Forbidden));
        }

        #[test]
        fn write_disabled() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let config = base_config(&mem)
                .set_buffers(rx, tx)
                .set_memory_write_enable(false);
            let mut handler = MainHandler::new(config).unwrap();
            connect(&mut handler);

            let reply = request(&mut handler, 3, 2, &write_block(0x1010, &[5], None)).unwrap();
            assert!(reply.is(ResponseCode::Forbidden));
            assert_eq!(mem.get(0x1010), 0);
        }

        #[test]
        fn published_values() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            let mut data = Vec::from([0x20, 0x00]);
            data.extend_from_slice(&2.5_f32.to_be_bytes());
            let reply = request(&mut handler, 3, 5, &data).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!(reply.data, [0x20, 0x00, 4]);

            let reply = request(&mut handler, 3, 4, &[0x10, 0x00, 0x20, 0x00]).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            let mut expected = Vec::from([0x10, 0x00, 0xAB, 0xCD, 0x20, 0x00]);
            expected.extend_from_slice(&2.5_f32.to_be_bytes());
            assert_eq!(reply.data, expected);

            let reply = request(&mut handler, 3, 4, &[0x30, 0x00]).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
            let reply = request(&mut handler, 3, 4, &[0x10]).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));

            // Rejected by the write callback.
            let reply = request(&mut handler, 3, 5, &[0x10, 0x00, 0x00, 0x01]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
        }
    }

    mod dispatch {
        use super::*;

        #[test]
        fn user_command_and_unknown_ids() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let mut handler = MainHandler::new(base_config(&mem).set_buffers(rx, tx)).unwrap();
            connect(&mut handler);

            let reply = request(&mut handler, 4, 7, &[1, 2]).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            assert_eq!(reply.command_id, 0x84);
            assert_eq!(reply.data, [7, 1, 2]);
            let reply = request(&mut handler, 4, 0xFF, &[]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));

            let reply = request(&mut handler, 0x42, 1, &[]).unwrap();
            assert!(reply.is(ResponseCode::UnsupportedFeature));
            let reply = request(&mut handler, 1, 0x42, &[]).unwrap();
            assert!(reply.is(ResponseCode::UnsupportedFeature));
            // No datalogger configured.
            let reply = request(&mut handler, 5, 1, &[]).unwrap();
            assert!(reply.is(ResponseCode::UnsupportedFeature));
        }

        #[test]
        fn user_command_without_callback() {
            let mem = SimMemory::new(0x1000);
            let (rx, tx) = (&mut [0; 64], &mut [0; 64]);
            let config = Config::new(&mem).set_buffers(rx, tx);
            let mut handler = MainHandler::new(config).unwrap();
            connect(&mut handler);
            let reply = request(&mut handler, 4, 1, &[]).unwrap();
            assert!(reply.is(ResponseCode::UnsupportedFeature));
        }
    }

    mod datalogging {
        use super::*;

        const VALUE: usize = 0x1000;

        /// Log the byte at `VALUE` in loop `loop_id`, triggering at 50.
        fn configure_request(loop_id: u8) -> Vec<u8> {
            let mut data = Vec::from([loop_id]);
            data.extend_from_slice(&0x0007_u16.to_be_bytes()); // config id
            data.extend_from_slice(&1_u16.to_be_bytes()); // decimation
            data.push(255); // probe location
            data.extend_from_slice(&0_u32.to_be_bytes()); // timeout
            data.push(TriggerConditionId::Equal.into());
            data.extend_from_slice(&0_u32.to_be_bytes()); // hold time
            data.push(2);
            data.push(OperandType::Var.into());
            data.push(VariableType::Uint8.into());
            data.extend(address(VALUE));
            data.push(OperandType::Literal.into());
            data.extend_from_slice(&50.0_f32.to_be_bytes());
            data.push(1);
            data.push(LoggableType::Memory.into());
            data.extend(address(VALUE));
            data.push(1);
            data
        }

        fn pump(
            handler: &mut MainHandler<'_>,
            looph: &mut LoopHandler<'_>,
            mem: &SimMemory,
            value: u8,
        ) {
            mem.fill(VALUE, &[value]);
            looph.process(100);
            handler.process(10);
        }

        #[test]
        fn acquisition_through_a_loop() {
            let mem = SimMemory::new(0x1000);
            let loops = [
                LoopChannel::new(
                    LoopType::FixedFrequency {
                        timestep_100ns: 100,
                    },
                    "fast",
                    true,
                ),
                LoopChannel::new(LoopType::VariableFrequency, "idle", false),
            ];
            let dl_buf = &mut [0; 64];
            let base = base_config(&mem);
            let mut dl = DataLogger::new(base.memory_guard(), base.rpv_table(), dl_buf);
            let (rx, tx) = (&mut [0; 128], &mut [0; 32]);
            let config = base
                .set_buffers(rx, tx)
                .set_loops(&loops)
                .set_datalogging(&mut dl);
            let mut handler = MainHandler::new(config).unwrap();
            let mut looph = LoopHandler::new(&loops[0]);
            connect(&mut handler);

            let reply = request(&mut handler, 5, 1, &[]).unwrap();
            assert_eq!(reply.data, [0, 0, 0, 64, 0, 32]);

            // Datalogging is not allowed in the second loop.
            let reply = request(&mut handler, 5, 2, &configure_request(1)).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
            let reply = request(&mut handler, 5, 3, &[]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));

            let reply = request(&mut handler, 5, 2, &configure_request(0)).unwrap();
            assert!(reply.is(ResponseCode::Ok));

            // The loop samples as soon as it owns the datalogger.
            handler.process(10);
            for value in 1..=10 {
                pump(&mut handler, &mut looph, &mem, value);
            }
            assert!(looph.owns_datalogger());

            let reply = request(&mut handler, 5, 3, &[]).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            for value in 20..=50 {
                pump(&mut handler, &mut looph, &mem, value);
            }
            for _ in 0..3 {
                pump(&mut handler, &mut looph, &mem, 0);
            }

            let reply = request(&mut handler, 5, 5, &[]).unwrap();
            assert_eq!(reply.data, [4, 0, 0, 0, 0, 0, 0, 0, 1]);

            // The datalogger has to come back first.
            send(&mut handler, 5, 6, &[]);
            assert!(pop_reply(&mut handler).is_none());
            for _ in 0..3 {
                pump(&mut handler, &mut looph, &mem, 0);
            }
            assert!(!looph.owns_datalogger());
            let reply = pop_reply(&mut handler).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            let mut expected = Vec::new();
            expected.extend_from_slice(&1_u16.to_be_bytes());
            expected.extend_from_slice(&7_u16.to_be_bytes());
            expected.extend_from_slice(&41_u32.to_be_bytes());
            expected.extend_from_slice(&41_u32.to_be_bytes());
            expected.extend_from_slice(&1_u32.to_be_bytes());
            assert_eq!(reply.data, expected);

            let mut rows: Vec<u8> = (1..=10).collect();
            rows.extend(20..=50);

            // 24 bytes of data per chunk with a 32 bytes buffer.
            let first = request(&mut handler, 5, 7, &[]).unwrap();
            assert!(first.is(ResponseCode::Ok));
            assert_eq!(&first.data[..4], &[0, 0, 0, 1]);
            assert_eq!(&first.data[4..], &rows[..24]);
            let last = request(&mut handler, 5, 7, &[]).unwrap();
            assert_eq!(&last.data[..4], &[1, 1, 0, 1]);
            assert_eq!(&last.data[4..21], &rows[24..]);
            assert_eq!(&last.data[21..], &crc32(&rows, 0).to_be_bytes());

            // Reading again restarts from the oldest entry.
            let again = request(&mut handler, 5, 7, &[]).unwrap();
            assert_eq!(&again.data[..4], &[0, 2, 0, 1]);
            assert_eq!(&again.data[4..], &rows[..24]);

            let reply = request(&mut handler, 5, 8, &[]).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            let reply = request(&mut handler, 5, 5, &[]).unwrap();
            assert_eq!(reply.data[0], 0);
            let reply = request(&mut handler, 5, 6, &[]).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
        }

        #[test]
        fn reset_and_reconfigure_while_a_loop_samples() {
            let mem = SimMemory::new(0x1000);
            let loops = [LoopChannel::new(
                LoopType::FixedFrequency {
                    timestep_100ns: 100,
                },
                "fast",
                true,
            )];
            let dl_buf = &mut [0; 64];
            let base = base_config(&mem);
            let mut dl = DataLogger::new(base.memory_guard(), base.rpv_table(), dl_buf);
            let (rx, tx) = (&mut [0; 128], &mut [0; 64]);
            let config = base
                .set_buffers(rx, tx)
                .set_loops(&loops)
                .set_datalogging(&mut dl);
            let mut handler = MainHandler::new(config).unwrap();
            let mut looph = LoopHandler::new(&loops[0]);
            connect(&mut handler);

            let reply = request(&mut handler, 5, 2, &configure_request(0)).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            for value in 1..=5 {
                pump(&mut handler, &mut looph, &mem, value);
            }
            assert!(looph.owns_datalogger());

            send(&mut handler, 5, 8, &[]);
            assert!(pop_reply(&mut handler).is_none());
            for _ in 0..3 {
                pump(&mut handler, &mut looph, &mem, 0);
            }
            let reply = pop_reply(&mut handler).unwrap();
            assert_eq!((reply.command_id, reply.subfunction_id), (5, 8));
            assert!(reply.is(ResponseCode::Ok));
            assert!(!looph.owns_datalogger());
            let reply = request(&mut handler, 5, 5, &[]).unwrap();
            assert_eq!(reply.data[0], 0);

            let reply = request(&mut handler, 5, 2, &configure_request(0)).unwrap();
            assert!(reply.is(ResponseCode::Ok));
            for _ in 0..3 {
                pump(&mut handler, &mut looph, &mem, 0);
            }
            assert!(looph.owns_datalogger());

            // Configuring again brings it back, then hands it to the loop.
            send(&mut handler, 5, 2, &configure_request(0));
            assert!(pop_reply(&mut handler).is_none());
            for _ in 0..4 {
                pump(&mut handler, &mut looph, &mem, 0);
            }
            let reply = pop_reply(&mut handler).unwrap();
            assert_eq!((reply.command_id, reply.subfunction_id), (5, 2));
            assert!(reply.is(ResponseCode::Ok));
            assert!(looph.owns_datalogger());
        }

        #[test]
        fn bad_configuration() {
            let mem = SimMemory::new(0x1000);
            let loops = [LoopChannel::new(LoopType::VariableFrequency, "main", true)];
            let dl_buf = &mut [0; 64];
            let base = base_config(&mem);
            let mut dl = DataLogger::new(base.memory_guard(), base.rpv_table(), dl_buf);
            let (rx, tx) = (&mut [0; 128], &mut [0; 64]);
            let config = base
                .set_buffers(rx, tx)
                .set_loops(&loops)
                .set_datalogging(&mut dl);
            let mut handler = MainHandler::new(config).unwrap();
            connect(&mut handler);

            let mut data = configure_request(0);
            data.push(0);
            let reply = request(&mut handler, 5, 2, &data).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));

            // Logging a forbidden address.
            let mut data = configure_request(0);
            let item = data.len() - 1 - ADDRESS_SIZE;
            data[item..item + ADDRESS_SIZE].copy_from_slice(&address(0x1100));
            let reply = request(&mut handler, 5, 2, &data).unwrap();
            assert!(reply.is(ResponseCode::InvalidRequest));
            let reply = request(&mut handler, 5, 5, &[]).unwrap();
            assert_eq!(reply.data[0], 5);

            let reply = request(&mut handler, 5, 2, &configure_request(2)).unwrap();
            assert!(reply.is(ResponseCode::FailureToProceed));
        }
    }
}
