// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic loop context and the datalogger ownership handoff.
//!
//! The datalogger is moved between the main context and a loop as a
//! `&mut` reference carried by a message. Whoever holds the reference is
//! the only one allowed to call into the datalogger.

use crate::{
    codec::{LoopDefinition, LoopType},
    datalogging::DataLogger,
    frame::DataloggerStatus,
    ipc::Mailbox,
    timebase::Timebase,
};

/// Messages from the main context to a loop.
#[derive(Debug)]
pub enum Main2Loop<'a> {
    TakeOwnership(&'a mut DataLogger<'a>),
    ReleaseOwnership,
    ArmTrigger,
    DisarmTrigger,
}

/// Messages from a loop to the main context.
#[derive(Debug)]
pub enum Loop2Main<'a> {
    OwnershipTaken,
    OwnershipReleased(&'a mut DataLogger<'a>),
    DataAcquired,
    StatusUpdate(DataloggerStatus),
}

/// State shared by the main context and one loop.
#[derive(Debug)]
pub struct LoopChannel<'a> {
    loop_type: LoopType,
    name: &'a str,
    datalogging_allowed: bool,
    main2loop: Mailbox<Main2Loop<'a>>,
    loop2main: Mailbox<Loop2Main<'a>>,
}

impl<'a> LoopChannel<'a> {
    #[must_use]
    pub const fn new(loop_type: LoopType, name: &'a str, datalogging_allowed: bool) -> Self {
        Self {
            loop_type,
            name,
            datalogging_allowed,
            main2loop: Mailbox::new(),
            loop2main: Mailbox::new(),
        }
    }

    #[must_use]
    pub const fn loop_type(&self) -> LoopType {
        self.loop_type
    }

    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    #[must_use]
    pub const fn datalogging_allowed(&self) -> bool {
        self.datalogging_allowed
    }

    #[must_use]
    pub const fn definition(&self) -> LoopDefinition<'a> {
        LoopDefinition {
            loop_type: self.loop_type,
            datalogging_allowed: self.datalogging_allowed,
            name: self.name,
        }
    }

    pub(crate) const fn main2loop(&self) -> &Mailbox<Main2Loop<'a>> {
        &self.main2loop
    }

    pub(crate) const fn loop2main(&self) -> &Mailbox<Loop2Main<'a>> {
        &self.loop2main
    }
}

/// The loop side of a [`LoopChannel`].
///
/// [`LoopHandler::process`] is to be called from the loop context on every
/// iteration.
#[derive(Debug)]
pub struct LoopHandler<'a> {
    channel: &'a LoopChannel<'a>,
    timebase: Timebase,
    datalogger: Option<&'a mut DataLogger<'a>>,
    to_release: Option<&'a mut DataLogger<'a>>,
    notify_taken: bool,
    acquired_notified: bool,
    last_status: Option<DataloggerStatus>,
}

impl<'a> LoopHandler<'a> {
    #[must_use]
    pub const fn new(channel: &'a LoopChannel<'a>) -> Self {
        Self {
            channel,
            timebase: Timebase::new(),
            datalogger: None,
            to_release: None,
            notify_taken: false,
            acquired_notified: false,
            last_status: None,
        }
    }

    #[must_use]
    pub const fn channel(&self) -> &'a LoopChannel<'a> {
        self.channel
    }

    #[must_use]
    pub const fn timebase(&self) -> &Timebase {
        &self.timebase
    }

    #[must_use]
    pub const fn owns_datalogger(&self) -> bool {
        self.datalogger.is_some()
    }

    /// Run one iteration that lasted `timestep_100ns`.
    pub fn process(&mut self, timestep_100ns: u32) {
        self.timebase.step(timestep_100ns);
        if let Some(message) = self.channel.main2loop().pop() {
            self.handle_message(message);
        }
        if let Some(datalogger) = self.datalogger.as_deref_mut() {
            datalogger.process(&self.timebase);
        }
        self.post_notice();
    }

    fn handle_message(&mut self, message: Main2Loop<'a>) {
        match message {
            Main2Loop::TakeOwnership(datalogger) => {
                log::debug!("Loop {} takes the datalogger", self.channel.name());
                self.datalogger = Some(datalogger);
                self.notify_taken = true;
                self.acquired_notified = false;
                self.last_status = None;
            }
            Main2Loop::ReleaseOwnership => {
                if let Some(datalogger) = self.datalogger.take() {
                    log::debug!("Loop {} releases the datalogger", self.channel.name());
                    self.to_release = Some(datalogger);
                }
            }
            Main2Loop::ArmTrigger => {
                if let Some(datalogger) = self.datalogger.as_deref_mut() {
                    datalogger.arm_trigger();
                }
            }
            Main2Loop::DisarmTrigger => {
                if let Some(datalogger) = self.datalogger.as_deref_mut() {
                    datalogger.disarm_trigger();
                }
            }
        }
    }

    /// Post at most one notice, the datalogger itself taking precedence.
    fn post_notice(&mut self) {
        if self.channel.loop2main().has_content() {
            return;
        }
        let notice = if let Some(datalogger) = self.to_release.take() {
            Loop2Main::OwnershipReleased(datalogger)
        } else if self.notify_taken {
            self.notify_taken = false;
            Loop2Main::OwnershipTaken
        } else if let Some(datalogger) = self.datalogger.as_deref() {
            let acquired = datalogger.data_acquired();
            let status = datalogger.status();
            if !acquired {
                self.acquired_notified = false;
            }
            if acquired && !self.acquired_notified {
                self.acquired_notified = true;
                Loop2Main::DataAcquired
            } else if self.last_status != Some(status) {
                self.last_status = Some(status);
                Loop2Main::StatusUpdate(status)
            } else {
                return;
            }
        } else {
            return;
        };
        if let Err(Loop2Main::OwnershipReleased(datalogger)) =
            self.channel.loop2main().send(notice)
        {
            self.to_release = Some(datalogger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{
            Address, Configuration, DataloggerState, LoggableItem, TriggerConditionId,
            TriggerConfig,
        },
        guard::MemoryGuard,
        rpv::RpvTable,
        testing::SimMemory,
    };

    fn config() -> Configuration {
        let mut config = Configuration {
            probe_location: 255,
            trigger: TriggerConfig {
                condition: TriggerConditionId::AlwaysTrue,
                ..Default::default()
            },
            items_count: 1,
            ..Default::default()
        };
        config.items_to_log[0] = LoggableItem::Memory {
            address: Address(0x1000),
            size: 4,
        };
        config
    }

    #[test]
    fn definition() {
        let channel = LoopChannel::new(
            LoopType::FixedFrequency {
                timestep_100ns: 1000,
            },
            "control",
            true,
        );
        let def = channel.definition();
        assert_eq!(def.name, "control");
        assert!(def.datalogging_allowed);
        assert_eq!(def.loop_type.value(), 0);
    }

    #[test]
    fn ownership_round_trip() {
        let mem = SimMemory::new(0x1000);
        let guard = MemoryGuard::new(&mem, &[], &[]);
        let buf = &mut [0; 16];
        let mut dl = DataLogger::new(guard, RpvTable::default(), buf);
        dl.configure(&config(), 1).unwrap();

        let channel = LoopChannel::new(LoopType::VariableFrequency, "idle", true);
        let mut handler = LoopHandler::new(&channel);

        channel
            .main2loop()
            .send(Main2Loop::TakeOwnership(&mut dl))
            .unwrap();
        handler.process(100);
        assert!(handler.owns_datalogger());
        assert!(matches!(
            channel.loop2main().pop(),
            Some(Loop2Main::OwnershipTaken)
        ));

        handler.process(100);
        match channel.loop2main().pop() {
            Some(Loop2Main::StatusUpdate(status)) => {
                assert_eq!(status.state, DataloggerState::Configured);
            }
            other => panic!("unexpected notice: {other:?}"),
        }

        channel.main2loop().send(Main2Loop::ArmTrigger).unwrap();
        handler.process(100);
        assert!(matches!(
            channel.loop2main().pop(),
            Some(Loop2Main::DataAcquired)
        ));
        handler.process(100);
        match channel.loop2main().pop() {
            Some(Loop2Main::StatusUpdate(status)) => {
                assert_eq!(status.state, DataloggerState::AcquisitionCompleted);
            }
            other => panic!("unexpected notice: {other:?}"),
        }
        // Nothing changed since.
        handler.process(100);
        assert!(channel.loop2main().pop().is_none());

        channel
            .main2loop()
            .send(Main2Loop::ReleaseOwnership)
            .unwrap();
        handler.process(100);
        assert!(!handler.owns_datalogger());
        let dl = match channel.loop2main().pop() {
            Some(Loop2Main::OwnershipReleased(dl)) => dl,
            other => panic!("unexpected notice: {other:?}"),
        };
        assert_eq!(dl.acquisition_id(), 1);
        assert_eq!(handler.timebase().timestamp(), 600);
    }

    #[test]
    fn notices_wait_for_a_free_slot() {
        let mem = SimMemory::new(0x1000);
        let guard = MemoryGuard::new(&mem, &[], &[]);
        let buf = &mut [0; 16];
        let mut dl = DataLogger::new(guard, RpvTable::default(), buf);
        dl.configure(&config(), 1).unwrap();

        let channel = LoopChannel::new(LoopType::VariableFrequency, "idle", true);
        let mut handler = LoopHandler::new(&channel);
        channel
            .main2loop()
            .send(Main2Loop::TakeOwnership(&mut dl))
            .unwrap();
        handler.process(1);
        channel
            .main2loop()
            .send(Main2Loop::ReleaseOwnership)
            .unwrap();
        handler.process(1);
        // The slot still holds the first notice.
        assert!(matches!(
            channel.loop2main().pop(),
            Some(Loop2Main::OwnershipTaken)
        ));
        handler.process(1);
        assert!(matches!(
            channel.loop2main().pop(),
            Some(Loop2Main::OwnershipReleased(_))
        ));
    }
}
