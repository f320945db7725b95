// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-slot mailbox between two execution contexts.

use core::{
    cell::UnsafeCell,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

/// A one-message, one-producer, one-consumer slot.
///
/// The producer writes the message before publishing the flag with
/// release ordering; the consumer observes the flag with acquire ordering
/// before taking the message. Each side must stay in a single context.
pub struct Mailbox<T> {
    data: UnsafeCell<Option<T>>,
    written: AtomicBool,
}

// The flag hands exclusive access to `data` back and forth.
unsafe impl<T: Send> Sync for Mailbox<T> {}

impl<T> Mailbox<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new(None),
            written: AtomicBool::new(false),
        }
    }

    /// Post `message`, handing it back if the slot is still occupied.
    pub fn send(&self, message: T) -> Result<(), T> {
        if self.written.load(Ordering::Acquire) {
            return Err(message);
        }
        // SAFETY: the consumer does not touch `data` while the flag is clear.
        unsafe {
            *self.data.get() = Some(message);
        }
        self.written.store(true, Ordering::Release);
        Ok(())
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// Take the pending message, if any.
    pub fn pop(&self) -> Option<T> {
        if !self.written.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the producer does not touch `data` while the flag is set.
        let message = unsafe { (*self.data.get()).take() };
        self.written.store(false, Ordering::Release);
        message
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("has_content", &self.has_content())
            .finish()
    }
}
