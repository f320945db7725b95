// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles shared by the unit tests.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::{
    frame::{Address, Response, ResponseCode},
    guard::MemoryAccess,
    util::crc32,
};

const SIM_MEMORY_SIZE: usize = 1024;

/// A small simulated address space starting at `base`.
pub struct SimMemory {
    base: usize,
    cells: [AtomicU8; SIM_MEMORY_SIZE],
}

impl SimMemory {
    pub fn new(base: usize) -> Self {
        Self {
            base,
            cells: core::array::from_fn(|_| AtomicU8::new(0)),
        }
    }

    pub fn get(&self, address: usize) -> u8 {
        self.cells[address - self.base].load(Ordering::Relaxed)
    }

    pub fn fill(&self, address: usize, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.cells[address - self.base + i].store(*b, Ordering::Relaxed);
        }
    }
}

impl MemoryAccess for SimMemory {
    fn read(&self, address: Address, dst: &mut [u8]) {
        for (i, b) in dst.iter_mut().enumerate() {
            *b = self.get(address.value() + i);
        }
    }

    fn write(&self, address: Address, src: &[u8]) {
        self.fill(address.value(), src);
    }
}

/// Build a complete request frame, CRC included.
pub fn request_frame(command: u8, subfunction: u8, data: &[u8], out: &mut [u8]) -> usize {
    let len = data.len();
    out[0] = command;
    out[1] = subfunction;
    out[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    out[4..4 + len].copy_from_slice(data);
    let crc = crc32(&out[..4 + len], 0);
    out[4 + len..8 + len].copy_from_slice(&crc.to_be_bytes());
    len + 8
}

/// A response frame split back into its parts, after checking its CRC.
#[derive(Debug)]
pub struct ParsedResponse<'b> {
    pub command_id: u8,
    pub subfunction_id: u8,
    pub code: u8,
    pub data: &'b [u8],
}

pub fn parse_response(frame: &[u8]) -> ParsedResponse<'_> {
    assert!(frame.len() >= 9, "response frame too short: {}", frame.len());
    let len = usize::from(u16::from_be_bytes([frame[3], frame[4]]));
    assert_eq!(frame.len(), len + 9);
    let crc = u32::from_be_bytes([
        frame[5 + len],
        frame[6 + len],
        frame[7 + len],
        frame[8 + len],
    ]);
    assert_eq!(crc32(&frame[..5 + len], 0), crc, "bad response CRC");
    ParsedResponse {
        command_id: frame[0],
        subfunction_id: frame[1],
        code: frame[2],
        data: &frame[5..5 + len],
    }
}

impl ParsedResponse<'_> {
    pub fn is_ok(&self) -> bool {
        self.code == u8::from(ResponseCode::Ok)
    }
}

#[test]
fn response_frame_parses() {
    let mut resp = Response::new(1, 2);
    resp.data_length = 1;
    let data = [0x42];
    let mut frame = [0; 10];
    frame[..5].copy_from_slice(&resp.header());
    frame[5] = 0x42;
    frame[6..].copy_from_slice(&resp.compute_crc(&data).to_be_bytes());
    let parsed = parse_response(&frame);
    assert_eq!(parsed.command_id, 0x81);
    assert!(parsed.is_ok());
    assert_eq!(parsed.data, &[0x42]);
}
