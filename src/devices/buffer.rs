//! Serial sink that accumulates received bytes in memory, to be
//! inspected by tests (test ROMs report through the serial port).

use std::any::Any;

use crate::serial::SerialDevice;

pub struct BufferDevice {
    buffer: Vec<u8>,
}

impl BufferDevice {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl SerialDevice for BufferDevice {
    fn receive(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    fn description(&self) -> String {
        String::from("Buffer")
    }

    fn state(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Default for BufferDevice {
    fn default() -> Self {
        Self::new()
    }
}
