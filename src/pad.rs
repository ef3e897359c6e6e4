//! Gamepad related functions and structures.
//!
//! Host input arrives asynchronously as edge events deposited into a
//! shared slot; the pad drains that slot at its per-cycle tick, latching
//! key state and raising the joypad interrupt on press edges.

use std::sync::Mutex;

use dotmatrix_common::util::SharedThread;

use crate::{consts::P1_ADDR, warnln};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PadKey {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
}

#[derive(Clone, Copy, PartialEq)]
pub enum PadSelection {
    Action,
    Direction,
    Both,
    None,
}

/// A single host-side key transition, pressed (`true`) or
/// released (`false`).
pub type PadEvent = (PadKey, bool);

pub struct Pad {
    down: bool,
    up: bool,
    left: bool,
    right: bool,
    start: bool,
    select: bool,
    b: bool,
    a: bool,
    selection: PadSelection,

    /// Edge events deposited by the host, drained once per machine
    /// cycle. Kept behind a mutex as the host side may live on
    /// another thread.
    events: SharedThread<Vec<PadEvent>>,

    int_pad: bool,
}

impl Pad {
    pub fn new() -> Self {
        Self {
            down: false,
            up: false,
            left: false,
            right: false,
            start: false,
            select: false,
            b: false,
            a: false,
            selection: PadSelection::None,
            events: SharedThread::new(Mutex::new(Vec::new())),
            int_pad: false,
        }
    }

    pub fn reset(&mut self) {
        self.down = false;
        self.up = false;
        self.left = false;
        self.right = false;
        self.start = false;
        self.select = false;
        self.b = false;
        self.a = false;
        self.selection = PadSelection::None;
        self.events.lock().unwrap().clear();
        self.int_pad = false;
    }

    /// Drains the pending host events, updating the latched key state
    /// and requesting the joypad interrupt whenever any key transitions
    /// from released to pressed. Duplicate transitions are idempotent.
    pub fn clock(&mut self) {
        let drained: Vec<_> = {
            let mut events = self.events.lock().unwrap();
            events.drain(..).collect()
        };
        for (key, pressed) in drained {
            let state = self.key_state(key);
            if pressed && !state {
                self.int_pad = true;
            }
            self.set_key_state(key, pressed);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            P1_ADDR => {
                let mut value = 0x0f;
                if self.selection == PadSelection::Action
                    || self.selection == PadSelection::Both
                {
                    value &= if self.a { 0x0e } else { 0x0f }
                        & if self.b { 0x0d } else { 0x0f }
                        & if self.select { 0x0b } else { 0x0f }
                        & if self.start { 0x07 } else { 0x0f }
                }
                if self.selection == PadSelection::Direction
                    || self.selection == PadSelection::Both
                {
                    value &= if self.right { 0x0e } else { 0x0f }
                        & if self.left { 0x0d } else { 0x0f }
                        & if self.up { 0x0b } else { 0x0f }
                        & if self.down { 0x07 } else { 0x0f }
                }
                value |= match self.selection {
                    PadSelection::Action => 0x10,
                    PadSelection::Direction => 0x20,
                    PadSelection::Both => 0x00,
                    PadSelection::None => 0x30,
                };
                value | 0xc0
            }
            _ => {
                warnln!("Reading from unknown Pad location 0x{:04x}", addr);
                0xff
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            // only the two select bits are writable, the key nibble
            // is read-only
            P1_ADDR => {
                self.selection = match (value >> 4) & 0x03 {
                    0x00 => PadSelection::Both,
                    0x01 => PadSelection::Action,
                    0x02 => PadSelection::Direction,
                    _ => PadSelection::None,
                }
            }
            _ => warnln!("Writing to unknown Pad location 0x{:04x}", addr),
        }
    }

    /// Obtains the handle used by the host to deposit key events, to be
    /// consumed at the next pad tick.
    pub fn events(&self) -> SharedThread<Vec<PadEvent>> {
        self.events.clone()
    }

    pub fn key_press(&mut self, key: PadKey) {
        self.events.lock().unwrap().push((key, true));
    }

    pub fn key_lift(&mut self, key: PadKey) {
        self.events.lock().unwrap().push((key, false));
    }

    fn key_state(&self, key: PadKey) -> bool {
        match key {
            PadKey::Up => self.up,
            PadKey::Down => self.down,
            PadKey::Left => self.left,
            PadKey::Right => self.right,
            PadKey::Start => self.start,
            PadKey::Select => self.select,
            PadKey::A => self.a,
            PadKey::B => self.b,
        }
    }

    fn set_key_state(&mut self, key: PadKey, value: bool) {
        match key {
            PadKey::Up => self.up = value,
            PadKey::Down => self.down = value,
            PadKey::Left => self.left = value,
            PadKey::Right => self.right = value,
            PadKey::Start => self.start = value,
            PadKey::Select => self.select = value,
            PadKey::A => self.a = value,
            PadKey::B => self.b = value,
        }
    }

    #[inline(always)]
    pub fn int_pad(&self) -> bool {
        self.int_pad
    }

    #[inline(always)]
    pub fn set_int_pad(&mut self, value: bool) {
        self.int_pad = value;
    }

    #[inline(always)]
    pub fn ack_pad(&mut self) {
        self.set_int_pad(false);
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Pad, PadKey, PadSelection};
    use crate::consts::P1_ADDR;

    #[test]
    fn test_read_active_low() {
        let mut pad = Pad::new();
        pad.key_press(PadKey::A);
        pad.key_press(PadKey::Down);
        pad.clock();

        pad.selection = PadSelection::Action;
        assert_eq!(pad.read(P1_ADDR) & 0x0f, 0x0e);

        pad.selection = PadSelection::Direction;
        assert_eq!(pad.read(P1_ADDR) & 0x0f, 0x07);

        pad.selection = PadSelection::None;
        assert_eq!(pad.read(P1_ADDR) & 0x0f, 0x0f);
    }

    #[test]
    fn test_select_bits_writable_only() {
        let mut pad = Pad::new();
        pad.write(P1_ADDR, 0x20);
        assert!(pad.selection == PadSelection::Direction);
        pad.write(P1_ADDR, 0x10);
        assert!(pad.selection == PadSelection::Action);

        // the key nibble is untouched by writes
        pad.key_press(PadKey::A);
        pad.clock();
        pad.write(P1_ADDR, 0x1f);
        assert_eq!(pad.read(P1_ADDR) & 0x0f, 0x0e);
    }

    #[test]
    fn test_press_edge_interrupt() {
        let mut pad = Pad::new();
        pad.key_press(PadKey::Start);
        pad.clock();
        assert!(pad.int_pad());

        pad.ack_pad();

        // duplicate press is idempotent, no new edge
        pad.key_press(PadKey::Start);
        pad.clock();
        assert!(!pad.int_pad());

        // release then press is a new edge
        pad.key_lift(PadKey::Start);
        pad.clock();
        pad.key_press(PadKey::Start);
        pad.clock();
        assert!(pad.int_pad());
    }
}
