//! Helpers for the construction of test and bench systems.

use dotmatrix_common::error::Error;

use crate::gb::GameBoy;

#[derive(Default)]
pub struct TestOptions {
    /// Skips the boot sequence, placing the system directly in the
    /// post boot state.
    pub boot: Option<bool>,

    /// Attaches a capture buffer to the serial port so that test ROM
    /// output can be inspected.
    pub buffer_serial: Option<bool>,
}

/// Builds a [`GameBoy`] system ready for testing, with an empty
/// cartridge loaded and the requested options applied.
pub fn build_test(options: TestOptions) -> Box<GameBoy> {
    let mut game_boy = Box::new(GameBoy::new());
    if options.buffer_serial.unwrap_or(true) {
        game_boy.attach_buffer_serial();
    }
    game_boy.load_rom_empty().unwrap();
    if options.boot.unwrap_or(true) {
        game_boy.boot();
    }
    game_boy
}

/// Runs the ROM at the provided path for the requested number of
/// machine cycles, returning the resulting system.
pub fn run_test(
    rom_path: &str,
    max_cycles: Option<u64>,
    options: TestOptions,
) -> Result<Box<GameBoy>, Error> {
    let max_cycles = max_cycles.unwrap_or(u64::MAX);
    let mut game_boy = build_test(options);
    game_boy.load_rom_file(rom_path)?;
    game_boy.clocks_cycles(max_cycles as usize);
    Ok(game_boy)
}

/// Runs the ROM at the provided path and returns the text that the
/// program reported through the serial port.
pub fn run_serial_test(
    rom_path: &str,
    max_cycles: Option<u64>,
    options: TestOptions,
) -> Result<(String, Box<GameBoy>), Error> {
    let game_boy = run_test(rom_path, max_cycles, options)?;
    Ok((game_boy.serial_output(), game_boy))
}

#[cfg(test)]
mod tests {
    use super::{build_test, TestOptions};

    #[test]
    fn test_build_test() {
        let gb = build_test(TestOptions::default());
        assert_eq!(gb.cpu_i().pc(), 0x0100);
        assert_eq!(gb.serial_output(), "");
    }

    #[test]
    fn test_build_test_no_boot() {
        let gb = build_test(TestOptions {
            boot: Some(false),
            ..Default::default()
        });
        assert_eq!(gb.cpu_i().pc(), 0x0000);
    }
}
