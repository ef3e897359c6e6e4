//! Game Boy emulation entrypoint and associated functions and structures.
//!
//! Most of the meaningful publicly available functions and structures to
//! build a working emulator should be present here.
//!
//! # Examples
//!
//! Creates a simple [`GameBoy`] instance, skips the boot sequence and
//! runs a frame worth of cycles.
//!
//! ```rust
//! use dotmatrix::gb::GameBoy;
//! let mut game_boy = GameBoy::new();
//! game_boy.load_rom_empty().unwrap();
//! game_boy.boot();
//! let cycles = game_boy.next_frame();
//! println!("Ran {} cycles", cycles);
//! ```

use dotmatrix_common::{error::Error, util::read_file};

use crate::{
    consts::LCDC_ADDR,
    cpu::Cpu,
    devices::{buffer::BufferDevice, stdout::StdoutDevice},
    dma::Dma,
    mmu::{Components, Mmu},
    pad::{Pad, PadKey},
    ppu::{Ppu, PpuMode, DISPLAY_HEIGHT, DISPLAY_WIDTH, FRAME_BUFFER_SIZE},
    rom::Cartridge,
    serial::{Serial, SerialDevice},
    timer::Timer,
};

/// Top level structure that abstracts the usage of the complete Game
/// Boy system under the dotmatrix emulator.
///
/// Drives every subsystem at machine-cycle granularity, in the fixed
/// per-cycle order: interrupt dispatch, serial, timer, joypad,
/// DMA, PPU (4 dots) and finally one CPU micro-op.
///
/// Should serve as the main entry-point API.
pub struct GameBoy {
    /// Reference to the Game Boy CPU component, which owns the MMU
    /// (and through it every other component) as the main element
    /// of the system.
    cpu: Cpu,
}

impl GameBoy {
    /// The logic frequency of the Game Boy master clock in Hz
    /// (dots per second).
    pub const CPU_FREQ: u32 = 4194304;

    /// The visual frequency (refresh rate) of the Game Boy.
    pub const VISUAL_FREQ: f32 = 59.7275;

    /// Master clock dots per full frame (154 scanlines of 456 dots).
    pub const LCD_CYCLES: u32 = 70224;

    /// Machine cycles per full frame.
    pub const FRAME_CYCLES: u32 = Self::LCD_CYCLES / 4;

    pub fn new() -> Self {
        let components = Components {
            ppu: Ppu::default(),
            dma: Dma::default(),
            pad: Pad::default(),
            timer: Timer::default(),
            serial: Serial::default(),
        };
        let mmu = Mmu::new(components);
        let cpu = Cpu::new(mmu);
        Self { cpu }
    }

    pub fn reset(&mut self) {
        self.ppu().reset();
        self.timer().reset();
        self.serial().reset();
        self.pad().reset();
        self.dma().reset();
        self.mmu().reset();
        self.cpu.reset();
    }

    /// Advances the complete system by one machine cycle (4 dots),
    /// running every subsystem in the fixed documented order. Flags
    /// raised by a component become visible to the CPU's interrupt
    /// dispatch at the head of the following cycle.
    pub fn clock(&mut self) {
        self.cpu.service_interrupts();
        self.serial_clock();
        self.timer_clock();
        self.pad_clock();
        self.dma_clock();
        self.ppu_clock();
        self.cpu.step();
    }

    /// Equivalent to `clock()` but allows the execution of multiple
    /// clock operations in a single call.
    pub fn clocks(&mut self, count: usize) -> u64 {
        for _ in 0..count {
            self.clock();
        }
        count as u64
    }

    /// Clocks the emulator until the limit of machine cycles that
    /// has been provided, returning the cycles executed.
    pub fn clocks_cycles(&mut self, limit: usize) -> u64 {
        let mut cycles = 0u64;
        while cycles < limit as u64 {
            self.clock();
            cycles += 1;
            if self.stopped() {
                break;
            }
        }
        cycles
    }

    /// Runs the system until the PPU finishes the frame currently in
    /// drawing, returning the number of machine cycles consumed.
    pub fn next_frame(&mut self) -> u32 {
        let mut cycles = 0u32;
        let current_frame = self.ppu_frame();
        while self.ppu_frame() == current_frame {
            self.clock();
            cycles += 1;
            if self.stopped() {
                break;
            }
        }
        cycles
    }

    /// Runs clock operations until the PC (Program Counter) reaches
    /// the provided address or the CPU latches a STOP.
    pub fn step_to(&mut self, addr: u16) -> u32 {
        let mut cycles = 0u32;
        while self.cpu.pc() != addr {
            self.clock();
            cycles += 1;
            if self.stopped() {
                break;
            }
        }
        cycles
    }

    pub fn key_press(&mut self, key: PadKey) {
        self.pad().key_press(key);
    }

    pub fn key_lift(&mut self, key: PadKey) {
        self.pad().key_lift(key);
    }

    fn serial_clock(&mut self) {
        self.serial().clock();
    }

    fn timer_clock(&mut self) {
        self.timer().clock();
    }

    fn pad_clock(&mut self) {
        self.pad().clock();
    }

    fn dma_clock(&mut self) {
        self.mmu().clock_dma();
    }

    fn ppu_clock(&mut self) {
        self.ppu().clock();
    }

    /// Direct boot method that immediately jumps the machine to the
    /// post boot state, efficiently skipping the boot sequence and
    /// jumping to the cartridge execution.
    pub fn boot(&mut self) {
        self.cpu.boot();
        self.mmu().set_boot_active(false);

        // LCD enabled with background drawing active, the state the
        // boot sequence leaves behind (required by some ROMs)
        self.mmu().write(LCDC_ADDR, 0x91);
    }

    /// Loads the provided 256 byte boot image, mapping it over the
    /// bottom of the address space until the unmap latch is written.
    pub fn load_boot(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() != 256 {
            return Err(Error::IncompatibleBootRom);
        }
        self.mmu().write_boot(0x0000, data);
        Ok(())
    }

    pub fn load_boot_file(&mut self, path: &str) -> Result<(), Error> {
        let data = read_file(path)?;
        self.load_boot(&data)
    }

    pub fn load_rom(&mut self, data: &[u8]) -> Result<&Cartridge, Error> {
        let rom = Cartridge::from_data(data)?;
        self.mmu().set_rom(rom);
        Ok(self.rom_i())
    }

    pub fn load_rom_file(&mut self, path: &str) -> Result<&Cartridge, Error> {
        let data = read_file(path)?;
        self.load_rom(&data)
    }

    /// Loads a zeroed 32 KB cartridge with a plain (no MBC) header,
    /// useful for tests and benches that only need the CPU running.
    pub fn load_rom_empty(&mut self) -> Result<&Cartridge, Error> {
        let data = vec![0x00; 0x8000];
        self.load_rom(&data)
    }

    /// Loads a cartridge backed by the flat writable test mapper,
    /// used by CPU oracle harnesses.
    pub fn load_rom_flat(&mut self) -> &Cartridge {
        self.mmu().set_rom(Cartridge::test_flat());
        self.rom_i()
    }

    pub fn attach_stdout_serial(&mut self) {
        self.attach_serial(Box::<StdoutDevice>::default());
    }

    pub fn attach_buffer_serial(&mut self) {
        self.attach_serial(Box::<BufferDevice>::default());
    }

    pub fn attach_serial(&mut self, device: Box<dyn SerialDevice>) {
        self.serial().set_device(device);
    }

    /// Obtains the text accumulated by an attached buffer serial
    /// device, the channel test ROMs report through.
    pub fn serial_output(&self) -> String {
        self.serial_i().device().state()
    }

    #[inline(always)]
    pub fn cpu(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    #[inline(always)]
    pub fn cpu_i(&self) -> &Cpu {
        &self.cpu
    }

    #[inline(always)]
    pub fn mmu(&mut self) -> &mut Mmu {
        self.cpu.mmu()
    }

    #[inline(always)]
    pub fn mmu_i(&self) -> &Mmu {
        self.cpu.mmu_i()
    }

    #[inline(always)]
    pub fn ppu(&mut self) -> &mut Ppu {
        self.cpu.mmu().ppu()
    }

    #[inline(always)]
    pub fn ppu_i(&self) -> &Ppu {
        self.cpu.mmu_i().ppu_i()
    }

    #[inline(always)]
    pub fn dma(&mut self) -> &mut Dma {
        self.cpu.mmu().dma()
    }

    #[inline(always)]
    pub fn dma_i(&self) -> &Dma {
        self.cpu.mmu_i().dma_i()
    }

    #[inline(always)]
    pub fn pad(&mut self) -> &mut Pad {
        self.cpu.mmu().pad()
    }

    #[inline(always)]
    pub fn pad_i(&self) -> &Pad {
        self.cpu.mmu_i().pad_i()
    }

    #[inline(always)]
    pub fn timer(&mut self) -> &mut Timer {
        self.cpu.mmu().timer()
    }

    #[inline(always)]
    pub fn timer_i(&self) -> &Timer {
        self.cpu.mmu_i().timer_i()
    }

    #[inline(always)]
    pub fn serial(&mut self) -> &mut Serial {
        self.cpu.mmu().serial()
    }

    #[inline(always)]
    pub fn serial_i(&self) -> &Serial {
        self.cpu.mmu_i().serial_i()
    }

    #[inline(always)]
    pub fn rom(&mut self) -> &mut Cartridge {
        self.cpu.mmu().rom()
    }

    #[inline(always)]
    pub fn rom_i(&self) -> &Cartridge {
        self.cpu.mmu_i().rom_i()
    }

    #[inline(always)]
    pub fn ppu_ly(&self) -> u8 {
        self.ppu_i().ly()
    }

    #[inline(always)]
    pub fn ppu_mode(&self) -> PpuMode {
        self.ppu_i().mode()
    }

    #[inline(always)]
    pub fn ppu_frame(&self) -> u16 {
        self.ppu_i().frame_index()
    }

    /// The 160x144 shade frame buffer exposed to the display host,
    /// one value in 0..=3 per pixel.
    #[inline(always)]
    pub fn frame_buffer(&self) -> &[u8; FRAME_BUFFER_SIZE] {
        self.ppu_i().frame_buffer()
    }

    #[inline(always)]
    pub fn display_width(&self) -> usize {
        DISPLAY_WIDTH
    }

    #[inline(always)]
    pub fn display_height(&self) -> usize {
        DISPLAY_HEIGHT
    }

    /// Whether the CPU has latched a STOP instruction, a condition
    /// the driver is expected to surface as a diagnostic.
    #[inline(always)]
    pub fn stopped(&self) -> bool {
        self.cpu_i().stopped()
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::GameBoy;
    use crate::consts::{IE_ADDR, TAC_ADDR, TIMA_ADDR, TMA_ADDR};
    use crate::ppu::PpuMode;

    #[test]
    fn test_frame_cycles() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();
        gb.boot();
        let cycles = gb.next_frame();
        assert_eq!(cycles, GameBoy::FRAME_CYCLES);
    }

    #[test]
    fn test_vblank_interrupt_visibility() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();
        gb.boot();

        // enable the VBlank interrupt and run until dispatch: the
        // handler lives at vector 0x40
        gb.mmu().write(IE_ADDR, 0x01);
        gb.cpu().set_ime(true);
        let cycles = gb.step_to(0x0040);
        assert!(cycles > 0);
        assert_eq!(gb.ppu_mode(), PpuMode::VBlank);
    }

    #[test]
    fn test_timer_interrupt_ordering() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();
        gb.boot();

        // fastest tap with a modulo close to overflow
        gb.mmu().write(TMA_ADDR, 0xf0);
        gb.mmu().write(TIMA_ADDR, 0xff);
        gb.mmu().write(TAC_ADDR, 0x05);
        gb.mmu().write(IE_ADDR, 0x04);
        gb.cpu().set_ime(true);

        let cycles = gb.step_to(0x0050);
        assert!(cycles > 0);
    }

    #[test]
    fn test_oam_dma_scenario() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();

        for index in 0..0xa0u16 {
            gb.mmu().write(0xc000 + index, index as u8);
        }
        gb.mmu().write(0xff46, 0xc0);

        gb.clocks(161);
        assert!(!gb.dma_i().active());
        for index in 0..0xa0u16 {
            assert_eq!(gb.mmu().read(0xfe00 + index), index as u8);
        }
    }

    #[test]
    fn test_stopped_surfaces() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();
        gb.boot();

        // place a STOP at the entrypoint via the work RAM trampoline
        gb.mmu().write(0xc000, 0x10);
        gb.cpu().set_pc(0xc000);
        gb.clocks(2);
        assert!(gb.stopped());
    }

    #[test]
    fn test_serial_capture() {
        let mut gb = GameBoy::new();
        gb.load_rom_empty().unwrap();
        gb.attach_buffer_serial();

        gb.mmu().write(0xff01, b'h');
        gb.mmu().write(0xff02, 0x81);
        gb.clock();
        gb.mmu().write(0xff01, b'i');
        gb.mmu().write(0xff02, 0x81);
        gb.clock();

        assert_eq!(gb.serial_output(), "hi");
    }
}
