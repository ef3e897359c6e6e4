//! Headless console frontend: runs a cartridge at the original
//! machine rate (or unthrottled) and drains the serial port to the
//! standard output.

use std::{
    process,
    thread::sleep,
    time::{Duration, Instant},
};

use clap::Parser;
use dotmatrix::gb::GameBoy;

#[derive(Parser)]
#[command(name = "dotmatrix-console", about = "A console frontend for dotmatrix")]
struct Args {
    /// Path of the cartridge image to run.
    rom_path: String,

    /// Path of a 256 byte boot image; the boot sequence is skipped
    /// when not provided.
    #[arg(long)]
    boot_rom: Option<String>,

    /// Runs as fast as the host allows instead of pacing to the
    /// original machine rate.
    #[arg(long)]
    fast: bool,

    /// Number of frames to run, 0 meaning no limit.
    #[arg(long, default_value_t = 0)]
    frames: u64,
}

fn main() {
    let args = Args::parse();

    let mut game_boy = GameBoy::new();
    game_boy.attach_stdout_serial();

    let rom = match game_boy.load_rom_file(&args.rom_path) {
        Ok(rom) => rom,
        Err(err) => {
            eprintln!("Failed to load {}: {}", args.rom_path, err);
            process::exit(1);
        }
    };
    println!("==== Cartridge ====\n{}\n===================", rom);

    match &args.boot_rom {
        Some(path) => {
            if let Err(err) = game_boy.load_boot_file(path) {
                eprintln!("Failed to load boot image {}: {}", path, err);
                process::exit(1);
            }
        }
        None => game_boy.boot(),
    }

    let frame_duration = Duration::from_secs_f32(1.0 / GameBoy::VISUAL_FREQ);
    let mut frame_count = 0u64;

    loop {
        let frame_start = Instant::now();
        game_boy.next_frame();
        frame_count += 1;

        if game_boy.stopped() {
            eprintln!("STOP executed at 0x{:04x}", game_boy.cpu_i().ppc);
            process::exit(1);
        }
        if args.frames != 0 && frame_count >= args.frames {
            break;
        }

        // realtime pacing: sleep out the remainder of the frame
        // budget, skipped in fast mode or when the host is behind
        if !args.fast {
            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                sleep(frame_duration - elapsed);
            }
        }
    }
}
