//! Brute-force per-opcode CPU oracle, driven by the SingleStepTests
//! sm83 JSON corpus: each case provides an initial register/RAM state,
//! the expected final state and the machine-cycle trace of a single
//! instruction.
//!
//! The corpus is not checked in; place the `v1` JSON files under
//! `tests/data/sm83/` to enable the run.

use std::path::Path;

use serde::Deserialize;

use dotmatrix::gb::GameBoy;

#[derive(Debug, Clone, Deserialize)]
struct TestCase {
    name: String,
    initial: CpuState,
    #[serde(rename = "final")]
    final_state: CpuState,
    cycles: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    f: u8,
    h: u8,
    l: u8,
    #[serde(default)]
    ime: u8,
    #[serde(default)]
    ie: u8,
    ram: Vec<(u16, u8)>,
}

fn load_initial_state(gb: &mut GameBoy, state: &CpuState) {
    let cpu = gb.cpu();
    cpu.pc = state.pc;
    cpu.sp = state.sp;
    cpu.a = state.a;
    cpu.b = state.b;
    cpu.c = state.c;
    cpu.d = state.d;
    cpu.e = state.e;
    cpu.h = state.h;
    cpu.l = state.l;
    cpu.set_f(state.f);
    cpu.set_ime(state.ime != 0);
    gb.mmu().ie = state.ie;
    for &(addr, value) in &state.ram {
        gb.mmu().write(addr, value);
    }
}

fn run_test_case(tc: &TestCase) -> Option<String> {
    let mut gb = GameBoy::new();
    gb.load_rom_flat();
    load_initial_state(&mut gb, &tc.initial);

    let cycles = gb.cpu().step_instruction() as usize;

    macro_rules! check {
        ($got:expr, $exp:expr, $name:expr) => {
            if $got != $exp {
                return Some(format!(
                    "{}: {} (got 0x{:x} exp 0x{:x})",
                    tc.name, $name, $got as u64, $exp as u64
                ));
            }
        };
    }

    let fs = &tc.final_state;
    let cpu = gb.cpu_i();
    check!(cpu.pc, fs.pc, "PC");
    check!(cpu.sp, fs.sp, "SP");
    check!(cpu.a, fs.a, "A");
    check!(cpu.b, fs.b, "B");
    check!(cpu.c, fs.c, "C");
    check!(cpu.d, fs.d, "D");
    check!(cpu.e, fs.e, "E");
    check!(cpu.f(), fs.f, "F");
    check!(cpu.h, fs.h, "H");
    check!(cpu.l, fs.l, "L");

    for &(addr, expected) in &fs.ram {
        let got = gb.mmu().read(addr);
        if got != expected {
            return Some(format!(
                "{}: RAM[0x{:04x}] (got 0x{:02x} exp 0x{:02x})",
                tc.name, addr, got, expected
            ));
        }
    }

    if cycles != tc.cycles.len() {
        return Some(format!(
            "{}: cycles (got {} exp {})",
            tc.name,
            cycles,
            tc.cycles.len()
        ));
    }

    None
}

#[test]
fn test_sm83_single_step_corpus() {
    let test_dir = Path::new("tests/data/sm83");
    if !test_dir.exists() {
        eprintln!(
            "No SingleStepTests sm83 corpus under tests/data/sm83, skipping"
        );
        return;
    }

    let mut entries: Vec<_> = std::fs::read_dir(test_dir)
        .expect("Failed to read test directory")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut total_tests = 0;
    let mut failed_tests = 0;
    let mut first_failures: Vec<String> = Vec::new();

    for entry in &entries {
        let json_path = entry.path();
        let json = std::fs::read_to_string(&json_path)
            .unwrap_or_else(|e| panic!("Failed to read {:?}: {}", json_path, e));
        let tests: Vec<TestCase> = serde_json::from_str(&json)
            .unwrap_or_else(|e| panic!("Failed to parse {:?}: {}", json_path, e));

        for tc in &tests {
            if let Some(err) = run_test_case(tc) {
                failed_tests += 1;
                if first_failures.len() < 50 {
                    first_failures.push(err);
                }
            }
        }
        total_tests += tests.len();
    }

    eprintln!(
        "sm83 SingleStepTests: {} passed, {} failed",
        total_tests - failed_tests,
        failed_tests
    );

    if !first_failures.is_empty() {
        for err in &first_failures {
            eprintln!("  {}", err);
        }
        panic!("{} sm83 corpus case(s) failed", failed_tests);
    }
}
