//! ISA (instruction set architecture) implementation for the
//! [Sharp LR35902](https://en.wikipedia.org/wiki/Game_Boy) CPU.
//!
//! Opcodes are decomposed into their octal fields and dispatched per
//! instruction family to a static descriptor whose micro-op list is
//! sized to the canonical M-cycle count of the instruction: exactly one
//! micro-op is executed per machine cycle, the first one in the same
//! cycle as the opcode fetch. Micro-ops that need an operand selector
//! (`r[y]`, `r[z]`, `rp[p]`, `cc[y]`) read it from the CPU's latched
//! current opcode, so the descriptors can stay `'static`.

use crate::cpu::Cpu;

pub const PREFIX: u8 = 0xcb;

/// A byte parsed into the octal fields used by the instruction
/// dispatch, together with the CB-prefix marker.
#[derive(Clone, Copy, Default)]
pub struct Opcode {
    pub value: u8,
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub p: u8,
    pub q: u8,
    pub prefixed: bool,
}

impl Opcode {
    pub fn decompose(value: u8, prefixed: bool) -> Self {
        Self {
            value,
            x: (value >> 6) & 0x03,
            y: (value >> 3) & 0x07,
            z: value & 0x07,
            p: (value >> 4) & 0x03,
            q: (value >> 3) & 0x01,
            prefixed,
        }
    }
}

/// Descriptor of an instruction family: the micro-op list is consumed
/// from a FIFO at a rate of one entry per machine cycle.
pub struct Instruction {
    pub mnemonic: &'static str,
    pub length: u8,
    pub ops: &'static [MicroOp],
}

/// A single-cycle micro-operation. Each entry performs at most one
/// memory access; idle cycles are explicit `Nop`s.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MicroOp {
    Nop,
    Halt,
    Stop,
    Di,
    Ei,

    LdRR,
    IncR,
    DecR,
    AluR,
    AluHl,
    AluImm,
    RotateA,
    Daa,
    Cpl,
    Scf,
    Ccf,

    AddHlRp,
    IncRp,
    DecRp,
    JpHl,
    LdSpHl,
    AddSpTmp,
    LdHlSpTmp,

    ReadImmTmpLo,
    ReadImmTmpHi,
    ReadImmR,
    ReadImmRpLo,
    ReadImmRpHi,
    ReadHlR,
    WriteHlR,
    ReadHlTmp,
    WriteHlTmp,
    WriteHlIncTmp,
    WriteHlDecTmp,
    ReadRpMemA,
    WriteRpMemA,
    ReadFFTmpA,
    WriteFFTmpA,
    ReadFFCA,
    WriteFFCA,
    ReadTmpA,
    WriteTmpA,
    WriteTmpSpLo,
    WriteTmpSpHi,

    JrCond,
    RelJump,
    JpCond,
    JumpTmp,
    JumpTmpEi,
    CallCond,
    RetCond,
    PopTmpLo,
    PopTmpHi,
    PushPcHi,
    PushPcLo,
    PushPcLoJumpTmp,
    PushPcLoJumpRst,
    JumpIntVector,
    PopRp2Lo,
    PopRp2Hi,
    PushRp2Hi,
    PushRp2Lo,

    RotR,
    BitR,
    BitHl,
    SetR,
    ResR,
    CbWriteHlTmp,
}

static NOP: Instruction = Instruction {
    mnemonic: "NOP",
    length: 1,
    ops: &[MicroOp::Nop],
};

static LD_MNN_SP: Instruction = Instruction {
    mnemonic: "LD [u16], SP",
    length: 3,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::ReadImmTmpHi,
        MicroOp::WriteTmpSpLo,
        MicroOp::WriteTmpSpHi,
    ],
};

static STOP: Instruction = Instruction {
    mnemonic: "STOP",
    length: 1,
    ops: &[MicroOp::Stop],
};

static JR: Instruction = Instruction {
    mnemonic: "JR i8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::RelJump],
};

static JR_CC: Instruction = Instruction {
    mnemonic: "JR cc, i8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::JrCond],
};

static LD_RP_NN: Instruction = Instruction {
    mnemonic: "LD rp, u16",
    length: 3,
    ops: &[MicroOp::Nop, MicroOp::ReadImmRpLo, MicroOp::ReadImmRpHi],
};

static ADD_HL_RP: Instruction = Instruction {
    mnemonic: "ADD HL, rp",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::AddHlRp],
};

static LD_MRP_A: Instruction = Instruction {
    mnemonic: "LD [rp], A",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::WriteRpMemA],
};

static LD_A_MRP: Instruction = Instruction {
    mnemonic: "LD A, [rp]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::ReadRpMemA],
};

static INC_RP: Instruction = Instruction {
    mnemonic: "INC rp",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::IncRp],
};

static DEC_RP: Instruction = Instruction {
    mnemonic: "DEC rp",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::DecRp],
};

static INC_R: Instruction = Instruction {
    mnemonic: "INC r",
    length: 1,
    ops: &[MicroOp::IncR],
};

static DEC_R: Instruction = Instruction {
    mnemonic: "DEC r",
    length: 1,
    ops: &[MicroOp::DecR],
};

static INC_MHL: Instruction = Instruction {
    mnemonic: "INC [HL]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::ReadHlTmp, MicroOp::WriteHlIncTmp],
};

static DEC_MHL: Instruction = Instruction {
    mnemonic: "DEC [HL]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::ReadHlTmp, MicroOp::WriteHlDecTmp],
};

static LD_R_N: Instruction = Instruction {
    mnemonic: "LD r, u8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmR],
};

static LD_MHL_N: Instruction = Instruction {
    mnemonic: "LD [HL], u8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::WriteHlTmp],
};

static ROTATE_A: Instruction = Instruction {
    mnemonic: "rot A",
    length: 1,
    ops: &[MicroOp::RotateA],
};

static DAA: Instruction = Instruction {
    mnemonic: "DAA",
    length: 1,
    ops: &[MicroOp::Daa],
};

static CPL: Instruction = Instruction {
    mnemonic: "CPL",
    length: 1,
    ops: &[MicroOp::Cpl],
};

static SCF: Instruction = Instruction {
    mnemonic: "SCF",
    length: 1,
    ops: &[MicroOp::Scf],
};

static CCF: Instruction = Instruction {
    mnemonic: "CCF",
    length: 1,
    ops: &[MicroOp::Ccf],
};

static HALT: Instruction = Instruction {
    mnemonic: "HALT",
    length: 1,
    ops: &[MicroOp::Halt],
};

static LD_MHL_R: Instruction = Instruction {
    mnemonic: "LD [HL], r",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::WriteHlR],
};

static LD_R_MHL: Instruction = Instruction {
    mnemonic: "LD r, [HL]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::ReadHlR],
};

static LD_R_R: Instruction = Instruction {
    mnemonic: "LD r, r",
    length: 1,
    ops: &[MicroOp::LdRR],
};

static ALU_R: Instruction = Instruction {
    mnemonic: "alu A, r",
    length: 1,
    ops: &[MicroOp::AluR],
};

static ALU_MHL: Instruction = Instruction {
    mnemonic: "alu A, [HL]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::AluHl],
};

static ALU_N: Instruction = Instruction {
    mnemonic: "alu A, u8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::AluImm],
};

static RET_CC: Instruction = Instruction {
    mnemonic: "RET cc",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::RetCond],
};

static LDH_MN_A: Instruction = Instruction {
    mnemonic: "LDH [u8], A",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::WriteFFTmpA],
};

static ADD_SP_D: Instruction = Instruction {
    mnemonic: "ADD SP, i8",
    length: 2,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::Nop,
        MicroOp::AddSpTmp,
    ],
};

static LDH_A_MN: Instruction = Instruction {
    mnemonic: "LDH A, [u8]",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::ReadFFTmpA],
};

static LD_HL_SP_D: Instruction = Instruction {
    mnemonic: "LD HL, SP+i8",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::LdHlSpTmp],
};

static POP_RP2: Instruction = Instruction {
    mnemonic: "POP rp2",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::PopRp2Lo, MicroOp::PopRp2Hi],
};

static RET: Instruction = Instruction {
    mnemonic: "RET",
    length: 1,
    ops: &[
        MicroOp::Nop,
        MicroOp::PopTmpLo,
        MicroOp::PopTmpHi,
        MicroOp::JumpTmp,
    ],
};

static RETI: Instruction = Instruction {
    mnemonic: "RETI",
    length: 1,
    ops: &[
        MicroOp::Nop,
        MicroOp::PopTmpLo,
        MicroOp::PopTmpHi,
        MicroOp::JumpTmpEi,
    ],
};

static JP_HL: Instruction = Instruction {
    mnemonic: "JP HL",
    length: 1,
    ops: &[MicroOp::JpHl],
};

static LD_SP_HL: Instruction = Instruction {
    mnemonic: "LD SP, HL",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::LdSpHl],
};

static JP_CC_NN: Instruction = Instruction {
    mnemonic: "JP cc, u16",
    length: 3,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::JpCond],
};

static LDH_MC_A: Instruction = Instruction {
    mnemonic: "LDH [C], A",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::WriteFFCA],
};

static LD_MNN_A: Instruction = Instruction {
    mnemonic: "LD [u16], A",
    length: 3,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::ReadImmTmpHi,
        MicroOp::WriteTmpA,
    ],
};

static LDH_A_MC: Instruction = Instruction {
    mnemonic: "LDH A, [C]",
    length: 1,
    ops: &[MicroOp::Nop, MicroOp::ReadFFCA],
};

static LD_A_MNN: Instruction = Instruction {
    mnemonic: "LD A, [u16]",
    length: 3,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::ReadImmTmpHi,
        MicroOp::ReadTmpA,
    ],
};

static JP_NN: Instruction = Instruction {
    mnemonic: "JP u16",
    length: 3,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::ReadImmTmpHi,
        MicroOp::JumpTmp,
    ],
};

static DI: Instruction = Instruction {
    mnemonic: "DI",
    length: 1,
    ops: &[MicroOp::Di],
};

static EI: Instruction = Instruction {
    mnemonic: "EI",
    length: 1,
    ops: &[MicroOp::Ei],
};

static CALL_CC_NN: Instruction = Instruction {
    mnemonic: "CALL cc, u16",
    length: 3,
    ops: &[MicroOp::Nop, MicroOp::ReadImmTmpLo, MicroOp::CallCond],
};

static PUSH_RP2: Instruction = Instruction {
    mnemonic: "PUSH rp2",
    length: 1,
    ops: &[
        MicroOp::Nop,
        MicroOp::Nop,
        MicroOp::PushRp2Hi,
        MicroOp::PushRp2Lo,
    ],
};

static CALL_NN: Instruction = Instruction {
    mnemonic: "CALL u16",
    length: 3,
    ops: &[
        MicroOp::Nop,
        MicroOp::ReadImmTmpLo,
        MicroOp::ReadImmTmpHi,
        MicroOp::Nop,
        MicroOp::PushPcHi,
        MicroOp::PushPcLoJumpTmp,
    ],
};

static RST: Instruction = Instruction {
    mnemonic: "RST",
    length: 1,
    ops: &[
        MicroOp::Nop,
        MicroOp::Nop,
        MicroOp::PushPcHi,
        MicroOp::PushPcLoJumpRst,
    ],
};

static CB_ROT_R: Instruction = Instruction {
    mnemonic: "rot r",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::RotR],
};

static CB_ROT_MHL: Instruction = Instruction {
    mnemonic: "rot [HL]",
    length: 2,
    ops: &[
        MicroOp::Nop,
        MicroOp::Nop,
        MicroOp::ReadHlTmp,
        MicroOp::CbWriteHlTmp,
    ],
};

static CB_BIT_R: Instruction = Instruction {
    mnemonic: "BIT b, r",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::BitR],
};

static CB_BIT_MHL: Instruction = Instruction {
    mnemonic: "BIT b, [HL]",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::Nop, MicroOp::BitHl],
};

static CB_RES_R: Instruction = Instruction {
    mnemonic: "RES b, r",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::ResR],
};

static CB_RES_MHL: Instruction = Instruction {
    mnemonic: "RES b, [HL]",
    length: 2,
    ops: &[
        MicroOp::Nop,
        MicroOp::Nop,
        MicroOp::ReadHlTmp,
        MicroOp::CbWriteHlTmp,
    ],
};

static CB_SET_R: Instruction = Instruction {
    mnemonic: "SET b, r",
    length: 2,
    ops: &[MicroOp::Nop, MicroOp::SetR],
};

static CB_SET_MHL: Instruction = Instruction {
    mnemonic: "SET b, [HL]",
    length: 2,
    ops: &[
        MicroOp::Nop,
        MicroOp::Nop,
        MicroOp::ReadHlTmp,
        MicroOp::CbWriteHlTmp,
    ],
};

/// Resolves the decomposed opcode into its instruction descriptor,
/// matching only the fields each family depends on. Returns `None`
/// for the unassigned encodings of the LR35902 map.
pub fn decode(opcode: &Opcode) -> Option<&'static Instruction> {
    if opcode.prefixed {
        return Some(decode_prefixed(opcode));
    }
    Some(match (opcode.x, opcode.z) {
        (0, 0) => match opcode.y {
            0 => &NOP,
            1 => &LD_MNN_SP,
            2 => &STOP,
            3 => &JR,
            _ => &JR_CC,
        },
        (0, 1) => {
            if opcode.q == 0 {
                &LD_RP_NN
            } else {
                &ADD_HL_RP
            }
        }
        (0, 2) => {
            if opcode.q == 0 {
                &LD_MRP_A
            } else {
                &LD_A_MRP
            }
        }
        (0, 3) => {
            if opcode.q == 0 {
                &INC_RP
            } else {
                &DEC_RP
            }
        }
        (0, 4) => {
            if opcode.y == 6 {
                &INC_MHL
            } else {
                &INC_R
            }
        }
        (0, 5) => {
            if opcode.y == 6 {
                &DEC_MHL
            } else {
                &DEC_R
            }
        }
        (0, 6) => {
            if opcode.y == 6 {
                &LD_MHL_N
            } else {
                &LD_R_N
            }
        }
        (0, 7) => match opcode.y {
            0..=3 => &ROTATE_A,
            4 => &DAA,
            5 => &CPL,
            6 => &SCF,
            _ => &CCF,
        },
        (1, _) => match (opcode.y, opcode.z) {
            (6, 6) => &HALT,
            (6, _) => &LD_MHL_R,
            (_, 6) => &LD_R_MHL,
            _ => &LD_R_R,
        },
        (2, _) => {
            if opcode.z == 6 {
                &ALU_MHL
            } else {
                &ALU_R
            }
        }
        (3, 0) => match opcode.y {
            0..=3 => &RET_CC,
            4 => &LDH_MN_A,
            5 => &ADD_SP_D,
            6 => &LDH_A_MN,
            _ => &LD_HL_SP_D,
        },
        (3, 1) => {
            if opcode.q == 0 {
                &POP_RP2
            } else {
                match opcode.p {
                    0 => &RET,
                    1 => &RETI,
                    2 => &JP_HL,
                    _ => &LD_SP_HL,
                }
            }
        }
        (3, 2) => match opcode.y {
            0..=3 => &JP_CC_NN,
            4 => &LDH_MC_A,
            5 => &LD_MNN_A,
            6 => &LDH_A_MC,
            _ => &LD_A_MNN,
        },
        (3, 3) => match opcode.y {
            0 => &JP_NN,
            6 => &DI,
            7 => &EI,
            // y == 1 is the CB escape, consumed at fetch time; the
            // remaining encodings are unassigned
            _ => return None,
        },
        (3, 4) => {
            if opcode.y <= 3 {
                &CALL_CC_NN
            } else {
                return None;
            }
        }
        (3, 5) => {
            if opcode.q == 0 {
                &PUSH_RP2
            } else if opcode.p == 0 {
                &CALL_NN
            } else {
                return None;
            }
        }
        (3, 6) => &ALU_N,
        (3, 7) => &RST,
        _ => return None,
    })
}

fn decode_prefixed(opcode: &Opcode) -> &'static Instruction {
    match (opcode.x, opcode.z) {
        (0, 6) => &CB_ROT_MHL,
        (0, _) => &CB_ROT_R,
        (1, 6) => &CB_BIT_MHL,
        (1, _) => &CB_BIT_R,
        (2, 6) => &CB_RES_MHL,
        (2, _) => &CB_RES_R,
        (3, 6) => &CB_SET_MHL,
        _ => &CB_SET_R,
    }
}

impl MicroOp {
    /// Executes the micro-operation against the provided CPU, taking
    /// exactly one machine cycle worth of work.
    pub fn execute(self, cpu: &mut Cpu) {
        match self {
            MicroOp::Nop => (),
            MicroOp::Halt => halt(cpu),
            MicroOp::Stop => cpu.set_stopped(true),
            MicroOp::Di => {
                cpu.disable_int();
                cpu.cancel_ime_countdown();
            }
            MicroOp::Ei => cpu.request_ime(),

            MicroOp::LdRR => {
                let byte = read_r(cpu, cpu.opcode.z);
                write_r(cpu, cpu.opcode.y, byte);
            }
            MicroOp::IncR => {
                let value = read_r(cpu, cpu.opcode.y);
                let result = inc_set_flags(cpu, value);
                write_r(cpu, cpu.opcode.y, result);
            }
            MicroOp::DecR => {
                let value = read_r(cpu, cpu.opcode.y);
                let result = dec_set_flags(cpu, value);
                write_r(cpu, cpu.opcode.y, result);
            }
            MicroOp::AluR => {
                let byte = read_r(cpu, cpu.opcode.z);
                alu(cpu, byte);
            }
            MicroOp::AluHl => {
                let byte = cpu.mmu.read(cpu.hl());
                alu(cpu, byte);
            }
            MicroOp::AluImm => {
                let byte = cpu.read_u8();
                alu(cpu, byte);
            }
            MicroOp::RotateA => {
                let result = match cpu.opcode.y {
                    0 => rlc(cpu, cpu.a),
                    1 => rrc(cpu, cpu.a),
                    2 => rl(cpu, cpu.a),
                    _ => rr(cpu, cpu.a),
                };
                cpu.a = result;
                // the plain A rotate variants always clear zero
                cpu.set_zero(false);
            }
            MicroOp::Daa => daa(cpu),
            MicroOp::Cpl => {
                cpu.a = !cpu.a;
                cpu.set_sub(true);
                cpu.set_half_carry(true);
            }
            MicroOp::Scf => {
                cpu.set_carry(true);
                cpu.set_sub(false);
                cpu.set_half_carry(false);
            }
            MicroOp::Ccf => {
                let carry = cpu.carry();
                cpu.set_carry(!carry);
                cpu.set_sub(false);
                cpu.set_half_carry(false);
            }

            MicroOp::AddHlRp => {
                let value = read_rp(cpu, cpu.opcode.p);
                let result = add_u16_u16(cpu, cpu.hl(), value);
                cpu.set_hl(result);
            }
            MicroOp::IncRp => {
                let value = read_rp(cpu, cpu.opcode.p).wrapping_add(1);
                write_rp(cpu, cpu.opcode.p, value);
            }
            MicroOp::DecRp => {
                let value = read_rp(cpu, cpu.opcode.p).wrapping_sub(1);
                write_rp(cpu, cpu.opcode.p, value);
            }
            MicroOp::JpHl => cpu.pc = cpu.hl(),
            MicroOp::LdSpHl => cpu.sp = cpu.hl(),
            MicroOp::AddSpTmp => {
                cpu.sp = add_sp_i8(cpu, cpu.sp);
            }
            MicroOp::LdHlSpTmp => {
                let result = add_sp_i8(cpu, cpu.sp);
                cpu.set_hl(result);
            }

            MicroOp::ReadImmTmpLo => cpu.tmp_lo = cpu.read_u8(),
            MicroOp::ReadImmTmpHi => cpu.tmp_hi = cpu.read_u8(),
            MicroOp::ReadImmR => {
                let byte = cpu.read_u8();
                write_r(cpu, cpu.opcode.y, byte);
            }
            MicroOp::ReadImmRpLo => {
                let byte = cpu.read_u8();
                write_rp_lo(cpu, cpu.opcode.p, byte);
            }
            MicroOp::ReadImmRpHi => {
                let byte = cpu.read_u8();
                write_rp_hi(cpu, cpu.opcode.p, byte);
            }
            MicroOp::ReadHlR => {
                let byte = cpu.mmu.read(cpu.hl());
                write_r(cpu, cpu.opcode.y, byte);
            }
            MicroOp::WriteHlR => {
                let byte = read_r(cpu, cpu.opcode.z);
                cpu.mmu.write(cpu.hl(), byte);
            }
            MicroOp::ReadHlTmp => cpu.tmp_lo = cpu.mmu.read(cpu.hl()),
            MicroOp::WriteHlTmp => cpu.mmu.write(cpu.hl(), cpu.tmp_lo),
            MicroOp::WriteHlIncTmp => {
                let result = inc_set_flags(cpu, cpu.tmp_lo);
                cpu.mmu.write(cpu.hl(), result);
            }
            MicroOp::WriteHlDecTmp => {
                let result = dec_set_flags(cpu, cpu.tmp_lo);
                cpu.mmu.write(cpu.hl(), result);
            }
            MicroOp::ReadRpMemA => {
                let addr = read_rp_mem(cpu, cpu.opcode.p);
                cpu.a = cpu.mmu.read(addr);
            }
            MicroOp::WriteRpMemA => {
                let addr = read_rp_mem(cpu, cpu.opcode.p);
                cpu.mmu.write(addr, cpu.a);
            }
            MicroOp::ReadFFTmpA => {
                cpu.a = cpu.mmu.read(0xff00 | cpu.tmp_lo as u16);
            }
            MicroOp::WriteFFTmpA => {
                cpu.mmu.write(0xff00 | cpu.tmp_lo as u16, cpu.a);
            }
            MicroOp::ReadFFCA => {
                cpu.a = cpu.mmu.read(0xff00 | cpu.c as u16);
            }
            MicroOp::WriteFFCA => {
                cpu.mmu.write(0xff00 | cpu.c as u16, cpu.a);
            }
            MicroOp::ReadTmpA => cpu.a = cpu.mmu.read(cpu.tmp16()),
            MicroOp::WriteTmpA => cpu.mmu.write(cpu.tmp16(), cpu.a),
            MicroOp::WriteTmpSpLo => {
                cpu.mmu.write(cpu.tmp16(), cpu.sp as u8);
            }
            MicroOp::WriteTmpSpHi => {
                cpu.mmu.write(cpu.tmp16().wrapping_add(1), (cpu.sp >> 8) as u8);
            }

            MicroOp::JrCond => {
                cpu.tmp_lo = cpu.read_u8();
                if condition(cpu, cpu.opcode.y - 4) {
                    cpu.queue.push_back(MicroOp::RelJump);
                }
            }
            MicroOp::RelJump => {
                cpu.pc = (cpu.pc as i16).wrapping_add(cpu.tmp_lo as i8 as i16) as u16;
            }
            MicroOp::JpCond => {
                cpu.tmp_hi = cpu.read_u8();
                if condition(cpu, cpu.opcode.y) {
                    cpu.queue.push_back(MicroOp::JumpTmp);
                }
            }
            MicroOp::JumpTmp => cpu.pc = cpu.tmp16(),
            MicroOp::JumpTmpEi => {
                cpu.pc = cpu.tmp16();
                cpu.enable_int();
            }
            MicroOp::CallCond => {
                cpu.tmp_hi = cpu.read_u8();
                if condition(cpu, cpu.opcode.y) {
                    cpu.queue.push_back(MicroOp::Nop);
                    cpu.queue.push_back(MicroOp::PushPcHi);
                    cpu.queue.push_back(MicroOp::PushPcLoJumpTmp);
                }
            }
            MicroOp::RetCond => {
                if condition(cpu, cpu.opcode.y) {
                    cpu.queue.push_back(MicroOp::PopTmpLo);
                    cpu.queue.push_back(MicroOp::PopTmpHi);
                    cpu.queue.push_back(MicroOp::JumpTmp);
                }
            }
            MicroOp::PopTmpLo => cpu.tmp_lo = cpu.pop_byte(),
            MicroOp::PopTmpHi => cpu.tmp_hi = cpu.pop_byte(),
            MicroOp::PushPcHi => cpu.push_byte((cpu.pc >> 8) as u8),
            MicroOp::PushPcLo => cpu.push_byte(cpu.pc as u8),
            MicroOp::PushPcLoJumpTmp => {
                cpu.push_byte(cpu.pc as u8);
                cpu.pc = cpu.tmp16();
            }
            MicroOp::PushPcLoJumpRst => {
                cpu.push_byte(cpu.pc as u8);
                cpu.pc = (cpu.opcode.y as u16) * 8;
            }
            MicroOp::JumpIntVector => cpu.pc = cpu.int_vector,
            MicroOp::PopRp2Lo => {
                let byte = cpu.pop_byte();
                write_rp2_lo(cpu, cpu.opcode.p, byte);
            }
            MicroOp::PopRp2Hi => {
                let byte = cpu.pop_byte();
                write_rp2_hi(cpu, cpu.opcode.p, byte);
            }
            MicroOp::PushRp2Hi => {
                let byte = read_rp2_hi(cpu, cpu.opcode.p);
                cpu.push_byte(byte);
            }
            MicroOp::PushRp2Lo => {
                let byte = read_rp2_lo(cpu, cpu.opcode.p);
                cpu.push_byte(byte);
            }

            MicroOp::RotR => {
                let value = read_r(cpu, cpu.opcode.z);
                let result = rotate(cpu, cpu.opcode.y, value);
                write_r(cpu, cpu.opcode.z, result);
            }
            MicroOp::BitR => {
                let value = read_r(cpu, cpu.opcode.z);
                bit_test(cpu, cpu.opcode.y, value);
            }
            MicroOp::BitHl => {
                let value = cpu.mmu.read(cpu.hl());
                bit_test(cpu, cpu.opcode.y, value);
            }
            MicroOp::SetR => {
                let value = read_r(cpu, cpu.opcode.z);
                write_r(cpu, cpu.opcode.z, set(value, cpu.opcode.y));
            }
            MicroOp::ResR => {
                let value = read_r(cpu, cpu.opcode.z);
                write_r(cpu, cpu.opcode.z, res(value, cpu.opcode.y));
            }
            MicroOp::CbWriteHlTmp => {
                let result = match cpu.opcode.x {
                    0 => rotate(cpu, cpu.opcode.y, cpu.tmp_lo),
                    2 => res(cpu.tmp_lo, cpu.opcode.y),
                    _ => set(cpu.tmp_lo, cpu.opcode.y),
                };
                cpu.mmu.write(cpu.hl(), result);
            }
        }
    }
}

/// Executes the HALT semantics: with IME cleared and an enabled
/// interrupt already pending the CPU does not halt, and the next
/// opcode byte is fetched without advancing PC (the HALT bug).
fn halt(cpu: &mut Cpu) {
    let pending = cpu.pending_interrupts();
    if !cpu.ime() && pending != 0 {
        cpu.set_halt_bug(true);
    } else {
        cpu.set_halted(true);
    }
}

/// Reads the `r` table register with the provided index, index 6
/// ((HL) memory) is never routed here by the decoder.
fn read_r(cpu: &mut Cpu, index: u8) -> u8 {
    match index {
        0 => cpu.b,
        1 => cpu.c,
        2 => cpu.d,
        3 => cpu.e,
        4 => cpu.h,
        5 => cpu.l,
        7 => cpu.a,
        index => {
            debug_assert!(false, "Invalid register index {}", index);
            0xff
        }
    }
}

fn write_r(cpu: &mut Cpu, index: u8, value: u8) {
    match index {
        0 => cpu.b = value,
        1 => cpu.c = value,
        2 => cpu.d = value,
        3 => cpu.e = value,
        4 => cpu.h = value,
        5 => cpu.l = value,
        7 => cpu.a = value,
        index => debug_assert!(false, "Invalid register index {}", index),
    }
}

fn read_rp(cpu: &Cpu, index: u8) -> u16 {
    match index {
        0 => cpu.bc(),
        1 => cpu.de(),
        2 => cpu.hl(),
        _ => cpu.sp,
    }
}

fn write_rp(cpu: &mut Cpu, index: u8, value: u16) {
    match index {
        0 => cpu.set_bc(value),
        1 => cpu.set_de(value),
        2 => cpu.set_hl(value),
        _ => cpu.sp = value,
    }
}

fn write_rp_lo(cpu: &mut Cpu, index: u8, value: u8) {
    match index {
        0 => cpu.c = value,
        1 => cpu.e = value,
        2 => cpu.l = value,
        _ => cpu.sp = (cpu.sp & 0xff00) | value as u16,
    }
}

fn write_rp_hi(cpu: &mut Cpu, index: u8, value: u8) {
    match index {
        0 => cpu.b = value,
        1 => cpu.d = value,
        2 => cpu.h = value,
        _ => cpu.sp = (cpu.sp & 0x00ff) | ((value as u16) << 8),
    }
}

fn read_rp2_hi(cpu: &Cpu, index: u8) -> u8 {
    match index {
        0 => cpu.b,
        1 => cpu.d,
        2 => cpu.h,
        _ => cpu.a,
    }
}

fn read_rp2_lo(cpu: &Cpu, index: u8) -> u8 {
    match index {
        0 => cpu.c,
        1 => cpu.e,
        2 => cpu.l,
        _ => cpu.f(),
    }
}

fn write_rp2_hi(cpu: &mut Cpu, index: u8, value: u8) {
    match index {
        0 => cpu.b = value,
        1 => cpu.d = value,
        2 => cpu.h = value,
        _ => cpu.a = value,
    }
}

fn write_rp2_lo(cpu: &mut Cpu, index: u8, value: u8) {
    match index {
        0 => cpu.c = value,
        1 => cpu.e = value,
        2 => cpu.l = value,
        // the low nibble of F is discarded structurally
        _ => cpu.set_f(value),
    }
}

/// Resolves the memory-indirect `rp` table of the `x=0, z=2` family:
/// BC, DE, HL with post-increment and HL with post-decrement.
fn read_rp_mem(cpu: &mut Cpu, index: u8) -> u16 {
    match index {
        0 => cpu.bc(),
        1 => cpu.de(),
        2 => {
            let hl = cpu.hl();
            cpu.set_hl(hl.wrapping_add(1));
            hl
        }
        _ => {
            let hl = cpu.hl();
            cpu.set_hl(hl.wrapping_sub(1));
            hl
        }
    }
}

/// Evaluates the `cc` condition table entry for the provided index.
fn condition(cpu: &Cpu, index: u8) -> bool {
    match index {
        0 => !cpu.zero(),
        1 => cpu.zero(),
        2 => !cpu.carry(),
        _ => cpu.carry(),
    }
}

/// Dispatches the accumulator ALU operation selected by the `y` field
/// of the current opcode.
fn alu(cpu: &mut Cpu, value: u8) {
    match cpu.opcode.y {
        0 => cpu.a = add_set_flags(cpu, cpu.a, value),
        1 => cpu.a = add_carry_set_flags(cpu, cpu.a, value),
        2 => cpu.a = sub_set_flags(cpu, cpu.a, value),
        3 => cpu.a = sub_carry_set_flags(cpu, cpu.a, value),
        4 => {
            cpu.a &= value;
            let zero = cpu.a == 0;
            cpu.set_zero(zero);
            cpu.set_sub(false);
            cpu.set_half_carry(true);
            cpu.set_carry(false);
        }
        5 => {
            cpu.a ^= value;
            let zero = cpu.a == 0;
            cpu.set_zero(zero);
            cpu.set_sub(false);
            cpu.set_half_carry(false);
            cpu.set_carry(false);
        }
        6 => {
            cpu.a |= value;
            let zero = cpu.a == 0;
            cpu.set_zero(zero);
            cpu.set_sub(false);
            cpu.set_half_carry(false);
            cpu.set_carry(false);
        }
        _ => {
            sub_set_flags(cpu, cpu.a, value);
        }
    }
}

/// Dispatches the CB rotate/shift family selected by the `y` field.
fn rotate(cpu: &mut Cpu, kind: u8, value: u8) -> u8 {
    match kind {
        0 => rlc(cpu, value),
        1 => rrc(cpu, value),
        2 => rl(cpu, value),
        3 => rr(cpu, value),
        4 => sla(cpu, value),
        5 => sra(cpu, value),
        6 => swap(cpu, value),
        _ => srl(cpu, value),
    }
}

fn bit_test(cpu: &mut Cpu, bit: u8, value: u8) {
    cpu.set_zero(value & (1 << bit) == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(true);
}

/// Helper function to set one bit in a u8.
fn set(value: u8, bit: u8) -> u8 {
    value | (1u8 << bit)
}

/// Helper function to clear one bit in a u8.
fn res(value: u8, bit: u8) -> u8 {
    value & !(1u8 << bit)
}

fn inc_set_flags(cpu: &mut Cpu, value: u8) -> u8 {
    let result = value.wrapping_add(1);
    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry((value & 0xf) == 0xf);
    result
}

fn dec_set_flags(cpu: &mut Cpu, value: u8) -> u8 {
    let result = value.wrapping_sub(1);
    cpu.set_zero(result == 0);
    cpu.set_sub(true);
    cpu.set_half_carry((value & 0xf) == 0x0);
    result
}

fn add_set_flags(cpu: &mut Cpu, first: u8, second: u8) -> u8 {
    let first = first as u32;
    let second = second as u32;

    let result = first.wrapping_add(second);
    let result_b = result as u8;

    cpu.set_zero(result_b == 0);
    cpu.set_sub(false);
    cpu.set_half_carry((first ^ second ^ result) & 0x10 == 0x10);
    cpu.set_carry(result & 0x100 == 0x100);

    result_b
}

fn add_carry_set_flags(cpu: &mut Cpu, first: u8, second: u8) -> u8 {
    let first = first as u32;
    let second = second as u32;
    let carry = cpu.carry() as u32;

    let result = first.wrapping_add(second).wrapping_add(carry);
    let result_b = result as u8;

    cpu.set_zero(result_b == 0);
    cpu.set_sub(false);
    cpu.set_half_carry((first ^ second ^ result) & 0x10 == 0x10);
    cpu.set_carry(result & 0x100 == 0x100);

    result_b
}

fn sub_set_flags(cpu: &mut Cpu, first: u8, second: u8) -> u8 {
    let first = first as u32;
    let second = second as u32;

    let result = first.wrapping_sub(second);
    let result_b = result as u8;

    cpu.set_zero(result_b == 0);
    cpu.set_sub(true);
    cpu.set_half_carry((first ^ second ^ result) & 0x10 == 0x10);
    cpu.set_carry(result & 0x100 == 0x100);

    result_b
}

fn sub_carry_set_flags(cpu: &mut Cpu, first: u8, second: u8) -> u8 {
    let first = first as u32;
    let second = second as u32;
    let carry = cpu.carry() as u32;

    let result = first.wrapping_sub(second).wrapping_sub(carry);
    let result_b = result as u8;

    cpu.set_zero(result_b == 0);
    cpu.set_sub(true);
    cpu.set_half_carry((first ^ second ^ result) & 0x10 == 0x10);
    cpu.set_carry(result & 0x100 == 0x100);

    result_b
}

fn add_u16_u16(cpu: &mut Cpu, first: u16, second: u16) -> u16 {
    let first = first as u32;
    let second = second as u32;
    let result = first.wrapping_add(second);

    cpu.set_sub(false);
    cpu.set_half_carry((first ^ second ^ result) & 0x1000 == 0x1000);
    cpu.set_carry(result & 0x10000 == 0x10000);

    result as u16
}

/// Signed 8-bit addition over SP used by both `ADD SP, i8` and
/// `LD HL, SP+i8`: flags come from the unsigned low byte addition.
fn add_sp_i8(cpu: &mut Cpu, sp: u16) -> u16 {
    let offset = cpu.tmp_lo;

    cpu.set_zero(false);
    cpu.set_sub(false);
    cpu.set_half_carry((sp & 0x0f) + (offset as u16 & 0x0f) > 0x0f);
    cpu.set_carry((sp & 0xff) + offset as u16 > 0xff);

    (sp as i32).wrapping_add(offset as i8 as i32) as u16
}

/// Helper function that rotates (shifts) left the given byte through
/// the carry flag and updates the proper flag registers.
fn rl(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = cpu.carry();

    cpu.set_carry(value & 0x80 == 0x80);

    let result = (value << 1) | carry as u8;

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);

    result
}

fn rlc(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.set_carry(value & 0x80 == 0x80);

    let result = (value << 1) | (value >> 7);

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);

    result
}

/// Helper function that rotates (shifts) right the given byte through
/// the carry flag and updates the proper flag registers.
fn rr(cpu: &mut Cpu, value: u8) -> u8 {
    let carry = cpu.carry();

    cpu.set_carry(value & 0x01 == 0x01);

    let result = (value >> 1) | ((carry as u8) << 7);

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);

    result
}

fn rrc(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.set_carry(value & 0x01 == 0x01);

    let result = (value >> 1) | (value << 7);

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);

    result
}

fn sla(cpu: &mut Cpu, value: u8) -> u8 {
    let result = value << 1;

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);
    cpu.set_carry(value & 0x80 == 0x80);

    result
}

fn sra(cpu: &mut Cpu, value: u8) -> u8 {
    let result = (value >> 1) | (value & 0x80);

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);
    cpu.set_carry(value & 0x01 == 0x01);

    result
}

fn srl(cpu: &mut Cpu, value: u8) -> u8 {
    let result = value >> 1;

    cpu.set_zero(result == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);
    cpu.set_carry(value & 0x01 == 0x01);

    result
}

fn swap(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.set_zero(value == 0);
    cpu.set_sub(false);
    cpu.set_half_carry(false);
    cpu.set_carry(false);

    (value << 4) | (value >> 4)
}

/// Post-adjusts the accumulator for BCD arithmetic, based on the
/// negative, half-carry and carry flags of the preceding operation.
fn daa(cpu: &mut Cpu) {
    let a = cpu.a;
    let mut adjust = 0;

    if cpu.half_carry() {
        adjust |= 0x06;
    }

    if cpu.carry() {
        adjust |= 0x60;
    }

    let result = if cpu.sub() {
        a.wrapping_sub(adjust)
    } else {
        if a & 0x0f > 0x09 {
            adjust |= 0x06;
        }

        if a > 0x99 {
            adjust |= 0x60;
        }

        a.wrapping_add(adjust)
    };

    cpu.a = result;

    cpu.set_zero(result == 0);
    cpu.set_half_carry(false);
    cpu.set_carry(adjust & 0x60 == 0x60);
}

#[cfg(test)]
mod tests {
    use super::{decode, Opcode};
    use crate::cpu::Cpu;

    fn cpu() -> Cpu {
        Cpu::default()
    }

    fn run_op(cpu: &mut Cpu, opcode: u8, prefixed: bool) {
        cpu.opcode = Opcode::decompose(opcode, prefixed);
        let inst = decode(&cpu.opcode).unwrap();
        for op in inst.ops {
            op.execute(cpu);
        }
    }

    #[test]
    fn test_decompose() {
        // 0x28 — JR Z, i8: x=0, y=5, z=0
        let opcode = Opcode::decompose(0x28, false);
        assert_eq!(opcode.x, 0);
        assert_eq!(opcode.y, 5);
        assert_eq!(opcode.z, 0);
        assert_eq!(opcode.p, 2);
        assert_eq!(opcode.q, 1);
    }

    #[test]
    fn test_decode_families() {
        assert_eq!(decode(&Opcode::decompose(0x00, false)).unwrap().mnemonic, "NOP");
        assert_eq!(decode(&Opcode::decompose(0x76, false)).unwrap().mnemonic, "HALT");
        assert_eq!(
            decode(&Opcode::decompose(0x41, false)).unwrap().mnemonic,
            "LD r, r"
        );
        assert_eq!(
            decode(&Opcode::decompose(0x80, false)).unwrap().mnemonic,
            "alu A, r"
        );
        assert_eq!(
            decode(&Opcode::decompose(0xcd, false)).unwrap().mnemonic,
            "CALL u16"
        );
        assert_eq!(
            decode(&Opcode::decompose(0x40, true)).unwrap().mnemonic,
            "BIT b, r"
        );
    }

    #[test]
    fn test_illegal_opcodes() {
        for opcode in [0xd3u8, 0xdb, 0xdd, 0xe3, 0xe4, 0xeb, 0xec, 0xed, 0xf4, 0xfc, 0xfd] {
            assert!(decode(&Opcode::decompose(opcode, false)).is_none());
        }
    }

    #[test]
    fn test_cycle_counts() {
        assert_eq!(decode(&Opcode::decompose(0x00, false)).unwrap().ops.len(), 1);
        // LD r, u8
        assert_eq!(decode(&Opcode::decompose(0x06, false)).unwrap().ops.len(), 2);
        // LD rp, u16
        assert_eq!(decode(&Opcode::decompose(0x01, false)).unwrap().ops.len(), 3);
        // PUSH rp2
        assert_eq!(decode(&Opcode::decompose(0xc5, false)).unwrap().ops.len(), 4);
        // CALL u16
        assert_eq!(decode(&Opcode::decompose(0xcd, false)).unwrap().ops.len(), 6);
        // LD [u16], SP
        assert_eq!(decode(&Opcode::decompose(0x08, false)).unwrap().ops.len(), 5);
        // RLC r (prefixed)
        assert_eq!(decode(&Opcode::decompose(0x00, true)).unwrap().ops.len(), 2);
        // SET b, [HL] (prefixed)
        assert_eq!(decode(&Opcode::decompose(0xc6, true)).unwrap().ops.len(), 4);
    }

    #[test]
    fn test_add_flags() {
        let mut cpu = cpu();
        cpu.a = 0x3a;
        cpu.b = 0xc6;
        // ADD A, B
        run_op(&mut cpu, 0x80, false);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.zero());
        assert!(!cpu.sub());
        assert!(cpu.half_carry());
        assert!(cpu.carry());
    }

    #[test]
    fn test_sub_flags() {
        let mut cpu = cpu();
        cpu.a = 0x10;
        cpu.b = 0x20;
        // SUB A, B
        run_op(&mut cpu, 0x90, false);
        assert_eq!(cpu.a, 0xf0);
        assert!(!cpu.zero());
        assert!(cpu.sub());
        assert!(!cpu.half_carry());
        assert!(cpu.carry());
    }

    #[test]
    fn test_and_sets_half_carry() {
        let mut cpu = cpu();
        cpu.a = 0x0f;
        cpu.c = 0xf0;
        // AND A, C
        run_op(&mut cpu, 0xa1, false);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.zero());
        assert!(cpu.half_carry());
        assert!(!cpu.carry());
    }

    #[test]
    fn test_cp_preserves_a() {
        let mut cpu = cpu();
        cpu.a = 0x42;
        cpu.d = 0x42;
        // CP A, D
        run_op(&mut cpu, 0xba, false);
        assert_eq!(cpu.a, 0x42);
        assert!(cpu.zero());
        assert!(cpu.sub());
    }

    #[test]
    fn test_daa_after_add() {
        let mut cpu = cpu();
        // BCD 0x15 + 0x27 = 0x42
        cpu.a = 0x15;
        cpu.b = 0x27;
        run_op(&mut cpu, 0x80, false);
        run_op(&mut cpu, 0x27, false);
        assert_eq!(cpu.a, 0x42);
    }

    #[test]
    fn test_cpl_identity() {
        let mut cpu = cpu();
        cpu.a = 0x5a;
        run_op(&mut cpu, 0x2f, false);
        assert_eq!(cpu.a, 0xa5);
        assert!(cpu.sub());
        assert!(cpu.half_carry());
        run_op(&mut cpu, 0x2f, false);
        assert_eq!(cpu.a, 0x5a);
    }

    #[test]
    fn test_swap_identity() {
        let mut cpu = cpu();
        cpu.b = 0x12;
        // SWAP B (CB 0x30)
        run_op(&mut cpu, 0x30, true);
        assert_eq!(cpu.b, 0x21);
        run_op(&mut cpu, 0x30, true);
        assert_eq!(cpu.b, 0x12);
    }

    #[test]
    fn test_scf_ccf() {
        let mut cpu = cpu();
        run_op(&mut cpu, 0x37, false);
        assert!(cpu.carry());
        run_op(&mut cpu, 0x3f, false);
        assert!(!cpu.carry());
        run_op(&mut cpu, 0x3f, false);
        assert!(cpu.carry());
    }

    #[test]
    fn test_rotate_a_clears_zero() {
        let mut cpu = cpu();
        cpu.a = 0x80;
        // RLCA: bit 7 moves into carry and bit 0
        run_op(&mut cpu, 0x07, false);
        assert_eq!(cpu.a, 0x01);
        assert!(cpu.carry());
        assert!(!cpu.zero());
    }

    #[test]
    fn test_cb_bit() {
        let mut cpu = cpu();
        cpu.e = 0x08;
        // BIT 3, E (CB 0x5b)
        run_op(&mut cpu, 0x5b, true);
        assert!(!cpu.zero());
        // BIT 4, E (CB 0x63)
        run_op(&mut cpu, 0x63, true);
        assert!(cpu.zero());
    }

    #[test]
    fn test_cb_set_res() {
        let mut cpu = cpu();
        cpu.l = 0x00;
        // SET 7, L (CB 0xfd)
        run_op(&mut cpu, 0xfd, true);
        assert_eq!(cpu.l, 0x80);
        // RES 7, L (CB 0xbd)
        run_op(&mut cpu, 0xbd, true);
        assert_eq!(cpu.l, 0x00);
    }
}
