//! Stack-based processor.
//!
//! Instructions are variable length (1–5 bytes) and share the bus address space with data.
//! The processor never faults: unknown opcodes are skipped one byte at a time, and stack misuse
//! wraps around inside the fixed-capacity stack buffer instead of being detected.
//!
//! Integers on the stack, in registers and in immediates are signed 32-bit big-endian.

use std::fmt;

use crate::bus::Bus;
use crate::device::{Word, WORD_SIZE};

pub const REGISTER_COUNT: usize = 32;
pub const STACK_WORDS: usize = 256;
pub const STACK_BYTES: usize = STACK_WORDS * WORD_SIZE;

/// Registers shown in a [`Snapshot`].
pub const SNAPSHOT_REGISTERS: usize = 6;

const REGISTER_MASK: u8 = 0b1_1111;

pub mod opcode {
    pub const HALT: u8 = 0x00;
    pub const PUSH_REG: u8 = 0x01;
    pub const PUSH_INT: u8 = 0x02;
    pub const POP_REG: u8 = 0x03;
    pub const ADD: u8 = 0x04;
    pub const MUL: u8 = 0x05;
    pub const JUMP_IF_LESS: u8 = 0x06;
    pub const READ: u8 = 0x07;
    pub const WRITE: u8 = 0x08;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Halt,
    PushReg(u8),
    PushInt(i32),
    PopReg(u8),
    Add,
    Mul,
    /// Relative to the address of the jump instruction itself.
    JumpIfLess(i16),
    Read,
    Write,
    /// Any byte that is not a known opcode.
    Unknown(u8),
}

impl Instruction {
    /// Decode the instruction starting at `bytes[0]`. Missing trailing bytes read as zero.
    pub fn decode(bytes: &[u8]) -> Self {
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0);
        match at(0) {
            opcode::HALT => Instruction::Halt,
            opcode::PUSH_REG => Instruction::PushReg(at(1) & REGISTER_MASK),
            opcode::PUSH_INT => Instruction::PushInt(i32::from_be_bytes([at(1), at(2), at(3), at(4)])),
            opcode::POP_REG => Instruction::PopReg(at(1) & REGISTER_MASK),
            opcode::ADD => Instruction::Add,
            opcode::MUL => Instruction::Mul,
            opcode::JUMP_IF_LESS => Instruction::JumpIfLess(i16::from_be_bytes([at(1), at(2)])),
            opcode::READ => Instruction::Read,
            opcode::WRITE => Instruction::Write,
            other => Instruction::Unknown(other),
        }
    }

    /// Encoded length in bytes.
    pub fn width(&self) -> u32 {
        match self {
            Instruction::PushInt(_) => 5,
            Instruction::JumpIfLess(_) => 3,
            Instruction::PushReg(_) | Instruction::PopReg(_) => 2,
            _ => 1,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Instruction::Halt => out.push(opcode::HALT),
            Instruction::PushReg(r) => out.extend_from_slice(&[opcode::PUSH_REG, r]),
            Instruction::PushInt(v) => {
                out.push(opcode::PUSH_INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Instruction::PopReg(r) => out.extend_from_slice(&[opcode::POP_REG, r]),
            Instruction::Add => out.push(opcode::ADD),
            Instruction::Mul => out.push(opcode::MUL),
            Instruction::JumpIfLess(offset) => {
                out.push(opcode::JUMP_IF_LESS);
                out.extend_from_slice(&offset.to_be_bytes());
            }
            Instruction::Read => out.push(opcode::READ),
            Instruction::Write => out.push(opcode::WRITE),
            Instruction::Unknown(op) => out.push(op),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Halt => f.write_str("hlt"),
            Instruction::PushReg(r) => write!(f, "push i{r}"),
            Instruction::PushInt(v) => write!(f, "push {v}"),
            Instruction::PopReg(r) => write!(f, "pop i{r}"),
            Instruction::Add => f.write_str("add"),
            Instruction::Mul => f.write_str("mul"),
            Instruction::JumpIfLess(offset) => write!(f, "jl {offset:+}"),
            Instruction::Read => f.write_str("read"),
            Instruction::Write => f.write_str("write"),
            Instruction::Unknown(op) => write!(f, ".byte {op:#04x}"),
        }
    }
}

pub struct Processor {
    cycles: u64,
    ip: u32,
    sp: u32,
    halted: bool,
    debug: bool,
    registers: [Word; REGISTER_COUNT],
    stack: [u8; STACK_BYTES],
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    pub fn new() -> Self {
        Self {
            cycles: 0,
            ip: 0,
            sp: 0,
            halted: false,
            debug: false,
            registers: [[0; WORD_SIZE]; REGISTER_COUNT],
            stack: [0; STACK_BYTES],
        }
    }

    /// Back to power-on state. Memory on the bus is left alone.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn sp(&self) -> u32 {
        self.sp
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn register(&self, index: u8) -> i32 {
        i32::from_be_bytes(self.registers[usize::from(index & REGISTER_MASK)])
    }

    /// Ask the driving loop for one diagnostic snapshot.
    pub fn request_debug(&mut self) {
        self.debug = true;
    }

    /// Returns a snapshot if one was requested, clearing the request.
    pub fn take_debug(&mut self) -> Option<Snapshot> {
        std::mem::take(&mut self.debug).then(|| self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut registers = [0; SNAPSHOT_REGISTERS];
        for (i, slot) in registers.iter_mut().enumerate() {
            *slot = i32::from_be_bytes(self.registers[i]);
        }

        let depth = (self.sp as usize).min(STACK_BYTES) / WORD_SIZE;
        let stack = (0..depth)
            .rev()
            .map(|i| {
                let at = i * WORD_SIZE;
                i32::from_be_bytes([
                    self.stack[at],
                    self.stack[at + 1],
                    self.stack[at + 2],
                    self.stack[at + 3],
                ])
            })
            .collect();

        Snapshot {
            cycles: self.cycles,
            ip: self.ip,
            sp: self.sp,
            registers,
            stack,
        }
    }

    /// Run one fetch-decode-execute cycle. Does nothing once halted.
    pub fn clk(&mut self, bus: &mut Bus) -> Option<Instruction> {
        if self.halted {
            return None;
        }
        self.cycles += 1;

        let inst = self.fetch(bus);
        let mut next_ip = self.ip.wrapping_add(inst.width());

        match inst {
            Instruction::Halt => self.halted = true,
            Instruction::PushReg(r) => self.push(self.registers[usize::from(r)]),
            Instruction::PushInt(v) => self.push(v.to_be_bytes()),
            Instruction::PopReg(r) => self.registers[usize::from(r)] = self.pop(),
            Instruction::Add => self.binary_op(i32::wrapping_add),
            Instruction::Mul => self.binary_op(i32::wrapping_mul),
            Instruction::JumpIfLess(offset) => {
                let b = self.pop_int();
                let a = self.pop_int();
                if a < b {
                    next_ip = self.ip.wrapping_add_signed(i32::from(offset));
                }
            }
            Instruction::Read => {
                let addr = self.pop();
                let data = bus.read(u32::from_be_bytes(addr));
                self.push(data);
            }
            Instruction::Write => {
                let addr = self.pop();
                let data = self.pop();
                bus.write(u32::from_be_bytes(addr), data);
            }
            Instruction::Unknown(_) => {}
        }

        self.ip = next_ip;
        Some(inst)
    }

    fn fetch(&self, bus: &mut Bus) -> Instruction {
        let word = bus.read(self.ip);
        if word[0] == opcode::PUSH_INT {
            let imm = bus.read(self.ip.wrapping_add(1));
            return Instruction::decode(&[word[0], imm[0], imm[1], imm[2], imm[3]]);
        }
        Instruction::decode(&word)
    }

    fn binary_op(&mut self, op: impl FnOnce(i32, i32) -> i32) {
        let b = self.pop_int();
        let a = self.pop_int();
        self.push(op(a, b).to_be_bytes());
    }

    fn push(&mut self, word: Word) {
        let at = self.sp as usize % STACK_BYTES;
        self.stack[at..at + WORD_SIZE].copy_from_slice(&word);
        self.sp = self.sp.wrapping_add(WORD_SIZE as u32);
    }

    fn pop(&mut self) -> Word {
        self.sp = self.sp.wrapping_sub(WORD_SIZE as u32);
        let at = self.sp as usize % STACK_BYTES;
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(&self.stack[at..at + WORD_SIZE]);
        word
    }

    fn pop_int(&mut self) -> i32 {
        i32::from_be_bytes(self.pop())
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("cycles", &self.cycles)
            .field("ip", &self.ip)
            .field("sp", &self.sp)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of the processor for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub cycles: u64,
    pub ip: u32,
    pub sp: u32,
    pub registers: [i32; SNAPSHOT_REGISTERS],
    /// Top of stack first.
    pub stack: Vec<i32>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: IP={} SP={} REGs={:?} STK={:?}",
            self.cycles, self.ip, self.sp, self.registers, self.stack
        )
    }
}
