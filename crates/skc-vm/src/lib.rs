#![forbid(unsafe_code)]

//! Single Key Computer virtual machine.
//!
//! The machine is a tiny stack-based processor ([`cpu::Processor`]) that fetches code and data
//! through an address [`bus::Bus`]. Devices are attached to the bus as inclusive address ranges:
//!
//! - [`ram::Ram`]: flat byte store, holds the uploaded program at address 0
//! - [`display::DisplayAdapter`]: memory-mapped view of the LED frame
//! - [`noise::Noise`]: hardware random source
//!
//! Nothing in this crate performs I/O on its own; the LED flush and the random source are
//! collaborators injected by the firmware.

pub mod asm;
pub mod bus;
pub mod cpu;
pub mod device;
pub mod display;
pub mod layout;
pub mod machine;
pub mod noise;
pub mod ram;

pub use bus::Bus;
pub use cpu::{Instruction, Processor, Snapshot};
pub use device::{BusDevice, Device, Word, WORD_SIZE};
pub use display::{Display, DisplayAdapter, LedSink, Rgb, SharedDisplay};
pub use layout::Layout;
pub use machine::Machine;
pub use noise::Noise;
pub use ram::Ram;
