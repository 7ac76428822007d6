use crate::bus::Bus;
use crate::cpu::{Instruction, Processor};
use crate::display::{DisplayAdapter, SharedDisplay};
use crate::layout::Layout;
use crate::noise::Noise;
use crate::ram::Ram;

/// Processor plus the bus it executes against.
#[derive(Debug)]
pub struct Machine {
    pub cpu: Processor,
    pub bus: Bus,
    layout: Layout,
}

impl Machine {
    /// Wire RAM, the display and the noise source into a fresh bus, in that order.
    pub fn new(layout: Layout, display: SharedDisplay, noise: Noise) -> Self {
        let mut bus = Bus::new();

        let (from, to) = layout.ram_range();
        bus.connect(Ram::new(layout.ram_size), from, to);
        let (from, to) = layout.video_range();
        bus.connect(DisplayAdapter::new(display), from, to);
        let (from, to) = layout.noise_range();
        bus.connect(noise, from, to);

        Self {
            cpu: Processor::new(),
            bus,
            layout,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Copy `program` into RAM at address 0. Returns the number of bytes that fit.
    pub fn load_program(&mut self, program: &[u8]) -> usize {
        self.bus
            .ram_mut()
            .map(|ram| ram.load(0, program))
            .unwrap_or(0)
    }

    pub fn step(&mut self) -> Option<Instruction> {
        self.cpu.clk(&mut self.bus)
    }

    /// Step until halted or `max_cycles` cycles have run in this call.
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        let mut ran = 0;
        while ran < max_cycles && self.step().is_some() {
            ran += 1;
        }
        ran
    }
}
