//! Host stand-ins for the board peripherals.
//!
//! On the device the LED chain is a NeoPixel strip and the button is an input pin with a pull-up.
//! Off the device the frame is rendered into the log and the button is a value that tests (or a
//! future GPIO backend) can drive.

use std::cell::Cell;
use std::rc::Rc;

use skc_vm::{LedSink, Rgb};

/// A digital input. `true` is the electrical high level, which is "released" for a pulled-up
/// button.
pub trait Button {
    fn is_high(&self) -> bool;
}

/// Button whose level is set in software. Clones share the same level.
#[derive(Debug, Clone)]
pub struct VirtualButton {
    level: Rc<Cell<bool>>,
}

impl VirtualButton {
    pub fn released() -> Self {
        Self {
            level: Rc::new(Cell::new(true)),
        }
    }

    pub fn press(&self) {
        self.level.set(false);
    }

    pub fn release(&self) {
        self.level.set(true);
    }
}

impl Default for VirtualButton {
    fn default() -> Self {
        Self::released()
    }
}

impl Button for VirtualButton {
    fn is_high(&self) -> bool {
        self.level.get()
    }
}

/// Writes every flushed frame to the log.
///
/// `debug` carries a one-line summary; `trace` renders the frame as rows of `width` cells.
#[derive(Debug, Clone)]
pub struct LogLedSink {
    width: usize,
    flushes: u64,
}

impl LogLedSink {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            flushes: 0,
        }
    }
}

impl Default for LogLedSink {
    fn default() -> Self {
        Self::new(8)
    }
}

impl LedSink for LogLedSink {
    fn flush(&mut self, frame: &[Rgb]) {
        self.flushes += 1;
        let lit = frame.iter().filter(|led| **led != Rgb::OFF).count();
        tracing::debug!(target: "skc::leds", flush = self.flushes, lit, leds = frame.len(), "frame");
        if tracing::enabled!(target: "skc::leds", tracing::Level::TRACE) {
            for (row, cells) in frame.chunks(self.width).enumerate() {
                tracing::trace!(target: "skc::leds", row, "{}", render_row(cells));
            }
        }
    }
}

fn render_row(cells: &[Rgb]) -> String {
    cells
        .iter()
        .map(|led| if *led == Rgb::OFF { '.' } else { '#' })
        .collect()
}
