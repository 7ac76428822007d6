use std::cell::RefCell;
use std::rc::Rc;

use crate::device::{Device, Word, WORD_SIZE};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level)
    }
}

/// The physical LED chain. `flush` pushes the whole frame out in one hardware write.
pub trait LedSink {
    fn flush(&mut self, frame: &[Rgb]);
}

/// LED frame buffer plus the sink it is flushed to.
///
/// Mutating pixels does not touch the hardware; callers decide when to [`Display::flush`].
pub struct Display {
    frame: Vec<Rgb>,
    sink: Box<dyn LedSink>,
}

/// The display is shared between the bus adapter and the command router.
pub type SharedDisplay = Rc<RefCell<Display>>;

impl Display {
    pub fn new(led_count: usize, sink: impl LedSink + 'static) -> Self {
        Self {
            frame: vec![Rgb::OFF; led_count],
            sink: Box::new(sink),
        }
    }

    pub fn shared(led_count: usize, sink: impl LedSink + 'static) -> SharedDisplay {
        Rc::new(RefCell::new(Self::new(led_count, sink)))
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.frame.get(index).copied()
    }

    /// Returns `false` (and changes nothing) when `index` is past the end of the chain.
    pub fn set(&mut self, index: usize, color: Rgb) -> bool {
        match self.frame.get_mut(index) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    pub fn fill(&mut self, color: Rgb) {
        self.frame.fill(color);
    }

    pub fn frame(&self) -> &[Rgb] {
        &self.frame
    }

    pub fn flush(&mut self) {
        self.sink.flush(&self.frame);
    }
}

impl std::fmt::Debug for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Display")
            .field("leds", &self.frame.len())
            .finish_non_exhaustive()
    }
}

/// Bus view of a [`Display`].
///
/// Word 0 is reserved; word `1 + i` maps LED `i` as `[_, r, g, b]`. A write updates one LED and
/// flushes the whole frame immediately. Offsets inside a word are rounded down to the word.
#[derive(Debug, Clone)]
pub struct DisplayAdapter {
    display: SharedDisplay,
}

impl DisplayAdapter {
    pub fn new(display: SharedDisplay) -> Self {
        Self { display }
    }

    /// Size in bytes of the address window for `led_count` LEDs, if it fits in 32 bits.
    pub fn span(led_count: usize) -> Option<u32> {
        let bytes = led_count.checked_add(1)?.checked_mul(WORD_SIZE)?;
        u32::try_from(bytes).ok()
    }

    fn led_index(offset: u32) -> Option<usize> {
        match (offset as usize) / WORD_SIZE {
            0 => None,
            word => Some(word - 1),
        }
    }
}

impl Device for DisplayAdapter {
    fn read(&mut self, offset: u32) -> Word {
        match Self::led_index(offset).and_then(|i| self.display.borrow().get(i)) {
            Some(Rgb { r, g, b }) => [0, r, g, b],
            None => [0; WORD_SIZE],
        }
    }

    fn write(&mut self, offset: u32, data: Word) {
        let Some(index) = Self::led_index(offset) else {
            return;
        };
        let mut display = self.display.borrow_mut();
        if display.set(index, Rgb::new(data[1], data[2], data[3])) {
            display.flush();
        }
    }
}
