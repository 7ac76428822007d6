//! Address map of the machine.

use crate::display::DisplayAdapter;
use crate::device::WORD_SIZE;

pub const DEFAULT_RAM_SIZE: usize = 32 * 1000;
pub const DEFAULT_VIDEO_BASE: u32 = 0x1_0000;
pub const DEFAULT_NOISE_BASE: u32 = 0x5_0000;
pub const DEFAULT_LED_COUNT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub ram_size: usize,
    pub video_base: u32,
    pub noise_base: u32,
    pub led_count: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            ram_size: DEFAULT_RAM_SIZE,
            video_base: DEFAULT_VIDEO_BASE,
            noise_base: DEFAULT_NOISE_BASE,
            led_count: DEFAULT_LED_COUNT,
        }
    }
}

impl Layout {
    /// Inclusive RAM range. Empty RAM still occupies address 0.
    pub fn ram_range(&self) -> (u32, u32) {
        (0, (self.ram_size as u32).saturating_sub(1))
    }

    /// Last address of the display window, or `None` when the window runs past `u32::MAX`.
    pub fn video_end(&self) -> Option<u32> {
        let span = DisplayAdapter::span(self.led_count)?;
        self.video_base.checked_add(span - 1)
    }

    /// Inclusive display range, clipped to the top of the address space.
    pub fn video_range(&self) -> (u32, u32) {
        (self.video_base, self.video_end().unwrap_or(u32::MAX))
    }

    pub fn noise_range(&self) -> (u32, u32) {
        (
            self.noise_base,
            self.noise_base.saturating_add(WORD_SIZE as u32 - 1),
        )
    }

    /// Bus address of LED `index`, or `None` if it lies past the top of the address space.
    pub fn led_addr(&self, index: usize) -> Option<u32> {
        let offset = index.checked_add(1)?.checked_mul(WORD_SIZE)?;
        self.video_base.checked_add(u32::try_from(offset).ok()?)
    }
}
