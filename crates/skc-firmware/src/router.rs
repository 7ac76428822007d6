//! Client command dispatch.
//!
//! The first byte of every message is an ASCII tag:
//!
//! | tag | payload                    | effect                                  |
//! |-----|----------------------------|-----------------------------------------|
//! | `B` | `ceil(L/8)` bitmap bytes   | LED on (full white) / off               |
//! | `M` | `L` grayscale bytes        | level replicated across r, g, b         |
//! | `C` | `L` packed palette bytes   | bit-packed colour, see [`unpack_color`] |
//! | `T` | `3L` bytes                 | explicit `r, g, b` per LED              |
//! | `u` | -                          | empty the program store                 |
//! | `U` | program bytes              | append to the program store             |
//!
//! Anything else is ignored. A payload shorter than the LED chain updates only the LEDs it
//! covers; extra bytes are ignored.

use skc_vm::{Display, Rgb};

use crate::store::{ProgramStore, StoreError};

/// What a message did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A display command updated `leds` LEDs and flushed the frame once.
    Display { leds: usize },
    StoreReset,
    StoreAppend { bytes: usize },
    Ignored,
}

pub async fn dispatch(
    display: &skc_vm::SharedDisplay,
    store: &ProgramStore,
    message: &[u8],
) -> Result<Routed, StoreError> {
    let Some((&tag, body)) = message.split_first() else {
        return Ok(Routed::Ignored);
    };

    let routed = match tag {
        b'B' | b'M' | b'C' | b'T' => {
            let mut display = display.borrow_mut();
            let leds = paint(&mut display, tag, body);
            display.flush();
            Routed::Display { leds }
        }
        b'u' => {
            store.truncate().await?;
            Routed::StoreReset
        }
        b'U' => {
            store.append(body).await?;
            Routed::StoreAppend { bytes: body.len() }
        }
        _ => Routed::Ignored,
    };
    tracing::debug!(tag = %char::from(tag), len = message.len(), ?routed, "command");
    Ok(routed)
}

/// Apply one display command to the frame without flushing. Returns the number of LEDs written.
fn paint(display: &mut Display, tag: u8, body: &[u8]) -> usize {
    let count = display.len();
    let colors: Vec<Rgb> = match tag {
        b'B' => (0..count)
            .map_while(|led| body.get(led / 8).map(|byte| (byte >> (led % 8)) & 1))
            .map(|bit| if bit == 1 { Rgb::gray(0xFF) } else { Rgb::OFF })
            .collect(),
        b'M' => body.iter().take(count).map(|&level| Rgb::gray(level)).collect(),
        b'C' => body.iter().take(count).map(|&packed| unpack_color(packed)).collect(),
        b'T' => body
            .chunks_exact(3)
            .take(count)
            .map(|rgb| Rgb::new(rgb[0], rgb[1], rgb[2]))
            .collect(),
        _ => Vec::new(),
    };
    for (led, color) in colors.iter().enumerate() {
        display.set(led, *color);
    }
    colors.len()
}

/// Expand a packed palette byte. The channel masks interleave and are deliberately lossy.
pub fn unpack_color(packed: u8) -> Rgb {
    Rgb::new(
        packed & 0b1000_0100,
        (packed & 0b0101_0010) << 1,
        (packed & 0b0010_1001) << 2,
    )
}
