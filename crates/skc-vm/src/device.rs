use crate::display::DisplayAdapter;
use crate::noise::Noise;
use crate::ram::Ram;

/// Every bus transaction moves exactly one word.
pub const WORD_SIZE: usize = 4;

/// One bus word, in the order the bytes appear in memory.
pub type Word = [u8; WORD_SIZE];

/// Anything that can be attached to the [`Bus`](crate::Bus).
///
/// `offset` is local to the device: the bus subtracts the start of the binding's range before
/// forwarding. Reads take `&mut self` because some devices (the noise source) change state on
/// every read.
pub trait Device {
    fn read(&mut self, offset: u32) -> Word;
    fn write(&mut self, offset: u32, data: Word);
}

/// The closed set of devices the machine knows how to map.
#[derive(Debug)]
pub enum BusDevice {
    Ram(Ram),
    Display(DisplayAdapter),
    Noise(Noise),
}

impl BusDevice {
    pub fn kind(&self) -> &'static str {
        match self {
            BusDevice::Ram(_) => "ram",
            BusDevice::Display(_) => "display",
            BusDevice::Noise(_) => "noise",
        }
    }
}

impl Device for BusDevice {
    fn read(&mut self, offset: u32) -> Word {
        match self {
            BusDevice::Ram(dev) => dev.read(offset),
            BusDevice::Display(dev) => dev.read(offset),
            BusDevice::Noise(dev) => dev.read(offset),
        }
    }

    fn write(&mut self, offset: u32, data: Word) {
        match self {
            BusDevice::Ram(dev) => dev.write(offset, data),
            BusDevice::Display(dev) => dev.write(offset, data),
            BusDevice::Noise(dev) => dev.write(offset, data),
        }
    }
}

impl From<Ram> for BusDevice {
    fn from(dev: Ram) -> Self {
        BusDevice::Ram(dev)
    }
}

impl From<DisplayAdapter> for BusDevice {
    fn from(dev: DisplayAdapter) -> Self {
        BusDevice::Display(dev)
    }
}

impl From<Noise> for BusDevice {
    fn from(dev: Noise) -> Self {
        BusDevice::Noise(dev)
    }
}
