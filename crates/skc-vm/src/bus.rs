use crate::device::{BusDevice, Device, Word};
use crate::ram::Ram;

struct Binding {
    addr_from: u32,
    addr_to: u32,
    device: BusDevice,
}

impl Binding {
    fn contains(&self, addr: u32) -> bool {
        self.addr_from <= addr && addr <= self.addr_to
    }
}

/// Address-range dispatcher for 4-byte transactions.
///
/// Bindings are scanned in registration order and the first one whose inclusive range
/// `[addr_from, addr_to]` contains the address wins. Overlapping ranges are accepted as-is; the
/// earlier binding shadows the later one. Reads from unmapped addresses return zeros and writes
/// to unmapped addresses are dropped.
#[derive(Default)]
pub struct Bus {
    bindings: Vec<Binding>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, device: impl Into<BusDevice>, addr_from: u32, addr_to: u32) {
        self.bindings.push(Binding {
            addr_from,
            addr_to,
            device: device.into(),
        });
    }

    pub fn read(&mut self, addr: u32) -> Word {
        match self.find(addr) {
            Some(binding) => binding.device.read(addr - binding.addr_from),
            None => [0; 4],
        }
    }

    pub fn write(&mut self, addr: u32, data: Word) {
        if let Some(binding) = self.find(addr) {
            binding.device.write(addr - binding.addr_from, data);
        }
    }

    /// The first RAM binding, which is where programs are loaded.
    pub fn ram_mut(&mut self) -> Option<&mut Ram> {
        self.bindings.iter_mut().find_map(|b| match &mut b.device {
            BusDevice::Ram(ram) => Some(ram),
            _ => None,
        })
    }

    /// `(addr_from, addr_to, kind)` for every binding, in dispatch order.
    pub fn map(&self) -> impl Iterator<Item = (u32, u32, &'static str)> + '_ {
        self.bindings
            .iter()
            .map(|b| (b.addr_from, b.addr_to, b.device.kind()))
    }

    fn find(&mut self, addr: u32) -> Option<&mut Binding> {
        self.bindings.iter_mut().find(|b| b.contains(addr))
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (from, to, kind) in self.map() {
            list.entry(&format_args!("{kind}@{from:#x}..={to:#x}"));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ram_with(bytes: &[u8]) -> Ram {
        let mut ram = Ram::new(16);
        ram.load(0, bytes);
        ram
    }

    #[test]
    fn forwards_device_local_offsets() {
        let mut bus = Bus::new();
        bus.connect(Ram::new(16), 0x100, 0x10f);

        bus.write(0x104, [1, 2, 3, 4]);
        assert_eq!(bus.read(0x104), [1, 2, 3, 4]);

        let ram = bus.ram_mut().unwrap();
        assert_eq!(&ram.as_slice()[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn range_end_is_inclusive() {
        let mut bus = Bus::new();
        bus.connect(ram_with(&[0; 16]), 0, 15);

        bus.write(15, [9, 9, 9, 9]);
        assert_eq!(bus.read(15), [9, 9, 9, 9]);
        assert_eq!(bus.read(16), [0, 0, 0, 0]);
    }

    #[test]
    fn overlapping_bindings_resolve_to_first_registered() {
        let mut bus = Bus::new();
        bus.connect(ram_with(&[0xAA; 4]), 0, 15);
        bus.connect(ram_with(&[0xBB; 4]), 0, 15);

        assert_eq!(bus.read(0), [0xAA; 4]);
        bus.write(0, [1, 1, 1, 1]);
        assert_eq!(bus.read(0), [1, 1, 1, 1]);
        assert_eq!(bus.ram_mut().unwrap().as_slice()[0], 1);
    }

    #[test]
    fn map_lists_bindings_in_dispatch_order() {
        let mut bus = Bus::new();
        bus.connect(Ram::new(4), 0, 3);
        bus.connect(crate::Noise::from_seed(1), 0x50000, 0x50003);

        let map: Vec<_> = bus.map().collect();
        assert_eq!(map, vec![(0, 3, "ram"), (0x50000, 0x50003, "noise")]);
    }

    proptest! {
        #[test]
        fn unmapped_reads_are_zero_and_writes_are_dropped(addr in 0x20u32.., data: [u8; 4]) {
            let mut bus = Bus::new();
            bus.connect(Ram::new(16), 0, 15);

            bus.write(addr, data);
            prop_assert_eq!(bus.read(addr), [0u8; 4]);
            prop_assert!(bus.ram_mut().unwrap().as_slice().iter().all(|&b| b == 0));
        }
    }
}
