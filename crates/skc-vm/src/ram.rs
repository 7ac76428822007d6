use crate::device::{Device, Word, WORD_SIZE};

/// Flat byte store.
///
/// The backing buffer carries `WORD_SIZE - 1` bytes of padding past the addressable size so a
/// word access at the last mapped offset still lands entirely inside the buffer.
#[derive(Debug, Clone)]
pub struct Ram {
    mem: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size + WORD_SIZE - 1],
        }
    }

    /// Copy `bytes` in starting at `offset`, returning how many bytes fit.
    pub fn load(&mut self, offset: usize, bytes: &[u8]) -> usize {
        let Some(dst) = self.mem.get_mut(offset..) else {
            return 0;
        };
        let count = bytes.len().min(dst.len());
        dst[..count].copy_from_slice(&bytes[..count]);
        count
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mem
    }
}

impl Device for Ram {
    fn read(&mut self, offset: u32) -> Word {
        let mut out = [0u8; WORD_SIZE];
        if let Some(src) = self.mem.get(offset as usize..) {
            let count = src.len().min(WORD_SIZE);
            out[..count].copy_from_slice(&src[..count]);
        }
        out
    }

    fn write(&mut self, offset: u32, data: Word) {
        self.load(offset as usize, &data);
    }
}
