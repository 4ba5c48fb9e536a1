//! Physical RAM: a fixed array of decimal words.

use crate::fault::HwFault;
use crate::word::Word;
use log::trace;

/// Number of words of physical memory.
pub const MEM_SIZE: usize = 2000;

/// Words reserved for the interrupt vector prologue, `[0, VECTOR_WORDS)`.
pub const VECTOR_WORDS: usize = 30;

/// Upper bound of the kernel stack and data region, `[VECTOR_WORDS, OS_RESERVED)`.
/// User programs load at this address and above.
pub const OS_RESERVED: usize = 300;

/// The physical word store.
///
/// Zeroed at construction and bounds-checked on every access. All traffic
/// is expected to arrive through the [`Bus`](crate::Bus); nothing here
/// serializes concurrent callers.
#[derive(Debug)]
pub struct Memory {
    cells: Box<[Word]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            cells: vec![Word::ZERO; MEM_SIZE].into_boxed_slice(),
        }
    }
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the word at a physical address.
    pub fn read(&self, address: i64) -> Result<Word, HwFault> {
        let cell = usize::try_from(address)
            .ok()
            .and_then(|a| self.cells.get(a))
            .ok_or(HwFault::AddressOutOfRange(address))?;
        trace!("memory: read [{address}] -> {cell}");
        Ok(*cell)
    }

    /// Write a word at a physical address.
    pub fn write(&mut self, address: i64, word: Word) -> Result<(), HwFault> {
        let cell = usize::try_from(address)
            .ok()
            .and_then(|a| self.cells.get_mut(a))
            .ok_or(HwFault::AddressOutOfRange(address))?;
        *cell = word;
        trace!("memory: write [{address}] <- {word}");
        Ok(())
    }
}
