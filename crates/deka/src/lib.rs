//! Core hardware primitives for the deka machine simulator: the decimal
//! [`Word`] with its signed-magnitude codec, physical [`Memory`], the
//! arbitrated [`Bus`], and the sector-addressed [`Disk`].
//!
//! Policy (instruction semantics, privilege, interrupts, DMA) lives in
//! the `dekavm` crate; this one only models the iron.

pub mod bus;
pub use bus::{Bus, BusClient};
pub mod disk;
pub use disk::{Disk, Sector, DISK_CYLINDERS, DISK_SECTORS, DISK_TRACKS, SECTOR_BYTES};
pub mod fault;
pub use fault::HwFault;
pub mod memory;
pub use memory::{Memory, MEM_SIZE, OS_RESERVED, VECTOR_WORDS};
pub mod word;
pub use word::Word;
