//! Faults the hardware layer can report.

use thiserror::Error;

/// A hardware-level failure from memory or disk.
///
/// These are the only errors the physical layer produces; everything the
/// running program can misdo (segment violations, illegal opcodes, stack
/// abuse) is modeled as an interrupt by the machine crate, not as a Rust
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HwFault {
    /// A physical address outside `[0, MEM_SIZE)`.
    #[error("physical address {0} is outside memory")]
    AddressOutOfRange(i64),

    /// A disk access outside the track/cylinder/sector geometry.
    #[error("disk geometry out of range: track {track}, cylinder {cylinder}, sector {sector}")]
    GeometryOutOfRange {
        track: i64,
        cylinder: i64,
        sector: i64,
    },
}
