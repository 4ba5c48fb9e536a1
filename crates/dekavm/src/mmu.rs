//! Logical-to-physical translation with base/limit protection.

use crate::processor::psw::Mode;
use thiserror::Error;

/// A user-mode access that fell outside the `[base, limit]` segment.
///
/// The MMU only reports the violation; the CPU decides to raise INV_ADDR,
/// so this module stays free of interrupt machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("segment violation: logical {logical} -> physical {physical} outside [{base}, {limit}]")]
pub struct SegmentViolation {
    pub logical: i64,
    pub physical: i64,
    pub base: i64,
    pub limit: i64,
}

/// Translate a logical address.
///
/// Kernel mode passes through untouched; User mode relocates by `base` and
/// must land within `[base, limit]`.
pub fn translate(logical: i64, mode: Mode, base: i64, limit: i64) -> Result<i64, SegmentViolation> {
    if mode == Mode::Kernel {
        return Ok(logical);
    }
    let physical = logical + base;
    if physical < base || physical > limit {
        return Err(SegmentViolation {
            logical,
            physical,
            base,
            limit,
        });
    }
    Ok(physical)
}
