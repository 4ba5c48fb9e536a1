//! The block-device disk: a track/cylinder/sector grid of 9-byte sectors.

use crate::fault::HwFault;
use std::sync::{Mutex, MutexGuard};

pub const DISK_TRACKS: usize = 10;
pub const DISK_CYLINDERS: usize = 10;
pub const DISK_SECTORS: usize = 100;

/// Each sector stores exactly nine bytes: eight ASCII digits plus a
/// terminator by convention.
pub const SECTOR_BYTES: usize = 9;

/// One sector image.
pub type Sector = [u8; SECTOR_BYTES];

/// The disk: zeroed sectors behind a per-device lock.
///
/// Sector transfers come from the DMA worker; the lock only guards the
/// copy in or out, never a whole transfer.
#[derive(Debug)]
pub struct Disk {
    sectors: Mutex<Box<[Sector]>>,
}

impl Default for Disk {
    fn default() -> Self {
        Self::new()
    }
}

impl Disk {
    #[must_use]
    pub fn new() -> Self {
        log::info!("disk: initialized");
        Self {
            sectors: Mutex::new(
                vec![[0u8; SECTOR_BYTES]; DISK_TRACKS * DISK_CYLINDERS * DISK_SECTORS]
                    .into_boxed_slice(),
            ),
        }
    }

    fn sectors(&self) -> MutexGuard<'_, Box<[Sector]>> {
        match self.sectors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn index(track: i64, cylinder: i64, sector: i64) -> Result<usize, HwFault> {
        let fault = HwFault::GeometryOutOfRange {
            track,
            cylinder,
            sector,
        };
        let t = usize::try_from(track).map_err(|_| fault)?;
        let c = usize::try_from(cylinder).map_err(|_| fault)?;
        let s = usize::try_from(sector).map_err(|_| fault)?;
        if t >= DISK_TRACKS || c >= DISK_CYLINDERS || s >= DISK_SECTORS {
            return Err(fault);
        }
        Ok((t * DISK_CYLINDERS + c) * DISK_SECTORS + s)
    }

    /// Copy one sector out.
    pub fn read_sector(&self, track: i64, cylinder: i64, sector: i64) -> Result<Sector, HwFault> {
        let index = Self::index(track, cylinder, sector)?;
        let image = self.sectors()[index];
        log::trace!(
            "disk: read track {track}, cylinder {cylinder}, sector {sector}: {:?}",
            String::from_utf8_lossy(&image)
        );
        Ok(image)
    }

    /// Copy one sector in.
    pub fn write_sector(
        &self,
        track: i64,
        cylinder: i64,
        sector: i64,
        image: &Sector,
    ) -> Result<(), HwFault> {
        let index = Self::index(track, cylinder, sector)?;
        self.sectors()[index] = *image;
        log::trace!(
            "disk: write track {track}, cylinder {cylinder}, sector {sector}: {:?}",
            String::from_utf8_lossy(image)
        );
        Ok(())
    }
}
