//! Lump overlay files
//!
//! A map `name.bsp` may ship with overlays `name_l_0.lmp`, `name_l_1.lmp`,
//! and so on. Each overlay carries a 20 byte header naming one lump and a
//! replacement payload in the same encoding as the base file. Overlays are
//! applied in ascending order after the base lumps are read, so a later
//! overlay for the same lump wins.
//!
//! # Examples
//!
//! ```no_run
//! use source_bsp::lump::LumpSet;
//! use source_bsp::patch::{apply_lump_patches, discover_lump_patches};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut lumps = LumpSet::default();
//! let overlays = discover_lump_patches("maps/de_dust2.bsp", 128);
//! let report = apply_lump_patches(&overlays, 3, &mut lumps, 1 << 28);
//! println!("applied {} overlays", report.applied.len());
//! # Ok(())
//! # }
//! ```

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::header::{HEADER_LUMPS, LumpId};
use crate::lump::{LumpLocation, LumpReader, LumpSet};

/// Size of the overlay header
pub const LUMP_PATCH_HEADER_SIZE: usize = 20;

/// Default cap on the number of overlays probed for one map
pub const DEFAULT_MAX_PATCHES: usize = 128;

/// Header at the start of an overlay file (`lumpfileheader_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LumpPatchHeader {
    /// Payload offset from the start of the overlay file
    pub offset: i32,
    /// Index of the lump being replaced
    pub lump_id: i32,
    /// Lump format version
    pub version: i32,
    /// Payload size in bytes
    pub size: i32,
    /// Map revision the overlay was built against
    pub map_revision: i32,
}

impl LumpPatchHeader {
    /// Read a header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            offset: reader.read_i32::<LittleEndian>()?,
            lump_id: reader.read_i32::<LittleEndian>()?,
            version: reader.read_i32::<LittleEndian>()?,
            size: reader.read_i32::<LittleEndian>()?,
            map_revision: reader.read_i32::<LittleEndian>()?,
        })
    }

    /// Parse the header at the start of an overlay file
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < LUMP_PATCH_HEADER_SIZE {
            return Err(Error::invalid_patch(format!(
                "file is {} bytes, header needs {}",
                data.len(),
                LUMP_PATCH_HEADER_SIZE
            )));
        }
        Self::read(&mut &data[..LUMP_PATCH_HEADER_SIZE])
    }

    /// Lump being replaced
    pub fn lump(&self) -> Result<LumpId> {
        usize::try_from(self.lump_id)
            .ok()
            .and_then(LumpId::from_index)
            .ok_or_else(|| Error::LumpOutOfRange {
                index: self.lump_id.max(0) as usize,
                max: HEADER_LUMPS,
            })
    }

    /// Payload location inside the overlay file
    pub fn location(&self) -> LumpLocation {
        LumpLocation {
            offset: i64::from(self.offset),
            size: i64::from(self.size),
        }
    }
}

/// Path of overlay `index` for a map file
///
/// The map's extension is replaced by `_l_<index>.lmp`.
pub fn lump_patch_path(map_path: impl AsRef<Path>, index: usize) -> PathBuf {
    let map_path = map_path.as_ref();
    let stem = map_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    map_path.with_file_name(format!("{stem}_l_{index}.lmp"))
}

/// Find the overlays present for a map
///
/// Probing starts at index 0 and stops at the first missing file, or after
/// `limit` files.
pub fn discover_lump_patches(map_path: impl AsRef<Path>, limit: usize) -> Vec<PathBuf> {
    let map_path = map_path.as_ref();
    let mut found = Vec::new();

    for index in 0..limit {
        let path = lump_patch_path(map_path, index);
        if !path.is_file() {
            break;
        }
        found.push(path);
    }

    if found.len() == limit && lump_patch_path(map_path, limit).is_file() {
        log::warn!(
            "{} has more than {} lump overlays; the rest are ignored",
            map_path.display(),
            limit
        );
    }

    found
}

/// An overlay file loaded into memory
#[derive(Debug, Clone)]
pub struct LumpPatch {
    /// Parsed header
    pub header: LumpPatchHeader,
    data: Vec<u8>,
}

impl LumpPatch {
    /// Read an overlay file from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data)
    }

    /// Wrap an overlay already in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = LumpPatchHeader::parse(&data)?;
        Ok(Self { header, data })
    }

    /// Lump this overlay replaces
    pub fn lump(&self) -> Result<LumpId> {
        self.header.lump()
    }

    /// Replace the overlay's lump in `lumps`
    ///
    /// Returns `Ok(false)` when the lump is not one the set holds. On error
    /// the set is left unchanged.
    pub fn apply(&self, lumps: &mut LumpSet, max_lump_size: usize) -> Result<bool> {
        let id = self.lump()?;
        let reader = LumpReader::new(&self.data).with_limit(max_lump_size);
        lumps.replace(id, &reader, self.header.location())
    }
}

/// Outcome of applying a list of overlays
#[derive(Debug, Default)]
pub struct PatchReport {
    /// Overlays that replaced a lump, in application order
    pub applied: Vec<(PathBuf, LumpId)>,
    /// Overlays for lumps the collision data does not use
    pub ignored: Vec<(PathBuf, LumpId)>,
    /// Overlays that could not be applied
    pub failed: Vec<(PathBuf, Error)>,
}

/// Apply overlays in order, skipping the ones that fail
///
/// A failed overlay leaves its lump as it was. A revision that differs from
/// `map_revision` is reported but the overlay is still applied.
pub fn apply_lump_patches(
    paths: &[PathBuf],
    map_revision: i32,
    lumps: &mut LumpSet,
    max_lump_size: usize,
) -> PatchReport {
    let mut report = PatchReport::default();

    for path in paths {
        let result = LumpPatch::open(path).and_then(|patch| {
            let id = patch.lump()?;
            if patch.header.map_revision != map_revision {
                log::warn!(
                    "{} was built for map revision {}, map is revision {}",
                    path.display(),
                    patch.header.map_revision,
                    map_revision
                );
            }
            Ok((id, patch.apply(lumps, max_lump_size)?))
        });

        match result {
            Ok((id, true)) => {
                log::info!("Applied lump overlay {} to {}", path.display(), id);
                report.applied.push((path.clone(), id));
            }
            Ok((id, false)) => {
                log::debug!("Ignoring lump overlay {} for {}", path.display(), id);
                report.ignored.push((path.clone(), id));
            }
            Err(e) => {
                log::warn!("Skipping lump overlay {}: {}", path.display(), e);
                report.failed.push((path.clone(), e));
            }
        }
    }

    report
}
