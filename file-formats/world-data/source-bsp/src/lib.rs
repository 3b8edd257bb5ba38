//! # source_bsp - Source Engine Map Library
//!
//! Reads Source engine VBSP map files and answers ray queries against their
//! collision geometry.
//!
//! ## Features
//!
//! - VBSP header and lump table parsing (versions 19 to 21)
//! - Transparent decoding of LZMA compressed lumps
//! - `_l_N.lmp` lump overlays applied on load
//! - Collision geometry: BSP tree, brushes and face polygons
//! - Segment traces with content masks, visibility and point contents
//! - Entity key/value parsing
//! - A shared map context that swaps maps atomically under concurrent queries
//!
//! ## Examples
//!
//! ```no_run
//! use glam::Vec3;
//! use source_bsp::{BspMap, Contents};
//!
//! # fn main() -> Result<(), source_bsp::Error> {
//! let map = BspMap::open("maps/de_dust2.bsp")?;
//!
//! let trace = map.trace_ray(Vec3::new(0.0, 0.0, 64.0), Vec3::new(512.0, 0.0, 64.0));
//! if trace.is_blocked() {
//!     println!("hit at {:?} ({:.1}%)", trace.end_pos, trace.fraction * 100.0);
//! }
//!
//! let solid = map.trace_ray_with_mask(
//!     Vec3::ZERO,
//!     Vec3::new(0.0, 0.0, -128.0),
//!     Contents::MASK_PLAYER_SOLID,
//! );
//! println!("floor at fraction {}", solid.fraction);
//!
//! for spawn in map.entities_by_class("info_player_terrorist") {
//!     println!("spawn at {:?}", spawn.origin());
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod compression;
pub mod contents;
pub mod entity;
pub mod error;
pub mod format;
pub mod geometry;
pub mod header;
pub mod lump;
pub mod map;
pub mod patch;
pub mod trace;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use contents::Contents;
pub use entity::{Entity, parse_entities};
pub use error::{Error, Result};
pub use geometry::{BspGeometry, Plane, Polygon};
pub use header::{BspHeader, LumpDescriptor, LumpId};
pub use lump::{LumpReader, LumpSet};
pub use map::{BspMap, LoadOptions, MapContext};
pub use patch::{LumpPatch, LumpPatchHeader, discover_lump_patches};
pub use trace::TraceResult;
