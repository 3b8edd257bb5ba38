//! Typed lump extraction
//!
//! A lump is located either by the base file's descriptor table or by a lump
//! overlay header, decoded through [`crate::compression`] and split into
//! fixed-size records.

use glam::Vec3;
use std::borrow::Cow;

use crate::compression::decode_lump;
use crate::error::{Error, Result};
use crate::format::{DBrush, DBrushSide, DEdge, DFace, DLeaf, DNode, DPlane, LumpElement, TexInfo};
use crate::header::{BspHeader, LumpDescriptor, LumpId};

/// Default upper bound for a single lump, raw or decompressed
pub const DEFAULT_MAX_LUMP_SIZE: usize = 256 * 1024 * 1024;

/// Most leaf face or leaf brush entries the engine addresses
pub const MAX_MAP_LEAFBRUSHES: usize = 65536;

/// Byte range of a lump payload inside its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LumpLocation {
    /// Byte offset from the start of the file
    pub offset: i64,
    /// Payload size in bytes
    pub size: i64,
}

impl From<&LumpDescriptor> for LumpLocation {
    fn from(descriptor: &LumpDescriptor) -> Self {
        Self {
            offset: i64::from(descriptor.offset),
            size: i64::from(descriptor.size),
        }
    }
}

/// Reads lumps out of an in-memory map or overlay file
#[derive(Debug, Clone, Copy)]
pub struct LumpReader<'a> {
    data: &'a [u8],
    max_lump_size: usize,
}

impl<'a> LumpReader<'a> {
    /// Create a reader over a complete file
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            max_lump_size: DEFAULT_MAX_LUMP_SIZE,
        }
    }

    /// Bound the raw and decompressed size of every lump read
    pub fn with_limit(mut self, max_lump_size: usize) -> Self {
        self.max_lump_size = max_lump_size;
        self
    }

    /// Raw payload bytes at a location, before decompression
    pub fn payload(&self, id: LumpId, location: LumpLocation) -> Result<&'a [u8]> {
        let out_of_bounds = || Error::LumpOutOfBounds {
            lump: id,
            offset: location.offset,
            size: location.size,
            file_len: self.data.len(),
        };

        if location.offset < 0 || location.size < 0 {
            return Err(out_of_bounds());
        }
        let start = usize::try_from(location.offset).map_err(|_| out_of_bounds())?;
        let size = usize::try_from(location.size).map_err(|_| out_of_bounds())?;

        if size > self.max_lump_size {
            return Err(Error::LimitExceeded(format!(
                "lump {} is {} bytes, limit is {}",
                id, size, self.max_lump_size
            )));
        }

        let end = start.checked_add(size).ok_or_else(out_of_bounds)?;
        self.data.get(start..end).ok_or_else(out_of_bounds)
    }

    /// Payload bytes at a location, decompressed when compressed
    pub fn bytes(&self, id: LumpId, location: LumpLocation) -> Result<Cow<'a, [u8]>> {
        let payload = self.payload(id, location)?;
        decode_lump(id, payload, self.max_lump_size)
    }

    /// Decode the records of a lump at a location
    pub fn elements<T: LumpElement>(&self, id: LumpId, location: LumpLocation) -> Result<Vec<T>> {
        let bytes = self.bytes(id, location)?;
        let elements = read_elements::<T>(&bytes)?;
        log::debug!("Read lump {}: {} records", id, elements.len());
        Ok(elements)
    }

    /// Decode the records of a lump using the file's own descriptor table
    pub fn lump<T: LumpElement>(&self, header: &BspHeader, id: LumpId) -> Result<Vec<T>> {
        let descriptor = header.lump(id)?;
        self.elements(id, descriptor.into())
    }
}

/// Decoded records of every lump the collision geometry is built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LumpSet {
    /// Entity text
    pub entities: String,
    /// Plane records
    pub planes: Vec<DPlane>,
    /// Vertex positions
    pub vertices: Vec<Vec3>,
    /// Edge records
    pub edges: Vec<DEdge>,
    /// Signed edge indices
    pub surf_edges: Vec<i32>,
    /// Node records
    pub nodes: Vec<DNode>,
    /// Leaf records
    pub leaves: Vec<DLeaf>,
    /// Face records
    pub faces: Vec<DFace>,
    /// Texture info records
    pub tex_infos: Vec<TexInfo>,
    /// Brush records
    pub brushes: Vec<DBrush>,
    /// Brush side records
    pub brush_sides: Vec<DBrushSide>,
    /// Leaf to face indices
    pub leaf_faces: Vec<u16>,
    /// Leaf to brush indices
    pub leaf_brushes: Vec<u16>,
}

impl LumpSet {
    /// Lumps held by a set, in the order they are read from a map
    pub const LUMPS: [LumpId; 13] = [
        LumpId::Vertexes,
        LumpId::Planes,
        LumpId::Edges,
        LumpId::SurfEdges,
        LumpId::Leafs,
        LumpId::Nodes,
        LumpId::Faces,
        LumpId::TexInfo,
        LumpId::Brushes,
        LumpId::BrushSides,
        LumpId::LeafFaces,
        LumpId::LeafBrushes,
        LumpId::Entities,
    ];

    /// Read every lump of the set from a map file
    pub fn read(reader: &LumpReader<'_>, header: &BspHeader) -> Result<Self> {
        let mut set = Self::default();
        for id in Self::LUMPS {
            set.replace(id, reader, header.lump(id)?.into())?;
        }
        Ok(set)
    }

    /// Whether a lump belongs to the set
    pub fn holds(id: LumpId) -> bool {
        Self::LUMPS.contains(&id)
    }

    /// Replace one lump with the records decoded at a location
    ///
    /// The previous records stay in place unless decoding succeeds. Returns
    /// `false` for lumps outside the set, which are left alone.
    pub fn replace(
        &mut self,
        id: LumpId,
        reader: &LumpReader<'_>,
        location: LumpLocation,
    ) -> Result<bool> {
        match id {
            LumpId::Entities => self.entities = entity_text(&reader.bytes(id, location)?),
            LumpId::Planes => self.planes = reader.elements(id, location)?,
            LumpId::Vertexes => self.vertices = reader.elements(id, location)?,
            LumpId::Edges => self.edges = reader.elements(id, location)?,
            LumpId::SurfEdges => self.surf_edges = reader.elements(id, location)?,
            LumpId::Nodes => self.nodes = reader.elements(id, location)?,
            LumpId::Leafs => self.leaves = reader.elements(id, location)?,
            LumpId::Faces => self.faces = reader.elements(id, location)?,
            LumpId::TexInfo => self.tex_infos = reader.elements(id, location)?,
            LumpId::Brushes => self.brushes = reader.elements(id, location)?,
            LumpId::BrushSides => self.brush_sides = reader.elements(id, location)?,
            LumpId::LeafFaces => {
                self.leaf_faces = reader.elements(id, location)?;
                check_leaf_index_count("leaf faces", self.leaf_faces.len());
            }
            LumpId::LeafBrushes => {
                self.leaf_brushes = reader.elements(id, location)?;
                check_leaf_index_count("leaf brushes", self.leaf_brushes.len());
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn entity_text(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn check_leaf_index_count(kind: &str, count: usize) {
    if count > MAX_MAP_LEAFBRUSHES {
        log::warn!(
            "Map has {} {}, more than the engine limit of {}",
            count,
            kind,
            MAX_MAP_LEAFBRUSHES
        );
    } else if count == 0 {
        log::warn!("Map has no {}", kind);
    }
}

/// Split a decoded buffer into records
///
/// Trailing bytes that do not fill a whole record are ignored.
pub fn read_elements<T: LumpElement>(bytes: &[u8]) -> Result<Vec<T>> {
    let count = bytes.len() / T::SIZE;
    let remainder = bytes.len() % T::SIZE;
    if remainder != 0 {
        log::trace!(
            "Dropping {} trailing bytes after {} records of {} bytes",
            remainder,
            count,
            T::SIZE
        );
    }

    let mut reader = &bytes[..count * T::SIZE];
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        elements.push(T::read(&mut reader)?);
    }
    Ok(elements)
}
