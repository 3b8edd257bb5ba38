//! VBSP file header and lump descriptor table

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Read;

use crate::error::{Error, Result};

/// Identifier bytes at the start of every VBSP file, in file order
pub const VBSP_MAGIC: [u8; 4] = *b"VBSP";

/// Identifier as read little-endian from the file
pub const VBSP_IDENT: i32 = i32::from_le_bytes(VBSP_MAGIC);

/// Number of descriptors in the lump table
pub const HEADER_LUMPS: usize = 64;

/// Size of one lump descriptor on disk
pub const LUMP_DESCRIPTOR_SIZE: usize = 16;

/// Size of the file header on disk
pub const HEADER_SIZE: usize = 8 + HEADER_LUMPS * LUMP_DESCRIPTOR_SIZE + 4;

/// Oldest format version this decoder was written against
pub const MIN_KNOWN_VERSION: i32 = 19;

/// Newest format version this decoder was written against
pub const MAX_KNOWN_VERSION: i32 = 21;

/// Identifies a slot in the lump table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LumpId {
    /// Entity key/value text
    Entities,
    /// Splitting and brush planes
    Planes,
    /// Texture data references
    TexData,
    /// Vertex positions
    Vertexes,
    /// Compressed visibility bit arrays
    Visibility,
    /// BSP tree nodes
    Nodes,
    /// Texture projection info
    TexInfo,
    /// Render faces
    Faces,
    /// Lightmap samples
    Lighting,
    /// Occlusion polygons
    Occlusion,
    /// BSP tree leaves
    Leafs,
    /// Vertex index pairs
    Edges,
    /// Signed edge indices for face windings
    SurfEdges,
    /// Brush models
    Models,
    /// Internal world lights
    WorldLights,
    /// Leaf to face index array
    LeafFaces,
    /// Leaf to brush index array
    LeafBrushes,
    /// Convex brushes
    Brushes,
    /// Brush sides
    BrushSides,
    /// Areas
    Areas,
    /// Portals between areas
    AreaPortals,
    /// Displacement surface info
    DispInfo,
    /// Faces before splitting
    OriginalFaces,
    /// Physics collision data
    PhysCollide,
    /// Vertex normals
    VertNormals,
    /// Vertex normal indices
    VertNormalIndices,
    /// Displacement vertices
    DispVerts,
    /// Game specific data, compressed per segment
    GameLump,
    /// Leaf water data
    LeafWaterData,
    /// Embedded zip archive, compressed per entry
    PakFile,
    /// Cubemap sample positions
    Cubemaps,
    /// Texture name string data
    TexDataStringData,
    /// Texture name string offsets
    TexDataStringTable,
    /// Overlays
    Overlays,
    /// Displacement triangle tags
    DispTris,
    /// Any slot without a dedicated variant
    Other(u8),
}

impl LumpId {
    const NAMED: [(u8, LumpId, &'static str); 35] = [
        (0, LumpId::Entities, "ENTITIES"),
        (1, LumpId::Planes, "PLANES"),
        (2, LumpId::TexData, "TEXDATA"),
        (3, LumpId::Vertexes, "VERTEXES"),
        (4, LumpId::Visibility, "VISIBILITY"),
        (5, LumpId::Nodes, "NODES"),
        (6, LumpId::TexInfo, "TEXINFO"),
        (7, LumpId::Faces, "FACES"),
        (8, LumpId::Lighting, "LIGHTING"),
        (9, LumpId::Occlusion, "OCCLUSION"),
        (10, LumpId::Leafs, "LEAFS"),
        (12, LumpId::Edges, "EDGES"),
        (13, LumpId::SurfEdges, "SURFEDGES"),
        (14, LumpId::Models, "MODELS"),
        (15, LumpId::WorldLights, "WORLDLIGHTS"),
        (16, LumpId::LeafFaces, "LEAFFACES"),
        (17, LumpId::LeafBrushes, "LEAFBRUSHES"),
        (18, LumpId::Brushes, "BRUSHES"),
        (19, LumpId::BrushSides, "BRUSHSIDES"),
        (20, LumpId::Areas, "AREAS"),
        (21, LumpId::AreaPortals, "AREAPORTALS"),
        (26, LumpId::DispInfo, "DISPINFO"),
        (27, LumpId::OriginalFaces, "ORIGINALFACES"),
        (29, LumpId::PhysCollide, "PHYSCOLLIDE"),
        (30, LumpId::VertNormals, "VERTNORMALS"),
        (31, LumpId::VertNormalIndices, "VERTNORMALINDICES"),
        (33, LumpId::DispVerts, "DISP_VERTS"),
        (35, LumpId::GameLump, "GAME_LUMP"),
        (36, LumpId::LeafWaterData, "LEAFWATERDATA"),
        (40, LumpId::PakFile, "PAKFILE"),
        (42, LumpId::Cubemaps, "CUBEMAPS"),
        (43, LumpId::TexDataStringData, "TEXDATA_STRING_DATA"),
        (44, LumpId::TexDataStringTable, "TEXDATA_STRING_TABLE"),
        (45, LumpId::Overlays, "OVERLAYS"),
        (48, LumpId::DispTris, "DISP_TRIS"),
    ];

    /// Look up the lump for a table index
    ///
    /// Returns `None` for indices outside the 64-entry table.
    pub fn from_index(index: usize) -> Option<Self> {
        if index >= HEADER_LUMPS {
            return None;
        }
        let raw = index as u8;
        Some(
            Self::NAMED
                .iter()
                .find(|(i, _, _)| *i == raw)
                .map_or(LumpId::Other(raw), |(_, id, _)| *id),
        )
    }

    /// Table index of this lump
    pub fn index(self) -> usize {
        match self {
            LumpId::Other(raw) => raw as usize,
            named => Self::NAMED
                .iter()
                .find(|(_, id, _)| *id == named)
                .map_or(0, |(i, _, _)| *i as usize),
        }
    }

    /// Upper-case lump name as used by the map compiler tools
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, id, _)| *id == self)
            .map(|(_, _, name)| *name)
    }

    /// Lumps whose payload is compressed segment by segment rather than whole
    pub fn is_segmented(self) -> bool {
        matches!(self, LumpId::GameLump | LumpId::PakFile)
    }
}

impl fmt::Display for LumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.index()),
            None => write!(f, "lump {}", self.index()),
        }
    }
}

/// One entry of the lump table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LumpDescriptor {
    /// Byte offset of the payload from the start of the file
    pub offset: i32,
    /// Payload size in bytes
    pub size: i32,
    /// Per-lump format version
    pub version: i32,
    /// Four-character code; holds the uncompressed size for compressed lumps
    pub fourcc: [u8; 4],
}

impl LumpDescriptor {
    /// Read a descriptor from a reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let offset = reader.read_i32::<LittleEndian>()?;
        let size = reader.read_i32::<LittleEndian>()?;
        let version = reader.read_i32::<LittleEndian>()?;
        let mut fourcc = [0u8; 4];
        reader.read_exact(&mut fourcc)?;

        Ok(Self {
            offset,
            size,
            version,
            fourcc,
        })
    }

    /// Whether the descriptor points at no data
    pub fn is_empty(&self) -> bool {
        self.size <= 0
    }
}

/// VBSP file header
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BspHeader {
    /// Format version
    pub version: i32,
    /// Lump table
    pub lumps: Vec<LumpDescriptor>,
    /// Map revision counter, bumped on every compile
    pub map_revision: i32,
}

impl BspHeader {
    /// Read and validate a header from a reader
    ///
    /// The identifier must equal `VBSP` exactly. A version outside the known
    /// range is logged but accepted.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let ident = reader.read_i32::<LittleEndian>()?;
        if ident != VBSP_IDENT {
            return Err(Error::InvalidMagic {
                expected: VBSP_MAGIC,
                found: ident.to_le_bytes(),
            });
        }

        let version = reader.read_i32::<LittleEndian>()?;
        if !(MIN_KNOWN_VERSION..=MAX_KNOWN_VERSION).contains(&version) {
            log::warn!("Unknown VBSP version {}, trying to parse it anyway", version);
        }

        let mut lumps = Vec::with_capacity(HEADER_LUMPS);
        for _ in 0..HEADER_LUMPS {
            lumps.push(LumpDescriptor::read(reader)?);
        }

        let map_revision = reader.read_i32::<LittleEndian>()?;

        log::debug!(
            "VBSP header: version {}, map revision {}",
            version,
            map_revision
        );

        Ok(Self {
            version,
            lumps,
            map_revision,
        })
    }

    /// Parse a header from the start of a byte slice
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::invalid_format(format!(
                "file is {} bytes, header needs {}",
                data.len(),
                HEADER_SIZE
            )));
        }
        Self::read(&mut &data[..HEADER_SIZE])
    }

    /// Descriptor for a lump id
    pub fn lump(&self, id: LumpId) -> Result<&LumpDescriptor> {
        self.lump_at(id.index())
    }

    /// Descriptor at a raw table index
    pub fn lump_at(&self, index: usize) -> Result<&LumpDescriptor> {
        self.lumps.get(index).ok_or(Error::LumpOutOfRange {
            index,
            max: self.lumps.len(),
        })
    }
}
