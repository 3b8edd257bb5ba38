//! Synthetic map fixtures for tests and benchmarks
//!
//! The library never writes maps. These helpers encode small VBSP files and
//! lump overlays in memory so the readers can be exercised end to end.

use glam::Vec3;
use std::io;
use std::path::Path;

use crate::contents::Contents;
use crate::format::{DBrush, DBrushSide, DEdge, DFace, DLeaf, DNode, DPlane, TexInfo};
use crate::header::{HEADER_LUMPS, HEADER_SIZE, LUMP_DESCRIPTOR_SIZE, LumpId, VBSP_MAGIC};
use crate::lump::LumpSet;
use crate::patch::LUMP_PATCH_HEADER_SIZE;

/// Encode a record the way [`crate::format::LumpElement`] decodes it
pub trait WriteRecord {
    /// Append the record's on-disk bytes
    fn write_record(&self, buf: &mut Vec<u8>);
}

fn put_i16(buf: &mut Vec<u8>, value: i16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

impl WriteRecord for Vec3 {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_f32(buf, self.x);
        put_f32(buf, self.y);
        put_f32(buf, self.z);
    }
}

impl WriteRecord for u16 {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_u16(buf, *self);
    }
}

impl WriteRecord for i32 {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_i32(buf, *self);
    }
}

impl WriteRecord for DPlane {
    fn write_record(&self, buf: &mut Vec<u8>) {
        self.normal.write_record(buf);
        put_f32(buf, self.dist);
        put_i32(buf, self.kind);
    }
}

impl WriteRecord for DEdge {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.vertices[0]);
        put_u16(buf, self.vertices[1]);
    }
}

impl WriteRecord for DNode {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_i32(buf, self.plane_num);
        put_i32(buf, self.children[0]);
        put_i32(buf, self.children[1]);
        for v in self.mins.iter().chain(&self.maxs) {
            put_i16(buf, *v);
        }
        put_u16(buf, self.first_face);
        put_u16(buf, self.num_faces);
        put_i16(buf, self.area);
        put_i16(buf, 0);
    }
}

impl WriteRecord for DLeaf {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_i32(buf, self.contents);
        put_i16(buf, self.cluster);
        put_u16(buf, self.area_flags);
        for v in self.mins.iter().chain(&self.maxs) {
            put_i16(buf, *v);
        }
        put_u16(buf, self.first_leaf_face);
        put_u16(buf, self.num_leaf_faces);
        put_u16(buf, self.first_leaf_brush);
        put_u16(buf, self.num_leaf_brushes);
        put_i16(buf, self.leaf_water_data_id);
        put_i16(buf, 0);
    }
}

impl WriteRecord for DFace {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.plane_num);
        buf.push(self.side);
        buf.push(self.on_node);
        put_i32(buf, self.first_edge);
        put_i16(buf, self.num_edges);
        put_i16(buf, self.tex_info);
        put_i16(buf, self.disp_info);
        put_i16(buf, self.surface_fog_volume_id);
        buf.extend_from_slice(&self.styles);
        put_i32(buf, self.light_offset);
        put_f32(buf, self.area);
        for v in self.lightmap_mins.iter().chain(&self.lightmap_size) {
            put_i32(buf, *v);
        }
        put_i32(buf, self.orig_face);
        put_u16(buf, self.num_prims);
        put_u16(buf, self.first_prim_id);
        buf.extend_from_slice(&self.smoothing_groups.to_le_bytes());
    }
}

impl WriteRecord for DBrush {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_i32(buf, self.first_side);
        put_i32(buf, self.num_sides);
        put_i32(buf, self.contents);
    }
}

impl WriteRecord for DBrushSide {
    fn write_record(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.plane_num);
        put_i16(buf, self.tex_info);
        put_i16(buf, self.disp_info);
        buf.push(self.bevel);
        buf.push(self.thin);
    }
}

impl WriteRecord for TexInfo {
    fn write_record(&self, buf: &mut Vec<u8>) {
        for row in self.texture_vecs.iter().chain(&self.lightmap_vecs) {
            for v in row {
                put_f32(buf, *v);
            }
        }
        put_i32(buf, self.flags);
        put_i32(buf, self.tex_data);
    }
}

fn encode_records<T: WriteRecord>(records: &[T]) -> Vec<u8> {
    let mut buf = Vec::new();
    for record in records {
        record.write_record(&mut buf);
    }
    buf
}

/// Wrap a buffer in the engine's lump compression header
///
/// Layout: `"LZMA"`, decompressed size, compressed size, five property
/// bytes, then the raw LZMA stream.
pub fn lzma_wrap(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::new();
    lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut encoded)
        .expect("in-memory LZMA compression cannot fail");

    // .lzma container: 5 property bytes, 8 byte size, stream
    let properties = &encoded[..5];
    let stream = &encoded[13..];

    let mut wrapped = Vec::with_capacity(17 + stream.len());
    wrapped.extend_from_slice(b"LZMA");
    wrapped.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wrapped.extend_from_slice(&(stream.len() as u32).to_le_bytes());
    wrapped.extend_from_slice(properties);
    wrapped.extend_from_slice(stream);
    wrapped
}

/// Builder for an in-memory VBSP file
#[derive(Debug, Clone)]
pub struct MapFixture {
    version: i32,
    map_revision: i32,
    compress: bool,
    lumps: LumpSet,
}

impl Default for MapFixture {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! lump_setter {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Set the `", stringify!($name), "` lump")]
        pub fn $name(mut self, records: Vec<$ty>) -> Self {
            self.lumps.$name = records;
            self
        }
    };
}

impl MapFixture {
    /// Empty version 20 map
    pub fn new() -> Self {
        Self {
            version: 20,
            map_revision: 1,
            compress: false,
            lumps: LumpSet::default(),
        }
    }

    /// Map from a complete lump set
    pub fn from_lumps(lumps: LumpSet) -> Self {
        Self {
            lumps,
            ..Self::new()
        }
    }

    /// Map split at y = 0 with a solid wall filling y >= 0
    pub fn wall() -> Self {
        Self::from_lumps(wall_lumps(Contents::SOLID)).entities(
            "{\n\"classname\" \"worldspawn\"\n\"mapversion\" \"1\"\n}\n\
             {\n\"classname\" \"info_player_start\"\n\"origin\" \"0 -64 0\"\n}\n",
        )
    }

    /// Set the header version
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Set the header map revision
    pub fn map_revision(mut self, map_revision: i32) -> Self {
        self.map_revision = map_revision;
        self
    }

    /// Store every non-empty lump compressed
    pub fn compress_lumps(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the entity text; a terminating NUL is added on encode
    pub fn entities(mut self, text: &str) -> Self {
        self.lumps.entities = text.to_string();
        self
    }

    lump_setter!(planes, DPlane);
    lump_setter!(vertices, Vec3);
    lump_setter!(edges, DEdge);
    lump_setter!(surf_edges, i32);
    lump_setter!(nodes, DNode);
    lump_setter!(leaves, DLeaf);
    lump_setter!(faces, DFace);
    lump_setter!(tex_infos, TexInfo);
    lump_setter!(brushes, DBrush);
    lump_setter!(brush_sides, DBrushSide);
    lump_setter!(leaf_faces, u16);
    lump_setter!(leaf_brushes, u16);

    /// Lumps the fixture encodes
    pub fn lumps(&self) -> &LumpSet {
        &self.lumps
    }

    /// Stored bytes of one lump, compressed when enabled
    pub fn lump_bytes(&self, id: LumpId) -> Vec<u8> {
        let raw = encode_lump(&self.lumps, id);
        if self.compress && !raw.is_empty() {
            lzma_wrap(&raw)
        } else {
            raw
        }
    }

    /// Encode the complete map file
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut descriptors = vec![[0i32; 4]; HEADER_LUMPS];
        let mut body = Vec::new();

        for id in LumpSet::LUMPS {
            let raw = encode_lump(&self.lumps, id);
            let (stored, fourcc) = if self.compress && !raw.is_empty() {
                (lzma_wrap(&raw), raw.len() as i32)
            } else {
                (raw, 0)
            };
            let offset = HEADER_SIZE + body.len();
            descriptors[id.index()] = [offset as i32, stored.len() as i32, 0, fourcc];
            body.extend_from_slice(&stored);
            while body.len() % 4 != 0 {
                body.push(0);
            }
        }

        let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
        bytes.extend_from_slice(&VBSP_MAGIC);
        put_i32(&mut bytes, self.version);
        for descriptor in &descriptors {
            for v in descriptor {
                put_i32(&mut bytes, *v);
            }
        }
        put_i32(&mut bytes, self.map_revision);
        debug_assert_eq!(bytes.len(), 8 + HEADER_LUMPS * LUMP_DESCRIPTOR_SIZE + 4);
        bytes.extend_from_slice(&body);
        bytes
    }

    /// Write the encoded map to disk
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_bytes())
    }

    /// Encode one of this fixture's lumps as an overlay file
    pub fn patch_bytes(&self, id: LumpId) -> Vec<u8> {
        lump_patch(id, &self.lump_bytes(id), self.map_revision)
    }
}

/// Encode an overlay file carrying `payload` for lump `id`
pub fn lump_patch(id: LumpId, payload: &[u8], map_revision: i32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(LUMP_PATCH_HEADER_SIZE + payload.len());
    put_i32(&mut bytes, LUMP_PATCH_HEADER_SIZE as i32);
    put_i32(&mut bytes, id.index() as i32);
    put_i32(&mut bytes, 0);
    put_i32(&mut bytes, payload.len() as i32);
    put_i32(&mut bytes, map_revision);
    bytes.extend_from_slice(payload);
    bytes
}

/// Raw bytes of a lump held by a [`LumpSet`], empty for other lumps
pub fn encode_lump(lumps: &LumpSet, id: LumpId) -> Vec<u8> {
    match id {
        LumpId::Entities => {
            if lumps.entities.is_empty() {
                Vec::new()
            } else {
                let mut text = lumps.entities.as_bytes().to_vec();
                text.push(0);
                text
            }
        }
        LumpId::Planes => encode_records(&lumps.planes),
        LumpId::Vertexes => encode_records(&lumps.vertices),
        LumpId::Edges => encode_records(&lumps.edges),
        LumpId::SurfEdges => encode_records(&lumps.surf_edges),
        LumpId::Nodes => encode_records(&lumps.nodes),
        LumpId::Leafs => encode_records(&lumps.leaves),
        LumpId::Faces => encode_records(&lumps.faces),
        LumpId::TexInfo => encode_records(&lumps.tex_infos),
        LumpId::Brushes => encode_records(&lumps.brushes),
        LumpId::BrushSides => encode_records(&lumps.brush_sides),
        LumpId::LeafFaces => encode_records(&lumps.leaf_faces),
        LumpId::LeafBrushes => encode_records(&lumps.leaf_brushes),
        _ => Vec::new(),
    }
}

/// A world split at y = 0 with one brush of `contents` filling y >= 0
///
/// Node 0 sends y >= 0 to leaf 1, which holds the brush, and y < 0 to the
/// empty leaf 0.
pub fn wall_lumps(contents: Contents) -> LumpSet {
    LumpSet {
        planes: vec![
            DPlane {
                normal: Vec3::Y,
                dist: 0.0,
                kind: 1,
            },
            DPlane {
                normal: Vec3::NEG_Y,
                dist: 0.0,
                kind: 1,
            },
        ],
        nodes: vec![DNode {
            plane_num: 0,
            children: [-2, -1],
            ..DNode::default()
        }],
        leaves: vec![
            DLeaf::default(),
            DLeaf {
                contents: contents.bits() as i32,
                first_leaf_brush: 0,
                num_leaf_brushes: 1,
                ..DLeaf::default()
            },
        ],
        brushes: vec![DBrush {
            first_side: 0,
            num_sides: 1,
            contents: contents.bits() as i32,
        }],
        brush_sides: vec![DBrushSide {
            plane_num: 1,
            ..DBrushSide::default()
        }],
        leaf_brushes: vec![0],
        ..LumpSet::default()
    }
}

/// Planes of [`wall_lumps`] moved so the wall starts at y = `offset`
pub fn shifted_wall_planes(offset: f32) -> Vec<DPlane> {
    vec![
        DPlane {
            normal: Vec3::Y,
            dist: offset,
            kind: 1,
        },
        DPlane {
            normal: Vec3::NEG_Y,
            dist: -offset,
            kind: 1,
        },
    ]
}

/// Planes of [`wall_lumps`] turned so the wall fills x >= `x`
///
/// Both planes change axis and the brush side faces -X, so the sign bits
/// differ from the unturned wall.
pub fn turned_wall_planes(x: f32) -> Vec<DPlane> {
    vec![
        DPlane {
            normal: Vec3::X,
            dist: x,
            kind: 0,
        },
        DPlane {
            normal: Vec3::NEG_X,
            dist: -x,
            kind: 0,
        },
    ]
}
