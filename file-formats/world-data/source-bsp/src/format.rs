//! Fixed-layout records stored in VBSP lumps
//!
//! Every record is little-endian and packed to the sizes the map compiler
//! writes. [`LumpElement`] decodes one record; whole lumps are decoded with
//! [`crate::lump::read_elements`].

use byteorder::{LittleEndian, ReadBytesExt};
use glam::Vec3;
use std::io::Read;

use crate::error::Result;

/// A record type stored back to back inside a lump
pub trait LumpElement: Sized {
    /// Size of one record on disk
    const SIZE: usize;

    /// Decode one record
    fn read<R: Read>(reader: &mut R) -> Result<Self>;
}

fn read_vec3<R: Read>(reader: &mut R) -> Result<Vec3> {
    let x = reader.read_f32::<LittleEndian>()?;
    let y = reader.read_f32::<LittleEndian>()?;
    let z = reader.read_f32::<LittleEndian>()?;
    Ok(Vec3::new(x, y, z))
}

fn read_i16x3<R: Read>(reader: &mut R) -> Result<[i16; 3]> {
    Ok([
        reader.read_i16::<LittleEndian>()?,
        reader.read_i16::<LittleEndian>()?,
        reader.read_i16::<LittleEndian>()?,
    ])
}

/// Vertex positions (`LUMP_VERTEXES`)
impl LumpElement for Vec3 {
    const SIZE: usize = 12;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        read_vec3(reader)
    }
}

/// Leaf face and leaf brush indices
impl LumpElement for u16 {
    const SIZE: usize = 2;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

/// Surface edge indices
impl LumpElement for i32 {
    const SIZE: usize = 4;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

/// Plane record (`dplane_t`)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DPlane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from the origin along the normal
    pub dist: f32,
    /// Axis type: 0..=2 axial X/Y/Z, 3..=5 nearest to X/Y/Z
    pub kind: i32,
}

impl LumpElement for DPlane {
    const SIZE: usize = 20;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            normal: read_vec3(reader)?,
            dist: reader.read_f32::<LittleEndian>()?,
            kind: reader.read_i32::<LittleEndian>()?,
        })
    }
}

/// Edge record (`dedge_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DEdge {
    /// Start and end vertex indices
    pub vertices: [u16; 2],
}

impl LumpElement for DEdge {
    const SIZE: usize = 4;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            vertices: [
                reader.read_u16::<LittleEndian>()?,
                reader.read_u16::<LittleEndian>()?,
            ],
        })
    }
}

/// Tree node record (`dnode_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DNode {
    /// Splitting plane index
    pub plane_num: i32,
    /// Front and back child; negative values encode leaf `-child - 1`
    pub children: [i32; 2],
    /// Bounding box minimum
    pub mins: [i16; 3],
    /// Bounding box maximum
    pub maxs: [i16; 3],
    /// First face on this node
    pub first_face: u16,
    /// Number of faces on this node
    pub num_faces: u16,
    /// Area index
    pub area: i16,
}

impl LumpElement for DNode {
    const SIZE: usize = 32;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let plane_num = reader.read_i32::<LittleEndian>()?;
        let children = [
            reader.read_i32::<LittleEndian>()?,
            reader.read_i32::<LittleEndian>()?,
        ];
        let mins = read_i16x3(reader)?;
        let maxs = read_i16x3(reader)?;
        let first_face = reader.read_u16::<LittleEndian>()?;
        let num_faces = reader.read_u16::<LittleEndian>()?;
        let area = reader.read_i16::<LittleEndian>()?;
        let _padding = reader.read_i16::<LittleEndian>()?;

        Ok(Self {
            plane_num,
            children,
            mins,
            maxs,
            first_face,
            num_faces,
            area,
        })
    }
}

/// Leaf record (`dleaf_t`, version 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DLeaf {
    /// Content flags
    pub contents: i32,
    /// Visibility cluster, -1 when outside the world
    pub cluster: i16,
    /// Packed area (low 9 bits) and flags (high 7 bits)
    pub area_flags: u16,
    /// Bounding box minimum
    pub mins: [i16; 3],
    /// Bounding box maximum
    pub maxs: [i16; 3],
    /// First entry in the leaf face array
    pub first_leaf_face: u16,
    /// Number of leaf faces
    pub num_leaf_faces: u16,
    /// First entry in the leaf brush array
    pub first_leaf_brush: u16,
    /// Number of leaf brushes
    pub num_leaf_brushes: u16,
    /// Leaf water data index, -1 for none
    pub leaf_water_data_id: i16,
}

impl DLeaf {
    /// Area index
    pub fn area(&self) -> u16 {
        self.area_flags & 0x1FF
    }

    /// Leaf flags
    pub fn flags(&self) -> u8 {
        (self.area_flags >> 9) as u8
    }
}

impl LumpElement for DLeaf {
    const SIZE: usize = 32;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let contents = reader.read_i32::<LittleEndian>()?;
        let cluster = reader.read_i16::<LittleEndian>()?;
        let area_flags = reader.read_u16::<LittleEndian>()?;
        let mins = read_i16x3(reader)?;
        let maxs = read_i16x3(reader)?;
        let first_leaf_face = reader.read_u16::<LittleEndian>()?;
        let num_leaf_faces = reader.read_u16::<LittleEndian>()?;
        let first_leaf_brush = reader.read_u16::<LittleEndian>()?;
        let num_leaf_brushes = reader.read_u16::<LittleEndian>()?;
        let leaf_water_data_id = reader.read_i16::<LittleEndian>()?;
        let _padding = reader.read_i16::<LittleEndian>()?;

        Ok(Self {
            contents,
            cluster,
            area_flags,
            mins,
            maxs,
            first_leaf_face,
            num_leaf_faces,
            first_leaf_brush,
            num_leaf_brushes,
            leaf_water_data_id,
        })
    }
}

/// Face record (`dface_t`)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DFace {
    /// Supporting plane index
    pub plane_num: u16,
    /// Set when the face points opposite to its plane
    pub side: u8,
    /// Set when the face lies on a node
    pub on_node: u8,
    /// First entry in the surface edge array
    pub first_edge: i32,
    /// Number of surface edges
    pub num_edges: i16,
    /// Texture info index; zero or negative faces are not drawn
    pub tex_info: i16,
    /// Displacement info index, -1 for none
    pub disp_info: i16,
    /// Fog volume id
    pub surface_fog_volume_id: i16,
    /// Light styles
    pub styles: [u8; 4],
    /// Byte offset into the lighting lump
    pub light_offset: i32,
    /// Face area in world units squared
    pub area: f32,
    /// Lightmap texture minimum, in luxels
    pub lightmap_mins: [i32; 2],
    /// Lightmap texture size, in luxels
    pub lightmap_size: [i32; 2],
    /// Original face this face was split from
    pub orig_face: i32,
    /// Number of primitives
    pub num_prims: u16,
    /// First primitive id
    pub first_prim_id: u16,
    /// Smoothing group mask
    pub smoothing_groups: u32,
}

impl LumpElement for DFace {
    const SIZE: usize = 56;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let plane_num = reader.read_u16::<LittleEndian>()?;
        let side = reader.read_u8()?;
        let on_node = reader.read_u8()?;
        let first_edge = reader.read_i32::<LittleEndian>()?;
        let num_edges = reader.read_i16::<LittleEndian>()?;
        let tex_info = reader.read_i16::<LittleEndian>()?;
        let disp_info = reader.read_i16::<LittleEndian>()?;
        let surface_fog_volume_id = reader.read_i16::<LittleEndian>()?;
        let mut styles = [0u8; 4];
        reader.read_exact(&mut styles)?;
        let light_offset = reader.read_i32::<LittleEndian>()?;
        let area = reader.read_f32::<LittleEndian>()?;
        let lightmap_mins = [
            reader.read_i32::<LittleEndian>()?,
            reader.read_i32::<LittleEndian>()?,
        ];
        let lightmap_size = [
            reader.read_i32::<LittleEndian>()?,
            reader.read_i32::<LittleEndian>()?,
        ];
        let orig_face = reader.read_i32::<LittleEndian>()?;
        let num_prims = reader.read_u16::<LittleEndian>()?;
        let first_prim_id = reader.read_u16::<LittleEndian>()?;
        let smoothing_groups = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            plane_num,
            side,
            on_node,
            first_edge,
            num_edges,
            tex_info,
            disp_info,
            surface_fog_volume_id,
            styles,
            light_offset,
            area,
            lightmap_mins,
            lightmap_size,
            orig_face,
            num_prims,
            first_prim_id,
            smoothing_groups,
        })
    }
}

/// Brush record (`dbrush_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DBrush {
    /// First brush side
    pub first_side: i32,
    /// Number of sides
    pub num_sides: i32,
    /// Content flags
    pub contents: i32,
}

impl LumpElement for DBrush {
    const SIZE: usize = 12;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            first_side: reader.read_i32::<LittleEndian>()?,
            num_sides: reader.read_i32::<LittleEndian>()?,
            contents: reader.read_i32::<LittleEndian>()?,
        })
    }
}

/// Brush side record (`dbrushside_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DBrushSide {
    /// Plane index, facing out of the brush
    pub plane_num: u16,
    /// Texture info index
    pub tex_info: i16,
    /// Displacement info index
    pub disp_info: i16,
    /// Non-zero for bevel planes, which never collide with rays
    pub bevel: u8,
    /// Non-zero for thin sides
    pub thin: u8,
}

impl LumpElement for DBrushSide {
    const SIZE: usize = 8;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            plane_num: reader.read_u16::<LittleEndian>()?,
            tex_info: reader.read_i16::<LittleEndian>()?,
            disp_info: reader.read_i16::<LittleEndian>()?,
            bevel: reader.read_u8()?,
            thin: reader.read_u8()?,
        })
    }
}

/// Texture projection record (`texinfo_t`)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexInfo {
    /// Texture S and T axes, xyz plus offset
    pub texture_vecs: [[f32; 4]; 2],
    /// Lightmap S and T axes, xyz plus offset
    pub lightmap_vecs: [[f32; 4]; 2],
    /// Surface flags
    pub flags: i32,
    /// Texture data index
    pub tex_data: i32,
}

impl LumpElement for TexInfo {
    const SIZE: usize = 72;

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut rows = [[0f32; 4]; 4];
        for row in &mut rows {
            for value in row.iter_mut() {
                *value = reader.read_f32::<LittleEndian>()?;
            }
        }

        Ok(Self {
            texture_vecs: [rows[0], rows[1]],
            lightmap_vecs: [rows[2], rows[3]],
            flags: reader.read_i32::<LittleEndian>()?,
            tex_data: reader.read_i32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::WriteRecord;
    use pretty_assertions::assert_eq;

    fn encoded_len<T: WriteRecord>(record: &T) -> usize {
        let mut buf = Vec::new();
        record.write_record(&mut buf);
        buf.len()
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(encoded_len(&DPlane::default()), DPlane::SIZE);
        assert_eq!(encoded_len(&DNode::default()), DNode::SIZE);
        assert_eq!(encoded_len(&DLeaf::default()), DLeaf::SIZE);
        assert_eq!(encoded_len(&DFace::default()), DFace::SIZE);
        assert_eq!(encoded_len(&DBrush::default()), DBrush::SIZE);
        assert_eq!(encoded_len(&DBrushSide::default()), DBrushSide::SIZE);
        assert_eq!(encoded_len(&TexInfo::default()), TexInfo::SIZE);
        assert_eq!(encoded_len(&DEdge::default()), DEdge::SIZE);
    }

    #[test]
    fn test_leaf_area_flags() {
        let leaf = DLeaf {
            area_flags: (0x55 << 9) | 0x1AB,
            ..DLeaf::default()
        };
        assert_eq!(leaf.area(), 0x1AB);
        assert_eq!(leaf.flags(), 0x55);
    }

    #[test]
    fn test_read_node() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&(-5i32).to_le_bytes());
        for v in [-16i16, -16, -16, 16, 16, 16] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&9i16.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);

        let node = DNode::read(&mut &bytes[..]).unwrap();
        assert_eq!(node.plane_num, 3);
        assert_eq!(node.children, [1, -5]);
        assert_eq!(node.mins, [-16, -16, -16]);
        assert_eq!(node.maxs, [16, 16, 16]);
        assert_eq!(node.first_face, 2);
        assert_eq!(node.num_faces, 4);
        assert_eq!(node.area, 9);
    }

    #[test]
    fn test_read_face_tail_fields() {
        let face = DFace {
            plane_num: 12,
            side: 1,
            first_edge: 40,
            num_edges: 4,
            tex_info: 3,
            disp_info: -1,
            area: 64.0,
            orig_face: 8,
            smoothing_groups: 0xDEAD_BEEF,
            ..DFace::default()
        };
        let mut bytes = Vec::new();
        face.write_record(&mut bytes);
        assert_eq!(DFace::read(&mut &bytes[..]).unwrap(), face);
    }
}
