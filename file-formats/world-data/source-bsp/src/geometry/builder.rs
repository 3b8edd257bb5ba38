//! Conversion of raw lump records into [`BspGeometry`]

use std::ops::Range;

use super::plane::Plane;
use super::polygon::{MAX_SURFINFO_VERTS, Polygon};
use super::tree::{Brush, BrushSide, ChildRef, Leaf, Node};
use super::BspGeometry;
use crate::contents::Contents;
use crate::error::{Error, Result};
use crate::format::{DBrush, DFace, DLeaf, DNode};
use crate::lump::LumpSet;

/// Counters describing how much of a map survived the build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Faces that produced a polygon
    pub polygons: usize,
    /// Faces dropped because of bad references
    pub skipped_faces: usize,
    /// Nodes made inert because of bad references
    pub inert_nodes: usize,
    /// Leaves or brushes whose index ranges were cut to fit their arrays
    pub clamped_ranges: usize,
    /// Brushes made inert because a side referenced a missing plane
    pub inert_brushes: usize,
}

impl BspGeometry {
    /// Build the geometry from decoded lumps
    ///
    /// Bad cross references never fail the build: the offending element is
    /// logged, counted in [`BspGeometry::stats`] and left out of queries.
    pub fn build(lumps: &LumpSet) -> Self {
        let mut stats = BuildStats::default();

        let planes: Vec<Plane> = lumps.planes.iter().map(Plane::from_record).collect();

        let nodes = lumps
            .nodes
            .iter()
            .enumerate()
            .map(|(index, raw)| build_node(index, raw, lumps, &mut stats))
            .collect();

        let leaves = lumps
            .leaves
            .iter()
            .enumerate()
            .map(|(index, raw)| build_leaf(index, raw, lumps, &mut stats))
            .collect();

        let brush_sides: Vec<BrushSide> = lumps
            .brush_sides
            .iter()
            .map(|raw| BrushSide {
                plane: raw.plane_num as usize,
                tex_info: raw.tex_info,
                disp_info: raw.disp_info,
                bevel: raw.bevel != 0,
                thin: raw.thin != 0,
            })
            .collect();

        let brushes = lumps
            .brushes
            .iter()
            .enumerate()
            .map(|(index, raw)| build_brush(index, raw, &brush_sides, planes.len(), &mut stats))
            .collect();

        let mut polygons = Vec::with_capacity(lumps.faces.len());
        for (index, face) in lumps.faces.iter().enumerate() {
            match build_polygon(face, lumps, &planes) {
                Ok(Some(polygon)) => {
                    stats.polygons += 1;
                    polygons.push(Some(polygon));
                }
                Ok(None) => polygons.push(None),
                Err(e) => {
                    log::warn!("Skipping face {}: {}", index, e);
                    stats.skipped_faces += 1;
                    polygons.push(None);
                }
            }
        }

        log::debug!(
            "Built geometry: {} planes, {} nodes, {} leaves, {} brushes, {} polygons",
            planes.len(),
            lumps.nodes.len(),
            lumps.leaves.len(),
            lumps.brushes.len(),
            stats.polygons
        );

        Self {
            planes,
            nodes,
            leaves,
            brushes,
            brush_sides,
            leaf_faces: lumps.leaf_faces.clone(),
            leaf_brushes: lumps.leaf_brushes.clone(),
            faces: lumps.faces.clone(),
            tex_infos: lumps.tex_infos.clone(),
            polygons,
            stats,
        }
    }
}

fn build_node(index: usize, raw: &DNode, lumps: &LumpSet, stats: &mut BuildStats) -> Node {
    let children = raw.children.map(ChildRef::from_raw);

    let plane = check_index("plane", i64::from(raw.plane_num), lumps.planes.len());
    let children_valid = children.iter().try_for_each(|child| match *child {
        ChildRef::Node(n) => check_index("node", n as i64, lumps.nodes.len()).map(drop),
        ChildRef::Leaf(l) => check_index("leaf", l as i64, lumps.leaves.len()).map(drop),
    });

    let plane = match plane.and_then(|p| children_valid.map(|()| p)) {
        Ok(p) => Some(p),
        Err(e) => {
            log::warn!("Node {} is unusable: {}", index, e);
            stats.inert_nodes += 1;
            None
        }
    };

    Node {
        plane,
        children,
        mins: raw.mins,
        maxs: raw.maxs,
        first_face: raw.first_face,
        num_faces: raw.num_faces,
    }
}

fn build_leaf(index: usize, raw: &DLeaf, lumps: &LumpSet, stats: &mut BuildStats) -> Leaf {
    let leaf_faces = clamp_range(
        i64::from(raw.first_leaf_face),
        i64::from(raw.num_leaf_faces),
        lumps.leaf_faces.len(),
    );
    let leaf_brushes = clamp_range(
        i64::from(raw.first_leaf_brush),
        i64::from(raw.num_leaf_brushes),
        lumps.leaf_brushes.len(),
    );

    if leaf_faces.len() != raw.num_leaf_faces as usize
        || leaf_brushes.len() != raw.num_leaf_brushes as usize
    {
        log::warn!("Leaf {} references indices past the end of its arrays", index);
        stats.clamped_ranges += 1;
    }

    Leaf {
        contents: Contents::from_raw(raw.contents),
        cluster: raw.cluster,
        area: raw.area(),
        flags: raw.flags(),
        mins: raw.mins,
        maxs: raw.maxs,
        leaf_faces,
        leaf_brushes,
    }
}

fn build_brush(
    index: usize,
    raw: &DBrush,
    sides: &[BrushSide],
    plane_count: usize,
    stats: &mut BuildStats,
) -> Brush {
    let mut range = clamp_range(i64::from(raw.first_side), i64::from(raw.num_sides), sides.len());
    if range.len() as i64 != i64::from(raw.num_sides) {
        log::warn!("Brush {} references sides past the end of the array", index);
        stats.clamped_ranges += 1;
    }

    if let Some(side) = sides[range.clone()]
        .iter()
        .find(|side| side.plane >= plane_count)
    {
        log::warn!(
            "Brush {} is unusable: side plane {} out of {}",
            index,
            side.plane,
            plane_count
        );
        stats.inert_brushes += 1;
        range = range.start..range.start;
    }

    Brush {
        sides: range,
        contents: Contents::from_raw(raw.contents),
    }
}

/// Build the polygon of a face
///
/// Returns `Ok(None)` for faces that are not drawn or have an unusable edge
/// count, and an error for faces that reference missing data.
fn build_polygon(face: &DFace, lumps: &LumpSet, planes: &[Plane]) -> Result<Option<Polygon>> {
    let num_edges = face.num_edges as usize;
    if face.num_edges < 3 || num_edges > MAX_SURFINFO_VERTS || face.tex_info <= 0 {
        return Ok(None);
    }

    let mut vertices = Vec::with_capacity(num_edges);
    for i in 0..num_edges {
        let surf_index = i64::from(face.first_edge) + i as i64;
        let surf_index = check_index("surface edge", surf_index, lumps.surf_edges.len())?;
        let surf_edge = lumps.surf_edges[surf_index];

        // Negative surface edges walk the edge backwards
        let edge_index = check_index("edge", i64::from(surf_edge).abs(), lumps.edges.len())?;
        let edge = &lumps.edges[edge_index];
        let vertex = if surf_edge >= 0 {
            edge.vertices[0]
        } else {
            edge.vertices[1]
        };

        let vertex = check_index("vertex", i64::from(vertex), lumps.vertices.len())?;
        vertices.push(lumps.vertices[vertex]);
    }

    let plane_index = check_index("plane", i64::from(face.plane_num), planes.len())?;
    let plane = planes[plane_index];
    let plane = if face.side == 0 {
        plane
    } else {
        plane.flipped()
    };

    Ok(Some(Polygon::new(vertices, plane)))
}

fn check_index(kind: &'static str, index: i64, max: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < max)
        .ok_or(Error::InvalidReference { kind, index, max })
}

fn clamp_range(first: i64, count: i64, len: usize) -> Range<usize> {
    let len = len as i64;
    let start = first.clamp(0, len);
    let end = first.saturating_add(count.max(0)).clamp(start, len);
    start as usize..end as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DBrushSide, DEdge, DPlane};
    use glam::Vec3;
    use pretty_assertions::assert_eq;

    fn quad_lumps() -> LumpSet {
        LumpSet {
            planes: vec![DPlane {
                normal: Vec3::Z,
                dist: 0.0,
                kind: 2,
            }],
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 8.0, 0.0),
                Vec3::new(8.0, 8.0, 0.0),
                Vec3::new(8.0, 0.0, 0.0),
            ],
            edges: vec![
                DEdge { vertices: [0, 0] },
                DEdge { vertices: [0, 1] },
                DEdge { vertices: [1, 2] },
                DEdge { vertices: [3, 2] },
                DEdge { vertices: [3, 0] },
            ],
            surf_edges: vec![1, 2, -3, 4],
            faces: vec![DFace {
                plane_num: 0,
                first_edge: 0,
                num_edges: 4,
                tex_info: 1,
                ..DFace::default()
            }],
            ..LumpSet::default()
        }
    }

    #[test]
    fn test_polygon_walks_signed_edges() {
        let geometry = BspGeometry::build(&quad_lumps());
        let polygon = geometry.polygon(0).unwrap();
        assert_eq!(
            polygon.vertices(),
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 8.0, 0.0),
                Vec3::new(8.0, 8.0, 0.0),
                Vec3::new(8.0, 0.0, 0.0),
            ]
        );
        assert_eq!(polygon.plane().normal, Vec3::Z);
        assert_eq!(geometry.stats().polygons, 1);
    }

    #[test]
    fn test_faces_without_texinfo_or_with_bad_counts_are_dropped() {
        for (tex_info, num_edges) in [(0, 4), (-1, 4), (1, 2), (1, 33)] {
            let mut lumps = quad_lumps();
            lumps.faces[0].tex_info = tex_info;
            lumps.faces[0].num_edges = num_edges;
            let geometry = BspGeometry::build(&lumps);
            assert!(geometry.polygon(0).is_none());
            assert_eq!(geometry.stats().skipped_faces, 0);
        }
    }

    #[test]
    fn test_bad_face_references_are_skipped() {
        let mut lumps = quad_lumps();
        lumps.surf_edges[2] = 40;
        let mut second = lumps.faces[0];
        second.plane_num = 0;
        lumps.faces.push(second);
        lumps.faces[0].first_edge = 0;

        let geometry = BspGeometry::build(&lumps);
        assert_eq!(geometry.polygons().len(), 2);
        assert!(geometry.polygon(0).is_none());
        assert_eq!(geometry.stats().skipped_faces, 2);

        let mut lumps = quad_lumps();
        lumps.faces[0].plane_num = 9;
        assert!(BspGeometry::build(&lumps).polygon(0).is_none());
    }

    #[test]
    fn test_side_flag_flips_polygon_plane() {
        let mut lumps = quad_lumps();
        lumps.faces[0].side = 1;
        let geometry = BspGeometry::build(&lumps);
        assert_eq!(geometry.polygon(0).unwrap().plane().normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_node_children_and_inert_nodes() {
        let mut lumps = quad_lumps();
        lumps.leaves = vec![DLeaf::default(), DLeaf::default()];
        lumps.nodes = vec![
            DNode {
                plane_num: 0,
                children: [1, -2],
                ..DNode::default()
            },
            DNode {
                plane_num: 0,
                children: [-1, -3],
                ..DNode::default()
            },
        ];

        let geometry = BspGeometry::build(&lumps);
        let root = geometry.node(0).unwrap();
        assert_eq!(root.plane, Some(0));
        assert_eq!(root.children, [ChildRef::Node(1), ChildRef::Leaf(1)]);

        // Leaf 2 does not exist
        assert_eq!(geometry.node(1).unwrap().plane, None);
        assert_eq!(geometry.stats().inert_nodes, 1);
    }

    #[test]
    fn test_ranges_are_clamped() {
        let mut lumps = quad_lumps();
        lumps.leaf_brushes = vec![0, 0];
        lumps.leaves = vec![DLeaf {
            first_leaf_brush: 1,
            num_leaf_brushes: 5,
            ..DLeaf::default()
        }];
        lumps.brush_sides = vec![
            DBrushSide::default(),
            DBrushSide {
                plane_num: 7,
                ..DBrushSide::default()
            },
        ];
        lumps.brushes = vec![
            DBrush {
                first_side: 0,
                num_sides: 1,
                contents: 1,
            },
            DBrush {
                first_side: 0,
                num_sides: 2,
                contents: 1,
            },
            DBrush {
                first_side: -4,
                num_sides: 2,
                contents: 1,
            },
        ];

        let geometry = BspGeometry::build(&lumps);
        assert_eq!(geometry.leaf(0).unwrap().leaf_brushes, 1..2);
        assert_eq!(geometry.brushes()[0].sides, 0..1);
        assert!(geometry.brushes()[1].sides.is_empty());
        assert!(geometry.brushes()[2].sides.is_empty());
        assert_eq!(geometry.stats().inert_brushes, 1);
        assert_eq!(geometry.stats().clamped_ranges, 2);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(2, 3, 10), 2..5);
        assert_eq!(clamp_range(8, 5, 10), 8..10);
        assert_eq!(clamp_range(-3, 5, 10), 0..2);
        assert_eq!(clamp_range(12, 1, 10), 10..10);
        assert_eq!(clamp_range(0, -1, 10), 0..0);
    }
}
