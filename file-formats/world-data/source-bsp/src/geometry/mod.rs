//! Cross-referenced collision geometry
//!
//! [`BspGeometry`] is built from a [`crate::lump::LumpSet`] in one pass.
//! Every reference between arrays is an index, so a rebuilt geometry never
//! shares state with the one it replaces.

mod builder;
mod plane;
mod polygon;
mod tree;

pub use builder::BuildStats;
pub use plane::{
    PLANE_ANY_X, PLANE_ANY_Y, PLANE_ANY_Z, PLANE_X, PLANE_Y, PLANE_Z, Plane, signbits_for,
};
pub use polygon::{MAX_SURFINFO_VERTS, Polygon};
pub use tree::{Brush, BrushSide, ChildRef, Leaf, Node};

use glam::Vec3;

use crate::contents::Contents;
use crate::format::{DFace, TexInfo};

/// Deepest descent allowed when walking the tree
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Collision geometry of one map
#[derive(Debug, Clone, Default)]
pub struct BspGeometry {
    pub(crate) planes: Vec<Plane>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) brushes: Vec<Brush>,
    pub(crate) brush_sides: Vec<BrushSide>,
    pub(crate) leaf_faces: Vec<u16>,
    pub(crate) leaf_brushes: Vec<u16>,
    pub(crate) faces: Vec<DFace>,
    pub(crate) tex_infos: Vec<TexInfo>,
    pub(crate) polygons: Vec<Option<Polygon>>,
    pub(crate) stats: BuildStats,
}

impl BspGeometry {
    /// All planes
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// All nodes; node 0 is the root
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All leaves
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// All brushes
    pub fn brushes(&self) -> &[Brush] {
        &self.brushes
    }

    /// All brush sides
    pub fn brush_sides(&self) -> &[BrushSide] {
        &self.brush_sides
    }

    /// Face records as stored in the map
    pub fn faces(&self) -> &[DFace] {
        &self.faces
    }

    /// Texture info records
    pub fn tex_infos(&self) -> &[TexInfo] {
        &self.tex_infos
    }

    /// Polygon for a face index, if the face takes part in surface hits
    pub fn polygon(&self, face: usize) -> Option<&Polygon> {
        self.polygons.get(face).and_then(Option::as_ref)
    }

    /// Polygons indexed by face
    pub fn polygons(&self) -> &[Option<Polygon>] {
        &self.polygons
    }

    /// Counters collected while building
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Look up a node
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Look up a leaf
    pub fn leaf(&self, index: usize) -> Option<&Leaf> {
        self.leaves.get(index)
    }

    /// Whether the geometry holds no tree
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the leaf containing a point
    ///
    /// Points exactly on a splitting plane fall to the front child.
    pub fn leaf_at(&self, point: Vec3) -> Option<usize> {
        self.leaf_at_with_limit(point, DEFAULT_MAX_DEPTH)
    }

    /// Find the leaf containing a point, descending at most `max_depth` nodes
    pub fn leaf_at_with_limit(&self, point: Vec3, max_depth: usize) -> Option<usize> {
        let mut index = 0;
        for _ in 0..max_depth {
            let node = self.nodes.get(index)?;
            let plane = self.planes.get(node.plane?)?;
            let side = usize::from(plane.split_distance(point) < 0.0);
            match node.children[side] {
                ChildRef::Node(next) => index = next,
                ChildRef::Leaf(leaf) => return (leaf < self.leaves.len()).then_some(leaf),
            }
        }
        log::warn!("Tree deeper than {} nodes, giving up point lookup", max_depth);
        None
    }

    /// Content flags of the leaf containing a point
    ///
    /// Points that resolve to no leaf are reported as solid.
    pub fn point_contents(&self, point: Vec3) -> Contents {
        self.point_contents_with_limit(point, DEFAULT_MAX_DEPTH)
    }

    /// Content flags of the leaf containing a point, with a descent limit
    pub fn point_contents_with_limit(&self, point: Vec3, max_depth: usize) -> Contents {
        self.leaf_at_with_limit(point, max_depth)
            .and_then(|leaf| self.leaves.get(leaf))
            .map_or(Contents::SOLID, |leaf| leaf.contents)
    }
}
