//! Ray traces through the BSP tree
//!
//! A trace walks the segment down the tree front to back, splitting it at
//! every node plane it crosses. In each leaf the segment is clipped against
//! the leaf's brushes and, if nothing was hit yet, against the leaf's face
//! polygons. Because near children are visited first, the first blocking
//! surface along the ray fixes the fraction and farther geometry cannot
//! override it.

use glam::Vec3;

use crate::contents::Contents;
use crate::geometry::{BspGeometry, ChildRef, DEFAULT_MAX_DEPTH, Polygon};

/// Tolerance used when clipping against brush planes
pub const DIST_EPSILON: f32 = 0.03125;

/// Tolerance used when splitting a segment at a node plane
const SPLIT_EPSILON: f32 = f32::EPSILON;

/// Enter fraction of a brush no plane was entered through
const NEVER_ENTERED: f32 = -99.0;

/// Result of tracing a segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TraceResult {
    /// The whole segment lies inside solid
    pub all_solid: bool,
    /// The segment starts inside solid
    pub start_solid: bool,
    /// Fraction of the segment travelled before the hit, 1.0 when clear
    pub fraction: f32,
    /// Fraction at which the segment leaves the solid it started in
    pub fraction_left_solid: f32,
    /// Position reached
    pub end_pos: Vec3,
    /// Contents of the hit brush
    pub contents: Contents,
    /// Brush that stopped the segment
    pub brush: Option<usize>,
}

impl TraceResult {
    /// Result for a segment nothing blocks
    pub fn unobstructed(destination: Vec3) -> Self {
        Self {
            all_solid: false,
            start_solid: false,
            fraction: 1.0,
            fraction_left_solid: 0.0,
            end_pos: destination,
            contents: Contents::empty(),
            brush: None,
        }
    }

    /// Whether something blocked the segment
    pub fn is_blocked(&self) -> bool {
        self.fraction < 1.0
    }
}

impl BspGeometry {
    /// Trace a segment against everything that blocks shots
    pub fn trace_ray(&self, origin: Vec3, destination: Vec3) -> TraceResult {
        self.trace_ray_with_mask(origin, destination, Contents::MASK_SHOT_HULL)
    }

    /// Trace a segment against brushes whose contents intersect `mask`
    pub fn trace_ray_with_mask(
        &self,
        origin: Vec3,
        destination: Vec3,
        mask: Contents,
    ) -> TraceResult {
        self.trace_with_limit(origin, destination, mask, DEFAULT_MAX_DEPTH)
    }

    /// Whether nothing blocks the segment between two points
    pub fn is_visible(&self, origin: Vec3, destination: Vec3) -> bool {
        !self.trace_ray(origin, destination).is_blocked()
    }

    pub(crate) fn trace_with_limit(
        &self,
        origin: Vec3,
        destination: Vec3,
        mask: Contents,
        max_depth: usize,
    ) -> TraceResult {
        if self.nodes.is_empty() {
            return TraceResult::unobstructed(destination);
        }

        let mut tracer = Tracer {
            geometry: self,
            start: origin,
            end: destination,
            mask,
            max_depth,
            depth_exceeded: false,
            trace: TraceResult::unobstructed(destination),
        };
        tracer.cast_node(ChildRef::Node(0), 0.0, 1.0, origin, destination, 0);

        let mut trace = tracer.trace;
        trace.end_pos = if trace.fraction == 1.0 {
            destination
        } else {
            origin + (destination - origin) * trace.fraction
        };
        trace
    }
}

struct Tracer<'a> {
    geometry: &'a BspGeometry,
    start: Vec3,
    end: Vec3,
    mask: Contents,
    max_depth: usize,
    depth_exceeded: bool,
    trace: TraceResult,
}

impl Tracer<'_> {
    fn cast_node(
        &mut self,
        child: ChildRef,
        start_fraction: f32,
        end_fraction: f32,
        origin: Vec3,
        destination: Vec3,
        depth: usize,
    ) {
        if self.trace.fraction <= start_fraction {
            return;
        }

        if depth > self.max_depth {
            if !self.depth_exceeded {
                log::warn!("Trace exceeded the depth limit of {} nodes", self.max_depth);
                self.depth_exceeded = true;
            }
            return;
        }

        let index = match child {
            ChildRef::Leaf(leaf) => {
                self.cast_leaf(leaf, start_fraction, end_fraction, origin, destination);
                return;
            }
            ChildRef::Node(index) => index,
        };

        let geometry = self.geometry;
        let Some(node) = geometry.nodes.get(index) else {
            return;
        };
        let Some(plane) = node.plane.and_then(|p| geometry.planes.get(p)) else {
            return;
        };

        let start_distance = plane.split_distance(origin);
        let end_distance = plane.split_distance(destination);

        if start_distance >= 0.0 && end_distance >= 0.0 {
            self.cast_node(
                node.children[0],
                start_fraction,
                end_fraction,
                origin,
                destination,
                depth + 1,
            );
            return;
        }
        if start_distance < 0.0 && end_distance < 0.0 {
            self.cast_node(
                node.children[1],
                start_fraction,
                end_fraction,
                origin,
                destination,
                depth + 1,
            );
            return;
        }

        let (side, first, second) = if start_distance < end_distance {
            let inverse = 1.0 / (start_distance - end_distance);
            let fraction = (start_distance + SPLIT_EPSILON) * inverse;
            (1, fraction, fraction)
        } else if end_distance < start_distance {
            let inverse = 1.0 / (start_distance - end_distance);
            (
                0,
                (start_distance + SPLIT_EPSILON) * inverse,
                (start_distance - SPLIT_EPSILON) * inverse,
            )
        } else {
            (0, 1.0, 0.0)
        };
        let first = first.clamp(0.0, 1.0);
        let second = second.clamp(0.0, 1.0);

        let middle_fraction = start_fraction + (end_fraction - start_fraction) * first;
        let middle = origin + (destination - origin) * first;
        self.cast_node(
            node.children[side],
            start_fraction,
            middle_fraction,
            origin,
            middle,
            depth + 1,
        );

        let middle_fraction = start_fraction + (end_fraction - start_fraction) * second;
        let middle = origin + (destination - origin) * second;
        self.cast_node(
            node.children[side ^ 1],
            middle_fraction,
            end_fraction,
            middle,
            destination,
            depth + 1,
        );
    }

    fn cast_leaf(
        &mut self,
        leaf: usize,
        start_fraction: f32,
        end_fraction: f32,
        origin: Vec3,
        destination: Vec3,
    ) {
        let geometry = self.geometry;
        let Some(leaf) = geometry.leaves.get(leaf) else {
            return;
        };

        for &brush in &geometry.leaf_brushes[leaf.leaf_brushes.clone()] {
            let brush = brush as usize;
            let Some(contents) = geometry.brushes.get(brush).map(|b| b.contents) else {
                continue;
            };
            if !contents.intersects(self.mask) {
                continue;
            }

            self.clip_brush(brush);
            if self.trace.fraction == 0.0 {
                return;
            }
        }

        if self.trace.start_solid || self.trace.fraction < 1.0 {
            return;
        }

        for &face in &geometry.leaf_faces[leaf.leaf_faces.clone()] {
            if let Some(polygon) = geometry.polygon(face as usize) {
                self.clip_surface(polygon, start_fraction, end_fraction, origin, destination);
            }
        }
    }

    /// Clip the whole traced segment against one brush
    fn clip_brush(&mut self, index: usize) {
        let geometry = self.geometry;
        let brush = &geometry.brushes[index];
        if brush.sides.is_empty() {
            return;
        }

        let mut enter = NEVER_ENTERED;
        let mut leave = 1.0f32;
        let mut starts_out = false;
        let mut ends_out = false;

        for side in &geometry.brush_sides[brush.sides.clone()] {
            if side.bevel {
                continue;
            }
            let Some(plane) = geometry.planes.get(side.plane) else {
                continue;
            };

            let start_distance = plane.distance(self.start);
            let end_distance = plane.distance(self.end);

            if start_distance > 0.0 {
                starts_out = true;
                if end_distance > 0.0 {
                    // Entirely in front of one side, so outside the brush
                    return;
                }
            } else {
                if end_distance <= 0.0 {
                    continue;
                }
                ends_out = true;
            }

            if start_distance > end_distance {
                let fraction =
                    (start_distance - DIST_EPSILON).max(0.0) / (start_distance - end_distance);
                enter = enter.max(fraction);
            } else {
                let fraction = (start_distance + DIST_EPSILON) / (start_distance - end_distance);
                leave = leave.min(fraction);
            }
        }

        if starts_out && self.trace.fraction_left_solid - enter > 0.0 {
            starts_out = false;
        }

        let trace = &mut self.trace;
        if !starts_out {
            trace.start_solid = true;
            trace.contents = brush.contents;

            if !ends_out {
                trace.all_solid = true;
                trace.fraction = 0.0;
                trace.fraction_left_solid = 1.0;
            } else if leave != 1.0 && leave > trace.fraction_left_solid {
                trace.fraction_left_solid = leave;
                if trace.fraction <= leave {
                    trace.fraction = 1.0;
                }
            }
            return;
        }

        if enter < leave && enter > NEVER_ENTERED && enter < trace.fraction {
            trace.fraction = enter.max(0.0);
            trace.brush = Some(index);
            trace.contents = brush.contents;
        }
    }

    /// Test the sub-segment `origin..destination` against a face polygon
    fn clip_surface(
        &mut self,
        polygon: &Polygon,
        start_fraction: f32,
        end_fraction: f32,
        origin: Vec3,
        destination: Vec3,
    ) {
        let plane = polygon.plane();
        let start_distance = plane.distance(origin);
        let end_distance = plane.distance(destination);

        if (start_distance > 0.0) == (end_distance > 0.0) {
            return;
        }
        // Only front to back crossings hit a face
        if start_distance - end_distance < DIST_EPSILON {
            return;
        }

        let t = start_distance / (start_distance - end_distance);
        if t <= 0.0 {
            return;
        }

        let intersection = origin + (destination - origin) * t;
        if !polygon.contains(intersection) {
            return;
        }

        let fraction = start_fraction + (end_fraction - start_fraction) * t;
        if fraction < self.trace.fraction {
            self.trace.fraction = fraction;
            self.trace.end_pos = intersection;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DEdge, DFace, DLeaf, DNode, DPlane};
    use crate::lump::LumpSet;
    use crate::test_utils::wall_lumps;

    fn wall(brush_contents: Contents) -> BspGeometry {
        BspGeometry::build(&wall_lumps(brush_contents))
    }

    #[test]
    fn test_crossing_solid_wall() {
        let geometry = wall(Contents::SOLID);
        let trace = geometry.trace_ray(Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0));

        assert!(trace.fraction > 0.0 && trace.fraction < 1.0);
        assert!(!trace.start_solid);
        assert!(!trace.all_solid);
        assert_eq!(trace.brush, Some(0));
        assert_eq!(trace.contents, Contents::SOLID);

        let expected = (10.0 - DIST_EPSILON) / 20.0;
        assert!((trace.fraction - expected).abs() < 1e-6);
        assert!((trace.end_pos.y - (-10.0 + 20.0 * expected)).abs() < 1e-4);
        assert!(!geometry.is_visible(Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0)));
    }

    #[test]
    fn test_empty_contents_do_not_block() {
        let geometry = wall(Contents::empty());
        let trace = geometry.trace_ray(Vec3::new(0.0, -10.0, 0.0), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(trace.fraction, 1.0);
        assert_eq!(trace.brush, None);
        assert_eq!(trace.end_pos, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_masked_out_brushes_do_not_block() {
        let geometry = wall(Contents::PLAYERCLIP);
        let from = Vec3::new(0.0, -10.0, 0.0);
        let to = Vec3::new(0.0, 10.0, 0.0);
        assert!(geometry.is_visible(from, to));

        let trace = geometry.trace_ray_with_mask(from, to, Contents::MASK_PLAYER_SOLID);
        assert!(trace.is_blocked());
    }

    #[test]
    fn test_segment_in_front_of_wall_is_clear() {
        let geometry = wall(Contents::SOLID);
        let trace = geometry.trace_ray(Vec3::new(-5.0, -10.0, 3.0), Vec3::new(5.0, -1.0, 3.0));
        assert_eq!(trace.fraction, 1.0);
        assert!(!trace.start_solid);
    }

    #[test]
    fn test_start_inside_solid() {
        let geometry = wall(Contents::SOLID);

        let trace = geometry.trace_ray(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 9.0, 0.0));
        assert!(trace.all_solid);
        assert!(trace.start_solid);
        assert_eq!(trace.fraction, 0.0);
        assert_eq!(trace.fraction_left_solid, 1.0);

        // Leaving the solid clears the block
        let trace = geometry.trace_ray(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -5.0, 0.0));
        assert!(trace.start_solid);
        assert!(!trace.all_solid);
        assert_eq!(trace.fraction, 1.0);
        assert!(trace.fraction_left_solid > 0.0 && trace.fraction_left_solid < 1.0);
    }

    #[test]
    fn test_empty_geometry_is_clear() {
        let geometry = BspGeometry::default();
        let to = Vec3::new(1.0, 2.0, 3.0);
        let trace = geometry.trace_ray(Vec3::ZERO, to);
        assert_eq!(trace, TraceResult::unobstructed(to));
    }

    #[test]
    fn test_depth_guard_stops_cycles() {
        let mut lumps = wall_lumps(Contents::SOLID);
        // Node 0 points back at itself on the front side
        lumps.nodes[0].children = [0, -1];
        let geometry = BspGeometry::build(&lumps);

        let trace = geometry.trace_with_limit(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Contents::MASK_SHOT_HULL,
            16,
        );
        assert_eq!(trace.fraction, 1.0);
    }

    /// Empty world split at z = 0 with a textured 8x8 floor quad on the plane
    fn floor_lumps() -> LumpSet {
        LumpSet {
            planes: vec![DPlane {
                normal: Vec3::Z,
                dist: 0.0,
                kind: 2,
            }],
            vertices: vec![
                Vec3::new(-4.0, -4.0, 0.0),
                Vec3::new(-4.0, 4.0, 0.0),
                Vec3::new(4.0, 4.0, 0.0),
                Vec3::new(4.0, -4.0, 0.0),
            ],
            edges: vec![
                DEdge { vertices: [0, 0] },
                DEdge { vertices: [0, 1] },
                DEdge { vertices: [1, 2] },
                DEdge { vertices: [2, 3] },
                DEdge { vertices: [3, 0] },
            ],
            surf_edges: vec![1, 2, 3, 4],
            faces: vec![DFace {
                plane_num: 0,
                first_edge: 0,
                num_edges: 4,
                tex_info: 1,
                ..DFace::default()
            }],
            nodes: vec![DNode {
                plane_num: 0,
                children: [-1, -2],
                ..DNode::default()
            }],
            leaves: vec![
                DLeaf {
                    first_leaf_face: 0,
                    num_leaf_faces: 1,
                    ..DLeaf::default()
                },
                DLeaf::default(),
            ],
            leaf_faces: vec![0],
            ..LumpSet::default()
        }
    }

    #[test]
    fn test_surface_hit_from_front() {
        let geometry = BspGeometry::build(&floor_lumps());
        let trace = geometry.trace_ray(Vec3::new(1.0, 1.0, 10.0), Vec3::new(1.0, 1.0, -10.0));

        assert!(trace.is_blocked());
        assert!((trace.fraction - 0.5).abs() < 1e-4);
        assert!(trace.end_pos.z.abs() < 1e-3);
        assert_eq!(trace.brush, None);
    }

    #[test]
    fn test_surface_miss_outside_polygon_and_from_behind() {
        let geometry = BspGeometry::build(&floor_lumps());

        let outside = geometry.trace_ray(Vec3::new(6.0, 0.0, 10.0), Vec3::new(6.0, 0.0, -10.0));
        assert_eq!(outside.fraction, 1.0);

        let behind = geometry.trace_ray(Vec3::new(1.0, 1.0, -10.0), Vec3::new(1.0, 1.0, 10.0));
        assert_eq!(behind.fraction, 1.0);
    }
}
