//! Face polygons used for surface hits

use glam::Vec3;
use std::sync::OnceLock;

use super::plane::Plane;

/// Largest winding a face may have and still produce a polygon
pub const MAX_SURFINFO_VERTS: usize = 32;

/// Convex face winding with its supporting plane
#[derive(Debug)]
pub struct Polygon {
    vertices: Vec<Vec3>,
    plane: Plane,
    edge_planes: OnceLock<Vec<Plane>>,
}

impl Polygon {
    /// Create a polygon from an ordered winding
    pub fn new(vertices: Vec<Vec3>, plane: Plane) -> Self {
        Self {
            vertices,
            plane,
            edge_planes: OnceLock::new(),
        }
    }

    /// Winding vertices
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Supporting plane
    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Planes through each edge, perpendicular to the face, facing inwards
    ///
    /// Built on first use. Zero-length edges contribute no plane.
    pub fn edge_planes(&self) -> &[Plane] {
        self.edge_planes.get_or_init(|| self.build_edge_planes())
    }

    /// Whether a point on the supporting plane lies inside the winding
    pub fn contains(&self, point: Vec3) -> bool {
        self.edge_planes()
            .iter()
            .all(|edge| edge.distance(point) >= 0.0)
    }

    fn build_edge_planes(&self) -> Vec<Plane> {
        let count = self.vertices.len();
        if count == 0 {
            return Vec::new();
        }

        let centroid = self.vertices.iter().copied().sum::<Vec3>() / count as f32;

        let mut planes = Vec::with_capacity(count);
        for (i, &start) in self.vertices.iter().enumerate() {
            let end = self.vertices[(i + 1) % count];
            let normal = (end - start).cross(self.plane.normal).normalize_or_zero();
            if normal == Vec3::ZERO {
                continue;
            }

            let edge = Plane::new(normal, normal.dot(start));
            // Orientation follows the winding; flip so the interior is in front
            if edge.distance(centroid) < 0.0 {
                planes.push(edge.flipped());
            } else {
                planes.push(edge);
            }
        }
        planes
    }
}

impl Clone for Polygon {
    fn clone(&self) -> Self {
        Self::new(self.vertices.clone(), self.plane)
    }
}
