//! Planes with cached axis type and sign bits

use glam::Vec3;

use crate::format::DPlane;

/// Plane type for planes perpendicular to the X axis
pub const PLANE_X: u8 = 0;
/// Plane type for planes perpendicular to the Y axis
pub const PLANE_Y: u8 = 1;
/// Plane type for planes perpendicular to the Z axis
pub const PLANE_Z: u8 = 2;
/// Non-axial plane whose normal is nearest to the X axis
pub const PLANE_ANY_X: u8 = 3;
/// Non-axial plane whose normal is nearest to the Y axis
pub const PLANE_ANY_Y: u8 = 4;
/// Non-axial plane whose normal is nearest to the Z axis
pub const PLANE_ANY_Z: u8 = 5;

/// A plane `normal · p = dist`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from the origin
    pub dist: f32,
    /// Axis type, see the `PLANE_*` constants
    pub kind: u8,
    /// Bit `i` set when normal component `i` is negative
    pub signbits: u8,
}

impl Plane {
    /// Build a plane, deriving its axis type and sign bits from the normal
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            kind: plane_type_for(normal),
            signbits: signbits_for(normal),
        }
    }

    /// Convert a plane record, keeping the stored axis type
    pub fn from_record(record: &DPlane) -> Self {
        Self {
            normal: record.normal,
            dist: record.dist,
            kind: u8::try_from(record.kind).unwrap_or(PLANE_ANY_Z),
            signbits: signbits_for(record.normal),
        }
    }

    /// Signed distance from the plane, positive on the normal side
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.dist
    }

    /// Signed distance using the axial shortcut for axis types 0..=2
    ///
    /// Node planes are stored facing the positive axis, so the coordinate
    /// itself is the projection. Brush sides may face either way and must
    /// use [`Plane::distance`].
    #[inline]
    pub fn split_distance(&self, point: Vec3) -> f32 {
        if self.is_axial() {
            point[self.kind as usize] - self.dist
        } else {
            self.normal.dot(point) - self.dist
        }
    }

    /// Whether the normal is one of the coordinate axes
    #[inline]
    pub fn is_axial(&self) -> bool {
        self.kind < PLANE_ANY_X
    }

    /// The same plane facing the other way
    pub fn flipped(&self) -> Self {
        Self::new(-self.normal, -self.dist)
    }
}

/// Sign mask of a normal: bit `i` is set when component `i` is negative
pub fn signbits_for(normal: Vec3) -> u8 {
    let mut bits = 0;
    for axis in 0..3 {
        if normal[axis] < 0.0 {
            bits |= 1 << axis;
        }
    }
    bits
}

fn plane_type_for(normal: Vec3) -> u8 {
    if normal.x == 1.0 {
        return PLANE_X;
    }
    if normal.y == 1.0 {
        return PLANE_Y;
    }
    if normal.z == 1.0 {
        return PLANE_Z;
    }

    let abs = normal.abs();
    if abs.x >= abs.y && abs.x >= abs.z {
        PLANE_ANY_X
    } else if abs.y >= abs.x && abs.y >= abs.z {
        PLANE_ANY_Y
    } else {
        PLANE_ANY_Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Vec3::new(1.0, 0.0, 0.0), 0b000 ; "positive x")]
    #[test_case(Vec3::new(-1.0, 0.0, 0.0), 0b001 ; "negative x")]
    #[test_case(Vec3::new(0.0, -0.6, -0.8), 0b110 ; "negative y and z")]
    #[test_case(Vec3::new(-0.6, -0.0, -0.8), 0b101 ; "negative zero is not negative")]
    fn test_signbits(normal: Vec3, expected: u8) {
        assert_eq!(signbits_for(normal), expected);
    }

    #[test]
    fn test_axial_fast_path_matches_dot_product() {
        let record = DPlane {
            normal: Vec3::Y,
            dist: 4.0,
            kind: i32::from(PLANE_Y),
        };
        let plane = Plane::from_record(&record);
        let point = Vec3::new(3.0, 10.0, -2.0);
        assert_eq!(plane.split_distance(point), 6.0);
        assert_eq!(plane.distance(point), 6.0);
    }

    #[test]
    fn test_general_plane_and_flip() {
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let plane = Plane::new(normal, 0.0);
        assert_eq!(plane.kind, PLANE_ANY_X);

        let point = Vec3::new(2.0, 2.0, 0.0);
        assert!(plane.distance(point) > 0.0);
        assert!(plane.flipped().distance(point) < 0.0);
        assert_eq!(plane.flipped().signbits, 0b011);
    }

    #[test]
    fn test_out_of_range_type_uses_dot_product() {
        let record = DPlane {
            normal: Vec3::Z,
            dist: 1.0,
            kind: 99,
        };
        let plane = Plane::from_record(&record);
        assert!(!plane.is_axial());
        assert_eq!(plane.split_distance(Vec3::new(0.0, 0.0, 3.0)), 2.0);
    }
}
