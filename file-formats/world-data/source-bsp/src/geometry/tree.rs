//! Tree nodes, leaves and brushes, cross-referenced by index

use std::ops::Range;

use crate::contents::Contents;

/// Target of a node's child slot
///
/// On disk a non-negative child is a node index and a negative child `c`
/// is leaf `-c - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildRef {
    /// Index into the node array
    Node(usize),
    /// Index into the leaf array
    Leaf(usize),
}

impl ChildRef {
    /// Decode a stored child value
    #[inline]
    pub fn from_raw(raw: i32) -> Self {
        if raw >= 0 {
            ChildRef::Node(raw as usize)
        } else {
            ChildRef::Leaf((!raw) as usize)
        }
    }

    /// Encode back to the stored child value
    ///
    /// Returns `None` when the index does not fit the on-disk encoding.
    pub fn to_raw(self) -> Option<i32> {
        match self {
            ChildRef::Node(index) => i32::try_from(index).ok(),
            ChildRef::Leaf(index) => i32::try_from(index).ok().map(|i| !i),
        }
    }
}

/// Internal tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Splitting plane; `None` marks a node whose references were invalid
    pub plane: Option<usize>,
    /// Front and back children
    pub children: [ChildRef; 2],
    /// Bounding box minimum
    pub mins: [i16; 3],
    /// Bounding box maximum
    pub maxs: [i16; 3],
    /// First face on this node
    pub first_face: u16,
    /// Number of faces on this node
    pub num_faces: u16,
}

/// Terminal tree node, a convex region of space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Content flags
    pub contents: Contents,
    /// Visibility cluster
    pub cluster: i16,
    /// Area index
    pub area: u16,
    /// Leaf flags
    pub flags: u8,
    /// Bounding box minimum
    pub mins: [i16; 3],
    /// Bounding box maximum
    pub maxs: [i16; 3],
    /// Slice of the leaf face array
    pub leaf_faces: Range<usize>,
    /// Slice of the leaf brush array
    pub leaf_brushes: Range<usize>,
}

/// Convex solid bounded by its sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brush {
    /// Slice of the brush side array
    pub sides: Range<usize>,
    /// Content flags
    pub contents: Contents,
}

/// One bounding half-space of a brush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushSide {
    /// Plane index, facing out of the brush
    pub plane: usize,
    /// Texture info index
    pub tex_info: i16,
    /// Displacement info index
    pub disp_info: i16,
    /// Bevel sides only exist for box traces and never clip rays
    pub bevel: bool,
    /// Thin side
    pub thin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_child_convention() {
        assert_eq!(ChildRef::from_raw(0), ChildRef::Node(0));
        assert_eq!(ChildRef::from_raw(7), ChildRef::Node(7));
        assert_eq!(ChildRef::from_raw(-1), ChildRef::Leaf(0));
        assert_eq!(ChildRef::from_raw(-2), ChildRef::Leaf(1));
        assert_eq!(ChildRef::from_raw(i32::MIN), ChildRef::Leaf(i32::MAX as usize));
    }

    proptest! {
        #[test]
        fn prop_child_round_trip(raw in any::<i32>()) {
            let child = ChildRef::from_raw(raw);
            match child {
                ChildRef::Node(index) => prop_assert_eq!(index as i64, i64::from(raw)),
                ChildRef::Leaf(index) => prop_assert_eq!(index as i64, -i64::from(raw) - 1),
            }
            prop_assert_eq!(child.to_raw(), Some(raw));
        }

        #[test]
        fn prop_leaf_encoding_is_bijective(leaf in 0usize..=(i32::MAX as usize)) {
            let raw = ChildRef::Leaf(leaf).to_raw().unwrap();
            prop_assert!(raw < 0);
            prop_assert_eq!(ChildRef::from_raw(raw), ChildRef::Leaf(leaf));
        }
    }
}
