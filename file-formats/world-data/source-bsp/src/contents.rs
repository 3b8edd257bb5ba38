//! Brush and leaf content flags

use bitflags::bitflags;

bitflags! {
    /// Content flags carried by brushes and leaves
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct Contents: u32 {
        /// Solid world geometry
        const SOLID                = 0x0000_0001;
        /// Translucent but not watery, e.g. glass
        const WINDOW               = 0x0000_0002;
        /// Unused
        const AUX                  = 0x0000_0004;
        /// Alpha-tested, lets bullets and light through but not players
        const GRATE                = 0x0000_0008;
        /// Slime
        const SLIME                = 0x0000_0010;
        /// Water
        const WATER                = 0x0000_0020;
        /// Blocks line of sight only
        const MIST                 = 0x0000_0040;
        /// Blocks visibility calculation
        const OPAQUE               = 0x0000_0080;
        /// Fog volumes are tested against this
        const TEST_FOG_VOLUME      = 0x0000_0100;
        /// Team one clip
        const TEAM1                = 0x0000_0800;
        /// Team two clip
        const TEAM2                = 0x0000_1000;
        /// Ignore opaque on nodraw surfaces
        const IGNORE_NODRAW_OPAQUE = 0x0000_2000;
        /// Moving entity brush
        const MOVEABLE             = 0x0000_4000;
        /// Area portal
        const AREAPORTAL           = 0x0000_8000;
        /// Blocks players only
        const PLAYERCLIP           = 0x0001_0000;
        /// Blocks NPCs only
        const MONSTERCLIP          = 0x0002_0000;
        /// Current towards +X
        const CURRENT_0            = 0x0004_0000;
        /// Current towards +Y
        const CURRENT_90           = 0x0008_0000;
        /// Current towards -X
        const CURRENT_180          = 0x0010_0000;
        /// Current towards -Y
        const CURRENT_270          = 0x0020_0000;
        /// Current towards +Z
        const CURRENT_UP           = 0x0040_0000;
        /// Current towards -Z
        const CURRENT_DOWN         = 0x0080_0000;
        /// Removed before bsp-ing an entity
        const ORIGIN               = 0x0100_0000;
        /// Should never be on a brush, only on game entities
        const MONSTER              = 0x0200_0000;
        /// Debris
        const DEBRIS               = 0x0400_0000;
        /// Brushes to be added after vis leafs
        const DETAIL               = 0x0800_0000;
        /// Auto set if any surface has trans
        const TRANSLUCENT          = 0x1000_0000;
        /// Ladder
        const LADDER               = 0x2000_0000;
        /// Use accurate hitboxes on trace
        const HITBOX               = 0x4000_0000;
    }
}

impl Contents {
    /// Everything that blocks a bullet, used for visibility queries
    pub const MASK_SHOT_HULL: Self = Self::SOLID
        .union(Self::MOVEABLE)
        .union(Self::MONSTER)
        .union(Self::WINDOW)
        .union(Self::DEBRIS)
        .union(Self::GRATE);

    /// Everything that is normally solid
    pub const MASK_SOLID: Self = Self::SOLID
        .union(Self::MOVEABLE)
        .union(Self::WINDOW)
        .union(Self::MONSTER)
        .union(Self::GRATE);

    /// Everything that blocks player movement
    pub const MASK_PLAYER_SOLID: Self = Self::MASK_SOLID.union(Self::PLAYERCLIP);

    /// Everything that blocks line of sight for AI
    pub const MASK_OPAQUE: Self = Self::SOLID
        .union(Self::MOVEABLE)
        .union(Self::OPAQUE);

    /// Interpret the signed contents field stored in brush and leaf records
    pub fn from_raw(raw: i32) -> Self {
        Self::from_bits_retain(raw as u32)
    }
}
