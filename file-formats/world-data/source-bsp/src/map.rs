//! Loaded maps and the shared map context
//!
//! [`BspMap`] is an immutable, fully decoded map: header, lumps after
//! overlays, collision geometry and entities. [`MapContext`] holds the
//! current map behind a reader/writer lock so that any number of threads can
//! trace rays while a loader swaps in a new map.
//!
//! # Examples
//!
//! ```no_run
//! use glam::Vec3;
//! use source_bsp::MapContext;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = MapContext::new();
//! context.load_map("csgo/maps", "de_dust2.bsp")?;
//!
//! let eye = Vec3::new(-512.0, 1024.0, 64.0);
//! let target = Vec3::new(-256.0, 1400.0, 64.0);
//! if context.is_visible(eye, target) {
//!     println!("clear line of sight");
//! }
//! # Ok(())
//! # }
//! ```

use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::contents::Contents;
use crate::entity::{Entity, parse_entities};
use crate::error::{Error, Result};
use crate::geometry::{BspGeometry, DEFAULT_MAX_DEPTH};
use crate::header::{BspHeader, LumpId};
use crate::lump::{DEFAULT_MAX_LUMP_SIZE, LumpReader, LumpSet};
use crate::patch::{DEFAULT_MAX_PATCHES, apply_lump_patches, discover_lump_patches};
use crate::trace::TraceResult;

/// Options controlling how maps are loaded and queried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Whether `_l_N.lmp` overlays next to the map are applied
    pub apply_patches: bool,
    /// Most overlays probed for one map
    pub max_patches: usize,
    /// Upper bound for a single lump, raw or decompressed
    pub max_lump_size: usize,
    /// Deepest tree descent a trace may take
    pub max_trace_depth: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadOptions {
    /// Create new default options
    ///
    /// Overlays are applied, up to 128 per map. Lumps may be up to 256 MiB
    /// and traces descend at most 1024 nodes.
    pub fn new() -> Self {
        Self {
            apply_patches: true,
            max_patches: DEFAULT_MAX_PATCHES,
            max_lump_size: DEFAULT_MAX_LUMP_SIZE,
            max_trace_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set whether lump overlays are applied
    pub fn apply_patches(mut self, apply: bool) -> Self {
        self.apply_patches = apply;
        self
    }

    /// Set the most overlays probed for one map
    pub fn max_patches(mut self, max: usize) -> Self {
        self.max_patches = max;
        self
    }

    /// Set the upper bound for a single lump
    pub fn max_lump_size(mut self, bytes: usize) -> Self {
        self.max_lump_size = bytes;
        self
    }

    /// Set the deepest tree descent a trace may take
    pub fn max_trace_depth(mut self, depth: usize) -> Self {
        self.max_trace_depth = depth;
        self
    }

    /// Open a map file with these options
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<BspMap> {
        BspMap::open_with_options(path, &self)
    }
}

/// A fully decoded map
#[derive(Debug)]
pub struct BspMap {
    path: Option<PathBuf>,
    header: BspHeader,
    lumps: LumpSet,
    geometry: BspGeometry,
    entities: Vec<Entity>,
    patches: Vec<(PathBuf, LumpId)>,
    max_trace_depth: usize,
}

impl BspMap {
    /// Open a map file with default options
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &LoadOptions::default())
    }

    /// Open a map file, applying any lump overlays beside it
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading map {}", path.display());

        let data = std::fs::read(path)?;
        let (header, mut lumps) = read_lumps(&data, options)?;

        let mut patches = Vec::new();
        if options.apply_patches {
            let found = discover_lump_patches(path, options.max_patches);
            if !found.is_empty() {
                let report = apply_lump_patches(
                    &found,
                    header.map_revision,
                    &mut lumps,
                    options.max_lump_size,
                );
                patches = report.applied;
            }
        }

        let mut map = Self::assemble(header, lumps, options);
        map.path = Some(path.to_path_buf());
        map.patches = patches;
        Ok(map)
    }

    /// Decode a map already in memory; overlays are not looked for
    pub fn from_bytes(data: &[u8], options: &LoadOptions) -> Result<Self> {
        let (header, lumps) = read_lumps(data, options)?;
        Ok(Self::assemble(header, lumps, options))
    }

    fn assemble(header: BspHeader, lumps: LumpSet, options: &LoadOptions) -> Self {
        let geometry = BspGeometry::build(&lumps);
        let entities = parse_entities(&lumps.entities);
        let stats = geometry.stats();
        log::info!(
            "Map ready: {} nodes, {} leaves, {} brushes, {} polygons, {} entities",
            geometry.nodes().len(),
            geometry.leaves().len(),
            geometry.brushes().len(),
            stats.polygons,
            entities.len()
        );

        Self {
            path: None,
            header,
            lumps,
            geometry,
            entities,
            patches: Vec::new(),
            max_trace_depth: options.max_trace_depth,
        }
    }

    /// File the map was read from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// File header
    pub fn header(&self) -> &BspHeader {
        &self.header
    }

    /// Lumps after overlays were applied
    pub fn lumps(&self) -> &LumpSet {
        &self.lumps
    }

    /// Collision geometry
    pub fn geometry(&self) -> &BspGeometry {
        &self.geometry
    }

    /// Parsed entities, in file order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Entities with a given `classname`
    pub fn entities_by_class<'a>(
        &'a self,
        class_name: &'a str,
    ) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .iter()
            .filter(move |e| e.class_name() == Some(class_name))
    }

    /// Overlays applied on load, in order
    pub fn applied_patches(&self) -> &[(PathBuf, LumpId)] {
        &self.patches
    }

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
        self.geometry
            .trace_with_limit(origin, destination, mask, self.max_trace_depth)
    }

    /// Whether nothing blocks the segment between two points
    pub fn is_visible(&self, origin: Vec3, destination: Vec3) -> bool {
        !self.trace_ray(origin, destination).is_blocked()
    }

    /// Content flags at a point
    pub fn point_contents(&self, point: Vec3) -> Contents {
        self.geometry.point_contents_with_limit(point, self.max_trace_depth)
    }
}

fn read_lumps(data: &[u8], options: &LoadOptions) -> Result<(BspHeader, LumpSet)> {
    let header = BspHeader::parse(data)?;
    let reader = LumpReader::new(data).with_limit(options.max_lump_size);
    let lumps = LumpSet::read(&reader, &header)?;
    Ok((header, lumps))
}

/// Join a directory and a map name, accepting either separator in the name
pub fn map_path(directory: impl AsRef<Path>, map_name: &str) -> PathBuf {
    let mut path = directory.as_ref().to_path_buf();
    for part in map_name.split(['/', '\\']).filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}

#[derive(Debug)]
struct CurrentMap {
    name: String,
    map: Arc<BspMap>,
}

/// Shared holder for the current map
///
/// Queries take the lock shared and run concurrently. Loading decodes the new
/// map without blocking queries, then swaps it in under the exclusive lock, so
/// a query sees either the old map or the new one. A failed load leaves the
/// current map in place.
#[derive(Debug, Default)]
pub struct MapContext {
    options: LoadOptions,
    current: RwLock<Option<CurrentMap>>,
    loading: Mutex<()>,
}

impl MapContext {
    /// Create an empty context with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty context with custom options
    pub fn with_options(options: LoadOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Options used for loading and queries
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load `map_name` from `directory` and make it current
    ///
    /// Loading the name that is already current succeeds without touching
    /// the disk.
    pub fn load_map(&self, directory: impl AsRef<Path>, map_name: &str) -> Result<()> {
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() || map_name.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "map directory and name must not be empty",
            )));
        }

        // Loads run one at a time; queries keep using the current map
        let _loading = self.loading.lock();

        if self.map_name().as_deref() == Some(map_name) {
            log::debug!("Map {} already loaded", map_name);
            return Ok(());
        }

        let path = map_path(directory, map_name);
        let map = match BspMap::open_with_options(&path, &self.options) {
            Ok(map) => map,
            Err(e) => {
                log::error!("Failed to load map {}: {}", path.display(), e);
                return Err(e);
            }
        };

        *self.current.write() = Some(CurrentMap {
            name: map_name.to_string(),
            map: Arc::new(map),
        });
        log::info!("Map {} is now current", map_name);
        Ok(())
    }

    /// Drop the current map
    pub fn unload(&self) {
        let _loading = self.loading.lock();
        if let Some(previous) = self.current.write().take() {
            log::info!("Unloaded map {}", previous.name);
        }
    }

    /// Name the current map was loaded under
    pub fn map_name(&self) -> Option<String> {
        self.current.read().as_ref().map(|c| c.name.clone())
    }

    /// The current map, kept alive independently of later loads
    pub fn snapshot(&self) -> Option<Arc<BspMap>> {
        self.current.read().as_ref().map(|c| Arc::clone(&c.map))
    }

    /// Trace a segment against the current map
    ///
    /// With no map loaded nothing blocks the segment.
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
        match self.current.read().as_ref() {
            Some(current) => current.map.trace_ray_with_mask(origin, destination, mask),
            None => TraceResult::unobstructed(destination),
        }
    }

    /// Whether nothing in the current map blocks the segment
    pub fn is_visible(&self, origin: Vec3, destination: Vec3) -> bool {
        !self.trace_ray(origin, destination).is_blocked()
    }

    /// Content flags at a point, empty with no map loaded
    pub fn point_contents(&self, point: Vec3) -> Contents {
        match self.current.read().as_ref() {
            Some(current) => current.map.point_contents(point),
            None => Contents::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::lump_patch_path;
    use crate::test_utils::{MapFixture, shifted_wall_planes, turned_wall_planes};
    use crate::trace::DIST_EPSILON;
    use pretty_assertions::assert_eq;
    use std::thread;
    use tempfile::TempDir;

    const FROM: Vec3 = Vec3::new(0.0, -10.0, 0.0);
    const TO: Vec3 = Vec3::new(0.0, 10.0, 0.0);

    fn write_wall(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        MapFixture::wall().write_to(&path).unwrap();
        path
    }

    #[test]
    fn test_map_path_normalizes_separators() {
        assert_eq!(
            map_path("/games/csgo", "maps\\de_dust2.bsp"),
            PathBuf::from("/games/csgo/maps/de_dust2.bsp")
        );
        assert_eq!(
            map_path("/games/csgo/", "maps//de_dust2.bsp"),
            PathBuf::from("/games/csgo/maps/de_dust2.bsp")
        );
    }

    #[test]
    fn test_unloaded_context_is_clear() {
        let context = MapContext::new();
        assert_eq!(context.map_name(), None);
        assert!(context.is_visible(FROM, TO));
        assert_eq!(context.trace_ray(FROM, TO), TraceResult::unobstructed(TO));
    }

    #[test]
    fn test_load_and_trace() {
        let dir = TempDir::new().unwrap();
        write_wall(&dir, "wall.bsp");

        let context = MapContext::new();
        context.load_map(dir.path(), "wall.bsp").unwrap();
        assert_eq!(context.map_name().as_deref(), Some("wall.bsp"));

        let trace = context.trace_ray(FROM, TO);
        assert!((trace.fraction - (10.0 - DIST_EPSILON) / 20.0).abs() < 1e-6);
        assert!(!context.is_visible(FROM, TO));
        assert_eq!(context.point_contents(Vec3::new(0.0, 4.0, 0.0)), Contents::SOLID);

        let map = context.snapshot().unwrap();
        assert_eq!(map.entities().len(), 2);
        let starts: Vec<_> = map.entities_by_class("info_player_start").collect();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].origin(), Some(Vec3::new(0.0, -64.0, 0.0)));
    }

    #[test]
    fn test_same_name_is_not_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = write_wall(&dir, "wall.bsp");

        let context = MapContext::new();
        context.load_map(dir.path(), "wall.bsp").unwrap();
        std::fs::remove_file(&path).unwrap();

        context.load_map(dir.path(), "wall.bsp").unwrap();
        assert!(!context.is_visible(FROM, TO));
    }

    #[test]
    fn test_failed_load_keeps_previous_map() {
        let dir = TempDir::new().unwrap();
        write_wall(&dir, "wall.bsp");

        let mut bad = MapFixture::wall().to_bytes();
        bad[..4].copy_from_slice(b"IBSP");
        std::fs::write(dir.path().join("bad.bsp"), bad).unwrap();

        let context = MapContext::new();
        context.load_map(dir.path(), "wall.bsp").unwrap();

        let err = context.load_map(dir.path(), "bad.bsp").unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
        assert!(context.load_map(dir.path(), "missing.bsp").is_err());
        assert!(context.load_map(dir.path(), "").is_err());

        assert_eq!(context.map_name().as_deref(), Some("wall.bsp"));
        assert!(!context.is_visible(FROM, TO));
    }

    #[test]
    fn test_overlay_changes_and_removal_restores() {
        let dir = TempDir::new().unwrap();
        let path = write_wall(&dir, "wall.bsp");
        let context = MapContext::new();

        context.load_map(dir.path(), "wall.bsp").unwrap();
        let original = context.trace_ray(FROM, TO);

        let overlay = MapFixture::wall().planes(shifted_wall_planes(5.0));
        std::fs::write(lump_patch_path(&path, 0), overlay.patch_bytes(LumpId::Planes)).unwrap();

        let patched = BspMap::open(&path).unwrap();
        assert_eq!(patched.applied_patches().len(), 1);
        let trace = patched.trace_ray(FROM, TO);
        assert!((trace.fraction - (15.0 - DIST_EPSILON) / 20.0).abs() < 1e-6);

        std::fs::remove_file(lump_patch_path(&path, 0)).unwrap();
        context.unload();
        context.load_map(dir.path(), "wall.bsp").unwrap();
        assert_eq!(context.trace_ray(FROM, TO), original);
    }

    #[test]
    fn test_overlay_changing_plane_signs_drives_trace() {
        let dir = TempDir::new().unwrap();
        let path = write_wall(&dir, "wall.bsp");
        let context = MapContext::new();

        let from = Vec3::new(-10.0, -5.0, 0.0);
        let to = Vec3::new(30.0, -5.0, 0.0);

        context.load_map(dir.path(), "wall.bsp").unwrap();
        let base_signs: Vec<u8> = context
            .snapshot()
            .unwrap()
            .geometry()
            .planes()
            .iter()
            .map(|p| p.signbits)
            .collect();
        assert_eq!(base_signs, vec![0b000, 0b010]);
        assert!(context.is_visible(from, to));

        let overlay = MapFixture::wall().planes(turned_wall_planes(10.0));
        std::fs::write(lump_patch_path(&path, 0), overlay.patch_bytes(LumpId::Planes)).unwrap();
        context.unload();
        context.load_map(dir.path(), "wall.bsp").unwrap();

        let map = context.snapshot().unwrap();
        assert_eq!(map.applied_patches().len(), 1);
        let signs: Vec<u8> = map.geometry().planes().iter().map(|p| p.signbits).collect();
        assert_eq!(signs, vec![0b000, 0b001]);
        assert_ne!(signs, base_signs);

        let trace = context.trace_ray(from, to);
        assert!(trace.is_blocked());
        assert!((trace.fraction - (20.0 - DIST_EPSILON) / 40.0).abs() < 1e-6);
        assert_eq!(trace.brush, Some(0));
        assert!(context.is_visible(from, Vec3::new(5.0, -5.0, 0.0)));
    }

    #[test]
    fn test_point_lookup_honors_depth_limit() {
        let bytes = MapFixture::wall().to_bytes();
        let open_space = Vec3::new(0.0, -4.0, 0.0);

        let map = BspMap::from_bytes(&bytes, &LoadOptions::new()).unwrap();
        assert_eq!(map.point_contents(open_space), Contents::empty());

        let shallow = BspMap::from_bytes(&bytes, &LoadOptions::new().max_trace_depth(0)).unwrap();
        assert_eq!(shallow.point_contents(open_space), Contents::SOLID);
    }

    #[test]
    fn test_overlays_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let path = write_wall(&dir, "wall.bsp");
        let overlay = MapFixture::wall().planes(shifted_wall_planes(5.0));
        std::fs::write(lump_patch_path(&path, 0), overlay.patch_bytes(LumpId::Planes)).unwrap();

        let map = LoadOptions::new().apply_patches(false).open(&path).unwrap();
        assert!(map.applied_patches().is_empty());
        assert!((map.trace_ray(FROM, TO).fraction - (10.0 - DIST_EPSILON) / 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_lump_size_limit_rejects_map() {
        let bytes = MapFixture::wall().to_bytes();
        let options = LoadOptions::new().max_lump_size(8);
        assert!(matches!(
            BspMap::from_bytes(&bytes, &options),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_snapshot_outlives_swap() {
        let dir = TempDir::new().unwrap();
        write_wall(&dir, "wall.bsp");
        MapFixture::new().write_to(dir.path().join("empty.bsp")).unwrap();

        let context = MapContext::new();
        context.load_map(dir.path(), "wall.bsp").unwrap();
        let snapshot = context.snapshot().unwrap();

        context.load_map(dir.path(), "empty.bsp").unwrap();
        assert!(context.is_visible(FROM, TO));
        assert!(!snapshot.is_visible(FROM, TO));
    }

    #[test]
    fn test_concurrent_queries_during_reload() {
        let dir = TempDir::new().unwrap();
        write_wall(&dir, "wall.bsp");
        MapFixture::wall()
            .planes(shifted_wall_planes(5.0))
            .write_to(dir.path().join("shifted.bsp"))
            .unwrap();

        let context = Arc::new(MapContext::new());
        context.load_map(dir.path(), "wall.bsp").unwrap();

        let wall = (10.0 - DIST_EPSILON) / 20.0;
        let shifted = (15.0 - DIST_EPSILON) / 20.0;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let context = Arc::clone(&context);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let fraction = context.trace_ray(FROM, TO).fraction;
                        assert!(
                            (fraction - wall).abs() < 1e-6 || (fraction - shifted).abs() < 1e-6,
                            "torn result {fraction}"
                        );
                    }
                })
            })
            .collect();

        for name in ["shifted.bsp", "wall.bsp", "shifted.bsp"] {
            context.load_map(dir.path(), name).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
