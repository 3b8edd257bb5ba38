//! VBSP map command implementations

use anyhow::{Context, Result};
use clap::Subcommand;
use glam::Vec3;
use std::path::{Path, PathBuf};

use source_bsp::compression::is_compressed;
use source_bsp::lump::LumpLocation;
use source_bsp::patch::{DEFAULT_MAX_PATCHES, LumpPatch};
use source_bsp::{
    BspHeader, BspMap, Contents, LoadOptions, LumpId, LumpReader, TraceResult,
    discover_lump_patches,
};

use crate::utils::{
    add_table_row, create_table, format_bytes, format_percentage, format_vec3, parse_mask,
    parse_vec3,
};

#[derive(Subcommand)]
pub enum BspCommands {
    /// Show header, lump table and geometry statistics of a map
    Info {
        /// Path to the BSP file
        file: PathBuf,

        /// Ignore _l_N.lmp lump overlays
        #[arg(long)]
        no_patches: bool,
    },

    /// List entities
    Entities {
        /// Path to the BSP file
        file: PathBuf,

        /// Only show entities of this classname
        #[arg(short, long)]
        class: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Ignore _l_N.lmp lump overlays
        #[arg(long)]
        no_patches: bool,
    },

    /// Trace a segment through the map
    Trace {
        /// Path to the BSP file
        file: PathBuf,

        /// Segment start, as "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        from: Vec3,

        /// Segment end, as "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        to: Vec3,

        /// Content mask (shot, solid, player, opaque or hex)
        #[arg(short, long, value_parser = parse_mask, default_value = "shot")]
        mask: Contents,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Ignore _l_N.lmp lump overlays
        #[arg(long)]
        no_patches: bool,
    },

    /// Check line of sight between two points
    Visible {
        /// Path to the BSP file
        file: PathBuf,

        /// Eye position, as "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        from: Vec3,

        /// Target position, as "x,y,z"
        #[arg(long, value_parser = parse_vec3, allow_hyphen_values = true)]
        to: Vec3,

        /// Ignore _l_N.lmp lump overlays
        #[arg(long)]
        no_patches: bool,
    },

    /// List the lump overlays found next to a map
    Patches {
        /// Path to the BSP file
        file: PathBuf,
    },
}

pub fn execute(command: BspCommands) -> Result<()> {
    match command {
        BspCommands::Info { file, no_patches } => execute_info(&file, no_patches),
        BspCommands::Entities {
            file,
            class,
            format,
            no_patches,
        } => execute_entities(&file, class.as_deref(), &format, no_patches),
        BspCommands::Trace {
            file,
            from,
            to,
            mask,
            format,
            no_patches,
        } => execute_trace(&file, from, to, mask, &format, no_patches),
        BspCommands::Visible {
            file,
            from,
            to,
            no_patches,
        } => execute_visible(&file, from, to, no_patches),
        BspCommands::Patches { file } => execute_patches(&file),
    }
}

fn open_map(path: &Path, no_patches: bool) -> Result<BspMap> {
    LoadOptions::new()
        .apply_patches(!no_patches)
        .open(path)
        .with_context(|| format!("Failed to load map {}", path.display()))
}

fn execute_info(path: &Path, no_patches: bool) -> Result<()> {
    use console::style;

    let data = std::fs::read(path).context("Failed to read BSP file")?;
    let header = BspHeader::parse(&data).context("Failed to parse BSP header")?;
    let map = open_map(path, no_patches)?;

    println!("{}", style("VBSP Map Information").bold().cyan());
    println!("{}", style("====================").cyan());
    println!();
    println!("{}: {}", style("File").bold(), path.display());
    println!("{}: {}", style("Size").bold(), format_bytes(data.len() as u64));
    println!("{}: {}", style("Version").bold(), header.version);
    println!("{}: {}", style("Map revision").bold(), header.map_revision);
    println!();

    println!("{}", style("Lumps:").bold());
    let reader = LumpReader::new(&data);
    let mut table = create_table(&["#", "Name", "Offset", "Size", "Compressed"]);
    for (index, descriptor) in header.lumps.iter().enumerate() {
        if descriptor.is_empty() {
            continue;
        }
        let Some(id) = LumpId::from_index(index) else {
            continue;
        };
        let compressed = reader
            .payload(id, LumpLocation::from(descriptor))
            .map(is_compressed)
            .unwrap_or(false);
        add_table_row(
            &mut table,
            vec![
                index.to_string(),
                id.name().unwrap_or("-").to_string(),
                descriptor.offset.to_string(),
                format_bytes(descriptor.size as u64),
                if compressed { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    table.printstd();
    println!();

    let geometry = map.geometry();
    let stats = geometry.stats();
    println!("{}", style("Geometry:").bold());
    println!("  Planes: {}", geometry.planes().len());
    println!("  Nodes: {} ({} inert)", geometry.nodes().len(), stats.inert_nodes);
    println!("  Leaves: {}", geometry.leaves().len());
    println!(
        "  Brushes: {} ({} inert)",
        geometry.brushes().len(),
        stats.inert_brushes
    );
    let faces = geometry.faces().len();
    let coverage = if faces == 0 {
        0.0
    } else {
        stats.polygons as f64 / faces as f64 * 100.0
    };
    println!(
        "  Faces: {} ({} polygons, {} coverage)",
        faces,
        stats.polygons,
        format_percentage(coverage)
    );
    if stats.skipped_faces > 0 || stats.clamped_ranges > 0 {
        println!(
            "  {}: {} faces skipped, {} ranges clamped",
            style("Repairs").yellow(),
            stats.skipped_faces,
            stats.clamped_ranges
        );
    }
    println!("  Entities: {}", map.entities().len());

    if !map.applied_patches().is_empty() {
        println!();
        println!("{}", style("Applied overlays:").bold());
        for (patch, lump) in map.applied_patches() {
            println!("  {} -> {}", patch.display(), lump);
        }
    }

    Ok(())
}

fn execute_entities(
    path: &Path,
    class: Option<&str>,
    format: &str,
    no_patches: bool,
) -> Result<()> {
    use console::style;

    let map = open_map(path, no_patches)?;
    let entities: Vec<_> = match class {
        Some(class) => map.entities_by_class(class).collect(),
        None => map.entities().iter().collect(),
    };

    match format {
        "json" => {
            #[cfg(feature = "serde")]
            {
                println!("{}", serde_json::to_string_pretty(&entities)?);
            }
            #[cfg(not(feature = "serde"))]
            {
                anyhow::bail!("JSON output requires the 'serde' feature to be enabled");
            }
        }
        _ => {
            println!("{}: {}", style("Entities").bold(), entities.len());
            for (index, entity) in entities.iter().enumerate() {
                println!();
                println!(
                    "{} {}",
                    style(format!("[{index}]")).cyan(),
                    entity.class_name().unwrap_or("<no classname>")
                );
                let mut keys: Vec<_> = entity.properties().iter().collect();
                keys.sort();
                for (key, value) in keys {
                    println!("  {key} = {value}");
                }
            }
        }
    }

    Ok(())
}

fn execute_trace(
    path: &Path,
    from: Vec3,
    to: Vec3,
    mask: Contents,
    format: &str,
    no_patches: bool,
) -> Result<()> {
    let map = open_map(path, no_patches)?;
    let trace = map.trace_ray_with_mask(from, to, mask);

    match format {
        "json" => {
            #[cfg(feature = "serde")]
            {
                println!("{}", serde_json::to_string_pretty(&trace)?);
            }
            #[cfg(not(feature = "serde"))]
            {
                anyhow::bail!("JSON output requires the 'serde' feature to be enabled");
            }
        }
        _ => print_trace(&trace),
    }

    Ok(())
}

fn print_trace(trace: &TraceResult) {
    use console::style;

    let status = if trace.all_solid {
        style("inside solid").red()
    } else if trace.is_blocked() {
        style("blocked").yellow()
    } else {
        style("clear").green()
    };

    println!("{}: {}", style("Result").bold(), status);
    println!("{}: {:.6}", style("Fraction").bold(), trace.fraction);
    println!("{}: {}", style("End").bold(), format_vec3(trace.end_pos));
    println!(
        "{}: {} / {}",
        style("Start solid / all solid").bold(),
        trace.start_solid,
        trace.all_solid
    );
    if trace.start_solid {
        println!(
            "{}: {:.6}",
            style("Left solid at").bold(),
            trace.fraction_left_solid
        );
    }
    if !trace.contents.is_empty() {
        println!("{}: {:?}", style("Contents").bold(), trace.contents);
    }
    if let Some(brush) = trace.brush {
        println!("{}: {}", style("Brush").bold(), brush);
    }
}

fn execute_visible(path: &Path, from: Vec3, to: Vec3, no_patches: bool) -> Result<()> {
    let map = open_map(path, no_patches)?;
    if map.is_visible(from, to) {
        println!("visible");
    } else {
        println!("blocked");
    }
    Ok(())
}

fn execute_patches(path: &Path) -> Result<()> {
    use console::style;

    let data = std::fs::read(path).context("Failed to read BSP file")?;
    let header = BspHeader::parse(&data).context("Failed to parse BSP header")?;
    let found = discover_lump_patches(path, DEFAULT_MAX_PATCHES);

    if found.is_empty() {
        println!("No lump overlays found for {}", path.display());
        return Ok(());
    }

    let mut table = create_table(&["File", "Lump", "Size", "Revision", "Status"]);
    for patch_path in &found {
        let name = patch_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let row = match LumpPatch::open(patch_path) {
            Ok(patch) => {
                let lump = match patch.lump() {
                    Ok(id) => id.to_string(),
                    Err(_) => format!("invalid ({})", patch.header.lump_id),
                };
                let status = if patch.header.map_revision == header.map_revision {
                    "ok".to_string()
                } else {
                    format!("revision mismatch (map {})", header.map_revision)
                };
                vec![
                    name,
                    lump,
                    format_bytes(patch.header.size.max(0) as u64),
                    patch.header.map_revision.to_string(),
                    status,
                ]
            }
            Err(e) => vec![name, "-".into(), "-".into(), "-".into(), e.to_string()],
        };
        add_table_row(&mut table, row);
    }

    println!("{}", style("Lump Overlays").bold().cyan());
    table.printstd();
    Ok(())
}
