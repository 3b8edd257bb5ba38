//! Formatting and argument parsing utilities

use glam::Vec3;
use humansize::{DECIMAL, format_size};
use source_bsp::Contents;

/// Format file size in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

/// Format a fraction as a percentage
pub fn format_percentage(value: f64) -> String {
    format!("{value:.1}%")
}

/// Format a point as `x y z`
pub fn format_vec3(v: Vec3) -> String {
    format!("{:.3} {:.3} {:.3}", v.x, v.y, v.z)
}

/// Parse a point given as `x,y,z` or `x y z`
pub fn parse_vec3(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() != 3 {
        return Err(format!("expected three coordinates, got '{s}'"));
    }

    let mut coords = [0f32; 3];
    for (coord, part) in coords.iter_mut().zip(&parts) {
        *coord = part
            .parse()
            .map_err(|_| format!("'{part}' is not a number"))?;
    }
    Ok(Vec3::from_array(coords))
}

/// Parse a named content mask or a raw hexadecimal mask
pub fn parse_mask(s: &str) -> Result<Contents, String> {
    match s.to_ascii_lowercase().as_str() {
        "shot" => Ok(Contents::MASK_SHOT_HULL),
        "solid" => Ok(Contents::MASK_SOLID),
        "player" => Ok(Contents::MASK_PLAYER_SOLID),
        "opaque" => Ok(Contents::MASK_OPAQUE),
        other => {
            let digits = other.trim_start_matches("0x");
            u32::from_str_radix(digits, 16)
                .map(Contents::from_bits_retain)
                .map_err(|_| format!("unknown mask '{s}' (use shot, solid, player, opaque or hex)"))
        }
    }
}
