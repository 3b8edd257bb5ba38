//! Entity lump parsing
//!
//! The entity lump is plain text, one record per brace block:
//!
//! ```text
//! {
//! "classname" "worldspawn"
//! "skyname" "sky_day01_01"
//! }
//! ```

use glam::Vec3;
use memchr::memmem;
use std::collections::HashMap;

/// One entity's key/value pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entity {
    properties: HashMap<String, String>,
}

impl Entity {
    /// Value of a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The `classname` key
    pub fn class_name(&self) -> Option<&str> {
        self.get("classname")
    }

    /// The `targetname` key
    pub fn target_name(&self) -> Option<&str> {
        self.get("targetname")
    }

    /// The `origin` key parsed as three space separated numbers
    pub fn origin(&self) -> Option<Vec3> {
        let mut parts = self.get("origin")?.split_whitespace().map(str::parse::<f32>);
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        let z = parts.next()?.ok()?;
        Some(Vec3::new(x, y, z))
    }

    /// All key/value pairs
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the entity has no keys
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Add a key; the first value seen for a key is kept
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.entry(key.into()).or_insert_with(|| value.into());
    }
}

/// Parse the entity lump text
///
/// Lines that are neither braces nor a `"key" "value"` pair are skipped.
pub fn parse_entities(text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<Entity> = None;

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        match line {
            "" => {}
            "{" => {
                if current.is_some() {
                    log::debug!("Entity line {}: unterminated entity discarded", number + 1);
                }
                current = Some(Entity::default());
            }
            "}" => match current.take() {
                Some(entity) => entities.push(entity),
                None => log::debug!("Entity line {}: closing brace without entity", number + 1),
            },
            _ => match (current.as_mut(), parse_key_value(line)) {
                (Some(entity), Some((key, value))) => entity.insert(key, value),
                (None, Some(_)) => {
                    log::debug!("Entity line {}: key/value outside an entity", number + 1);
                }
                (_, None) => log::debug!("Entity line {}: skipping {:?}", number + 1, line),
            },
        }
    }

    if current.is_some() {
        log::debug!("Entity lump ends inside an entity");
    }

    log::trace!("Parsed {} entities", entities.len());
    entities
}

/// Split a `"key" "value"` line
fn parse_key_value(line: &str) -> Option<(&str, &str)> {
    if line.len() < 5 || !line.starts_with('"') || !line.ends_with('"') {
        return None;
    }

    // The key starts after the opening quote, so search from there
    let separator = memmem::find(&line.as_bytes()[1..], b"\" \"")? + 1;
    let value_start = separator + 3;
    if value_start > line.len() - 1 {
        return None;
    }

    Some((&line[1..separator], &line[value_start..line.len() - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const LUMP: &str = "{\n\"classname\" \"worldspawn\"\n\"skyname\" \"sky_day01_01\"\n}\n{\r\n\"classname\" \"info_player_terrorist\"\r\n\"origin\" \"-128 256 64.5\"\r\n\"angles\" \"0 90 0\"\r\n}\r\n";

    #[test]
    fn test_parse_entities() {
        let entities = parse_entities(LUMP);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].class_name(), Some("worldspawn"));
        assert_eq!(entities[0].get("skyname"), Some("sky_day01_01"));
        assert_eq!(entities[1].class_name(), Some("info_player_terrorist"));
        assert_eq!(entities[1].origin(), Some(Vec3::new(-128.0, 256.0, 64.5)));
        assert_eq!(entities[1].len(), 3);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "garbage\n{\n\"classname\" \"light\"\nnot a pair\n\"broken \"line\n\"_light\" \"255 255 255 200\"\n}\n}\n\"orphan\" \"pair\"\n{\n\"classname\" \"unterminated\"\n";
        let entities = parse_entities(text);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].len(), 2);
        assert_eq!(entities[0].get("_light"), Some("255 255 255 200"));
    }

    #[test]
    fn test_first_duplicate_key_wins() {
        let entities = parse_entities("{\n\"OnTrigger\" \"a\"\n\"OnTrigger\" \"b\"\n}\n");
        assert_eq!(entities[0].get("OnTrigger"), Some("a"));
    }

    #[test_case("\"key\" \"value\"", Some(("key", "value")) ; "simple pair")]
    #[test_case("\"key\" \"\"", Some(("key", "")) ; "empty value")]
    #[test_case("\"message\" \"say \"hi\"\"", Some(("message", "say \"hi\"")) ; "quotes in value")]
    #[test_case("\"\" \"value\"", Some(("", "value")) ; "empty key")]
    #[test_case("\" \" \"x\"", Some((" ", "x")) ; "space key")]
    #[test_case("\"key\"  \"value\"", None ; "two spaces")]
    #[test_case("\"key\" \"", None ; "truncated")]
    #[test_case("key value", None ; "unquoted")]
    fn test_parse_key_value(line: &str, expected: Option<(&str, &str)>) {
        assert_eq!(parse_key_value(line), expected);
    }

    #[test]
    fn test_origin_parse_failure() {
        let mut entity = Entity::default();
        entity.insert("origin", "1 two 3");
        assert_eq!(entity.origin(), None);
        assert!(Entity::default().origin().is_none());
    }
}
