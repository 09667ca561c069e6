//! Core data types shared across the runtime
//!
//! Canvas geometry and the named-variable store that every patch object
//! carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point or extent on the patch canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned rectangle on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub fn new(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.origin.x
            && p.y >= self.origin.y
            && p.x <= self.origin.x + self.size.x
            && p.y <= self.origin.y + self.size.y
    }
}

/// Persisted per-object configuration values (slider positions, typed-in
/// constants). Survives save/reload; independent of payload cells.
///
/// Only finite values are stored. JSON has no encoding for NaN or infinity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedVars(BTreeMap<String, f32>);

impl NamedVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f32> {
        self.0.get(key).copied()
    }

    pub fn get_or(&self, key: &str, default: f32) -> f32 {
        self.get(key).unwrap_or(default)
    }

    /// Store `value` under `key`. Non-finite values are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: f32) {
        let key = key.into();
        if !value.is_finite() {
            tracing::debug!("Ignoring non-finite value {} for '{}'", value, key);
            return;
        }
        self.0.insert(key, value);
    }

    /// Insert only if the key is not present yet.
    pub fn set_default(&mut self, key: impl Into<String>, value: f32) {
        if value.is_finite() {
            self.0.entry(key.into()).or_insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f32)> for NamedVars {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, v)| v.is_finite()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains() {
        let r = Rect::new(Vec2::new(10.0, 10.0), Vec2::new(100.0, 50.0));
        assert!(r.contains(Vec2::new(10.0, 10.0)));
        assert!(r.contains(Vec2::new(110.0, 60.0)));
        assert!(!r.contains(Vec2::new(111.0, 20.0)));
        assert!(!r.contains(Vec2::new(50.0, 5.0)));
    }

    #[test]
    fn test_named_vars_defaults_do_not_overwrite() {
        let mut vars = NamedVars::new();
        vars.set("FADE", 0.7);
        vars.set_default("FADE", 0.0);
        vars.set_default("GAIN", 1.0);
        assert_eq!(vars.get("FADE"), Some(0.7));
        assert_eq!(vars.get_or("GAIN", 0.0), 1.0);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_named_vars_ignore_non_finite() {
        let mut vars = NamedVars::new();
        vars.set("NUMBER", 2.0);
        vars.set("NUMBER", f32::NAN);
        vars.set("NUMBER", f32::INFINITY);
        vars.set_default("GAIN", f32::NEG_INFINITY);
        assert_eq!(vars.get("NUMBER"), Some(2.0));
        assert_eq!(vars.get("GAIN"), None);

        let collected: NamedVars = [("A".to_string(), f32::NAN), ("B".to_string(), -0.5)]
            .into_iter()
            .collect();
        assert_eq!(serde_json::to_string(&collected).unwrap(), r#"{"B":-0.5}"#);
    }

    #[test]
    fn test_named_vars_serialize_as_map() {
        let mut vars = NamedVars::new();
        vars.set("NUMBER", 3.5);
        let json = serde_json::to_string(&vars).unwrap();
        assert_eq!(json, r#"{"NUMBER":3.5}"#);
    }
}
