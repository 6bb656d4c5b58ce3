//! Viewport configuration and named device presets.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::result::{AssayError, AssayResult};

/// Name of the reference mobile preset
pub const MOBILE_REFERENCE: &str = "mobile-reference";

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Viewport {
    /// Create a new viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Create a landscape version of this viewport
    #[must_use]
    pub const fn landscape(self) -> Self {
        if self.width > self.height {
            self
        } else {
            Self {
                width: self.height,
                height: self.width,
            }
        }
    }

    /// Check if viewport is in portrait orientation
    #[must_use]
    pub const fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Narrow layouts (single-column, hamburger navigation)
    #[must_use]
    pub const fn is_mobile(&self) -> bool {
        self.width < 768
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(375, 812)
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A named device preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePreset {
    /// Preset name (e.g. "mobile-reference")
    pub name: String,
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Whether the device is mobile
    pub is_mobile: bool,
    /// Whether the device supports touch input
    pub has_touch: bool,
}

impl DevicePreset {
    fn new(name: &str, width: u32, height: u32, is_mobile: bool) -> Self {
        Self {
            name: name.to_string(),
            viewport: Viewport::new(width, height),
            is_mobile,
            has_touch: is_mobile,
        }
    }
}

/// Registry of device presets, including aliases
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    presets: BTreeMap<String, DevicePreset>,
    aliases: BTreeMap<String, String>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create a registry with the built-in presets
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            presets: BTreeMap::new(),
            aliases: BTreeMap::new(),
        };
        registry.register(DevicePreset::new(MOBILE_REFERENCE, 375, 812, true));
        registry.register(DevicePreset::new("iphone-14", 390, 844, true));
        registry.register(DevicePreset::new("pixel-7", 412, 915, true));
        registry.register(DevicePreset::new("ipad-mini", 768, 1024, true));
        registry.register(DevicePreset::new("desktop", 1920, 1080, false));
        registry.alias("iphone-x", MOBILE_REFERENCE);
        registry
    }

    /// Register (or replace) a preset
    pub fn register(&mut self, preset: DevicePreset) {
        let _ = self.presets.insert(preset.name.clone(), preset);
    }

    /// Register an alias for an existing preset
    pub fn alias(&mut self, alias: &str, target: &str) {
        let _ = self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Look up a preset by name or alias
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DevicePreset> {
        let key = self.aliases.get(name).map_or(name, String::as_str);
        self.presets.get(key)
    }

    /// All presets, sorted by name
    pub fn presets(&self) -> impl Iterator<Item = &DevicePreset> {
        self.presets.values()
    }

    /// All aliases as `(alias, target)`
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, t)| (a.as_str(), t.as_str()))
    }
}

/// Viewport as written in configuration: a preset name or `WxH`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ViewportSpec {
    label: String,
    viewport: Viewport,
}

impl ViewportSpec {
    /// Resolve `spec` against the built-in presets
    pub fn parse(spec: &str) -> AssayResult<Self> {
        Self::parse_with(spec, &DeviceRegistry::new())
    }

    /// Resolve `spec` against `registry`
    pub fn parse_with(spec: &str, registry: &DeviceRegistry) -> AssayResult<Self> {
        let spec = spec.trim();
        if let Some(preset) = registry.get(spec) {
            return Ok(Self {
                label: spec.to_string(),
                viewport: preset.viewport,
            });
        }

        static DIMENSIONS: OnceLock<Option<Regex>> = OnceLock::new();
        let dimensions = DIMENSIONS
            .get_or_init(|| Regex::new(r"^(\d{2,5})\s*[xX×]\s*(\d{2,5})$").ok())
            .as_ref();
        let captures = dimensions.and_then(|re| re.captures(spec)).ok_or_else(|| {
            AssayError::script(format!(
                "unknown viewport `{spec}` (expected a preset name or WIDTHxHEIGHT)"
            ))
        })?;
        let parse = |i: usize| captures[i].parse::<u32>().unwrap_or_default();
        let viewport = Viewport::new(parse(1), parse(2));
        if viewport.width == 0 || viewport.height == 0 {
            return Err(AssayError::script(format!("viewport `{spec}` has a zero dimension")));
        }
        Ok(Self {
            label: viewport.to_string(),
            viewport,
        })
    }

    /// The label (preset name or `WxH`)
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The resolved dimensions
    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self {
            label: MOBILE_REFERENCE.to_string(),
            viewport: Viewport::default(),
        }
    }
}

impl TryFrom<String> for ViewportSpec {
    type Error = AssayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ViewportSpec> for String {
    fn from(spec: ViewportSpec) -> Self {
        spec.label
    }
}

impl fmt::Display for ViewportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.viewport)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod viewport_tests {
        use super::*;

        #[test]
        fn test_default_is_mobile_reference() {
            assert_eq!(Viewport::default(), Viewport::new(375, 812));
            assert!(Viewport::default().is_mobile());
            assert!(Viewport::default().is_portrait());
        }

        #[test]
        fn test_landscape() {
            let vp = Viewport::new(375, 812).landscape();
            assert_eq!(vp, Viewport::new(812, 375));
            assert!(!vp.is_mobile());
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_reference_preset_and_alias() {
            let registry = DeviceRegistry::new();
            let preset = registry.get("iphone-x").unwrap();
            assert_eq!(preset.name, MOBILE_REFERENCE);
            assert_eq!(preset.viewport, Viewport::new(375, 812));
            assert!(preset.has_touch);
        }

        #[test]
        fn test_desktop_is_not_mobile() {
            let registry = DeviceRegistry::new();
            assert!(!registry.get("desktop").unwrap().is_mobile);
            assert!(registry.get("watch").is_none());
        }
    }

    mod spec_tests {
        use super::*;

        #[test]
        fn test_parse_preset() {
            let spec = ViewportSpec::parse("mobile-reference").unwrap();
            assert_eq!(spec.viewport(), Viewport::new(375, 812));
            assert_eq!(spec.label(), "mobile-reference");
        }

        #[test]
        fn test_parse_dimensions() {
            let spec = ViewportSpec::parse("1024x768").unwrap();
            assert_eq!(spec.viewport(), Viewport::new(1024, 768));
            assert_eq!(spec.label(), "1024x768");
        }

        #[test]
        fn test_parse_rejects_unknown() {
            assert!(ViewportSpec::parse("galaxy-fold").is_err());
            assert!(ViewportSpec::parse("00x100").is_err());
        }

        #[test]
        fn test_serde_as_string() {
            let spec: ViewportSpec = serde_json::from_str("\"iphone-x\"").unwrap();
            assert_eq!(spec.viewport(), Viewport::new(375, 812));
            assert_eq!(serde_json::to_string(&spec).unwrap(), "\"iphone-x\"");
        }
    }
}
