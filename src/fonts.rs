use std::{borrow::Cow, collections::HashMap, path::Path, sync::Arc};

use tracing::debug;

use crate::error::{ScrivoError, ScrivoResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// RGBA8 color used both as the Parley text brush and as a layer fill.
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a 6-digit hex color, with or without a leading `#`.
    pub fn from_hex(hex: &str) -> ScrivoResult<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ScrivoError::validation(format!(
                "fill color must be a 6-digit hex string, got '{hex}'"
            )));
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
        Ok(Self {
            r: channel(0).map_err(|e| ScrivoError::validation(e.to_string()))?,
            g: channel(2).map_err(|e| ScrivoError::validation(e.to_string()))?,
            b: channel(4).map_err(|e| ScrivoError::validation(e.to_string()))?,
            a: 255,
        })
    }
}

/// Font registration, shaping, and glyph source lookup for the text layer.
///
/// Families enter the library either as raw font bytes (the custom-font
/// upload path) or from a fonts directory scan (the external font cache).
/// Rendering resolves the text layer's family against this catalog; an
/// unknown family falls back to the first registered one.
pub struct FontLibrary {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
    families: Vec<String>,
    bytes_by_family: HashMap<String, Arc<Vec<u8>>>,
    font_data_cache: HashMap<String, vello_cpu::peniko::FontData>,
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("families", &self.families)
            .finish()
    }
}

impl FontLibrary {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            families: Vec::new(),
            bytes_by_family: HashMap::new(),
            font_data_cache: HashMap::new(),
        }
    }

    /// Register a font from raw bytes and return its primary family name.
    pub fn register_font_bytes(&mut self, bytes: Vec<u8>) -> ScrivoResult<String> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ScrivoError::validation("no font families registered from font bytes")
        })?;

        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ScrivoError::validation("registered font family has no name"))?
            .to_string();

        if !self
            .families
            .iter()
            .any(|f| f.eq_ignore_ascii_case(&family_name))
        {
            self.families.push(family_name.clone());
        }
        self.bytes_by_family
            .insert(family_name.to_ascii_lowercase(), Arc::new(bytes));
        self.font_data_cache.remove(&family_name.to_ascii_lowercase());

        debug!(family = %family_name, "registered font");
        Ok(family_name)
    }

    /// Load every `.ttf`/`.otf`/`.ttc` file in `dir`, returning how many
    /// registered successfully. Unreadable or invalid files are skipped.
    pub fn load_fonts_from_dir(&mut self, dir: &Path) -> usize {
        let Ok(rd) = std::fs::read_dir(dir) else {
            return 0;
        };

        let mut loaded = 0usize;
        for entry in rd.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if ext != "ttf" && ext != "otf" && ext != "ttc" {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            if self.register_font_bytes(bytes).is_ok() {
                loaded += 1;
            }
        }
        loaded
    }

    /// Registered family names, in registration order.
    pub fn families(&self) -> &[String] {
        &self.families
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families
            .iter()
            .any(|f| f.eq_ignore_ascii_case(family))
    }

    /// Resolve a requested family against the catalog: exact
    /// (case-insensitive) match, else the first registered family.
    pub fn resolve(&self, family: &str) -> ScrivoResult<String> {
        if let Some(found) = self
            .families
            .iter()
            .find(|f| f.eq_ignore_ascii_case(family))
        {
            return Ok(found.clone());
        }
        self.families.first().cloned().ok_or_else(|| {
            ScrivoError::validation(format!(
                "font family '{family}' is unknown and no fonts are registered"
            ))
        })
    }

    /// Shape and lay out plain text in the resolved family. Returns the
    /// layout and the family that actually ends up rendered.
    pub fn layout(
        &mut self,
        text: &str,
        family: &str,
        size_px: f32,
        brush: Rgba8,
        max_width_px: Option<f32>,
    ) -> ScrivoResult<(parley::Layout<Rgba8>, String)> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(ScrivoError::validation(
                "font size must be finite and > 0",
            ));
        }

        let resolved = self.resolve(family)?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(resolved.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Center,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }

        Ok((layout, resolved))
    }

    /// Glyph source for a resolved family, cached per family.
    pub(crate) fn font_data(&mut self, family: &str) -> ScrivoResult<vello_cpu::peniko::FontData> {
        let resolved = self.resolve(family)?;
        let key = resolved.to_ascii_lowercase();
        if let Some(font) = self.font_data_cache.get(&key) {
            return Ok(font.clone());
        }

        let bytes = self.bytes_by_family.get(&key).ok_or_else(|| {
            ScrivoError::validation(format!("no font bytes stored for family '{resolved}'"))
        })?;
        let font = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(bytes.as_ref().clone()),
            0,
        );
        self.font_data_cache.insert(key, font.clone());
        Ok(font)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_with_and_without_hash() {
        assert_eq!(Rgba8::from_hex("#00B050").unwrap(), Rgba8::opaque(0, 176, 80));
        assert_eq!(Rgba8::from_hex("ff6600").unwrap(), Rgba8::opaque(255, 102, 0));
    }

    #[test]
    fn hex_rejects_short_and_garbage_input() {
        assert!(Rgba8::from_hex("#000").is_err());
        assert!(Rgba8::from_hex("#zzzzzz").is_err());
        assert!(Rgba8::from_hex("").is_err());
    }

    #[test]
    fn registering_garbage_bytes_fails() {
        let mut fonts = FontLibrary::new();
        let err = fonts.register_font_bytes(b"not a font".to_vec()).unwrap_err();
        assert!(matches!(err, ScrivoError::Validation(_)));
        assert!(fonts.families().is_empty());
    }

    #[test]
    fn resolve_without_fonts_is_an_error() {
        let fonts = FontLibrary::new();
        assert!(fonts.resolve("Arial").is_err());
    }

    #[test]
    fn layout_rejects_non_positive_sizes() {
        let mut fonts = FontLibrary::new();
        let res = fonts.layout("hi", "Arial", 0.0, Rgba8::BLACK, None);
        assert!(matches!(res.err(), Some(ScrivoError::Validation(_))));
        let res = fonts.layout("hi", "Arial", f32::NAN, Rgba8::BLACK, None);
        assert!(matches!(res.err(), Some(ScrivoError::Validation(_))));
    }
}
