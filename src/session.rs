use std::sync::Arc;

use kurbo::Point;
use tracing::{debug, info, warn};

use crate::{
    error::{ScrivoError, ScrivoResult},
    fonts::{FontLibrary, Rgba8},
    ingest::{IngestedImage, PreparedImage, decode_clamped},
    render::{self, FrameRgba},
    scale,
};

/// Surface color shown before any background image is uploaded.
pub const DEFAULT_CLEAR_RGBA: [u8; 4] = [0xD0, 0xD0, 0xD0, 0xFF];

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// Initial attributes for the text layer created by
/// [`CanvasSession::ensure_text_layer`].
pub struct TextLayerDefaults {
    pub placeholder: String,
    pub font_family: String,
    /// Display-space size; stored on the layer as `display / scale_factor`.
    pub display_font_size: f32,
    pub fill_color: Rgba8,
    pub box_width: f32,
}

impl Default for TextLayerDefaults {
    fn default() -> Self {
        Self {
            placeholder: "Sample Text".to_string(),
            font_family: "Arial".to_string(),
            display_font_size: 40.0,
            fill_color: Rgba8::BLACK,
            box_width: 200.0,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// Declarative editing policies consumed by embedding UIs instead of ad hoc
/// event handlers.
pub struct EditPolicies {
    /// Whether focusing the text layer may scroll it into view.
    pub scroll_into_view_on_edit: bool,
    /// Rotation snap increment for interactive handles.
    pub snap_angle_deg: f64,
    /// Constrain interactive scaling to a uniform factor.
    pub lock_uniform_scale: bool,
}

impl Default for EditPolicies {
    fn default() -> Self {
        Self {
            scroll_into_view_on_edit: false,
            snap_angle_deg: 45.0,
            lock_uniform_scale: true,
        }
    }
}

#[derive(Clone, Debug)]
/// The single editable text layer composited over the background.
pub struct TextLayer {
    pub content: String,
    pub font_family: String,
    /// Display-space font size as last set by the user. Kept so the
    /// logical size can be recomputed whenever the scale factor changes.
    pub font_size_display: f32,
    /// Logical-space font size (already divided by the scale factor).
    pub font_size_logical: f32,
    pub fill_color: Rgba8,
    /// Top-left corner of the text box, in logical pixels.
    pub position: Point,
    pub rotation_deg: f64,
    pub scale: f64,
    pub box_width: f32,
}

#[derive(Clone, Debug)]
/// Non-interactive raster filling the full logical canvas, always painted
/// beneath the text layer.
pub struct BackgroundLayer {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) rgba8_premul: Arc<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct Surface {
    pub(crate) logical_width: u32,
    pub(crate) logical_height: u32,
    pub(crate) clear_rgba: [u8; 4],
    pub(crate) background: Option<BackgroundLayer>,
    pub(crate) text: Option<TextLayer>,
}

/// The live editing session: one surface, at most one background layer,
/// exactly one text layer once created, plus the derived scale state.
///
/// Rendering is on demand: mutations only mark the session dirty, and the
/// externally observable frame changes only when [`CanvasSession::render`]
/// runs.
pub struct CanvasSession {
    surface: Option<Surface>,
    fonts: FontLibrary,
    policies: EditPolicies,
    viewport_width: f64,
    scale_factor: f64,
    frame: Option<FrameRgba>,
    dirty: bool,
}

impl Default for CanvasSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasSession {
    pub fn new() -> Self {
        Self {
            surface: None,
            fonts: FontLibrary::new(),
            policies: EditPolicies::default(),
            viewport_width: scale::VIEWPORT_BREAKPOINT + 1.0,
            scale_factor: scale::SCALE_CAP,
            frame: None,
            dirty: false,
        }
    }

    /// Construct the drawing surface. Idempotent: a second call on a live
    /// surface is a no-op.
    pub fn initialize(&mut self, width: u32, height: u32) {
        if self.surface.is_some() {
            debug!("canvas already initialized, skipping");
            return;
        }
        info!(width, height, "initializing canvas");
        self.surface = Some(Surface {
            logical_width: width,
            logical_height: height,
            clear_rgba: DEFAULT_CLEAR_RGBA,
            background: None,
            text: None,
        });
        self.dirty = true;
        self.recompute_scale();
    }

    pub fn is_initialized(&self) -> bool {
        self.surface.is_some()
    }

    pub fn logical_size(&self) -> Option<(u32, u32)> {
        self.surface
            .as_ref()
            .map(|s| (s.logical_width, s.logical_height))
    }

    /// Update the viewport width and recompute the scale factor.
    pub fn set_viewport_width(&mut self, px: f64) {
        self.viewport_width = px;
        self.recompute_scale();
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontLibrary {
        &mut self.fonts
    }

    pub fn policies(&self) -> &EditPolicies {
        &self.policies
    }

    pub fn set_policies(&mut self, policies: EditPolicies) {
        self.policies = policies;
    }

    /// Replace the background layer (and the logical dimensions) wholesale
    /// with a freshly ingested image. An existing text layer is kept as is.
    ///
    /// The background is first constructed from the prepared raster; if that
    /// fails, a fallback path re-decodes the source bytes. Only when both
    /// paths fail does this surface [`ScrivoError::ImageLoadFailure`].
    pub fn replace_background(&mut self, image: &IngestedImage) -> ScrivoResult<()> {
        if self.surface.is_none() {
            return Err(ScrivoError::NoSurface);
        }

        let background = match background_from_prepared(&image.prepared) {
            Ok(bg) => bg,
            Err(primary_err) => {
                warn!(%primary_err, "primary background construction failed, re-decoding source");
                let reprepared = decode_clamped(&image.source_bytes).map_err(|e| {
                    ScrivoError::image_load_failure(format!(
                        "primary path failed ({primary_err}); fallback decode failed ({e})"
                    ))
                })?;
                background_from_prepared(&reprepared).map_err(|e| {
                    ScrivoError::image_load_failure(format!(
                        "primary path failed ({primary_err}); fallback construction failed ({e})"
                    ))
                })?
            }
        };

        let surface = self
            .surface
            .as_mut()
            .ok_or(ScrivoError::NoSurface)?;
        surface.logical_width = background.width;
        surface.logical_height = background.height;
        surface.background = Some(background);
        info!(
            width = surface.logical_width,
            height = surface.logical_height,
            "background replaced"
        );

        self.dirty = true;
        self.recompute_scale();
        Ok(())
    }

    /// Insert the single editable text layer if and only if none exists.
    /// Guards against duplicate layers on repeated dimension changes.
    pub fn ensure_text_layer(&mut self, defaults: &TextLayerDefaults) {
        let scale_factor = self.scale_factor;
        let Some(surface) = self.surface.as_mut() else {
            debug!("ensure_text_layer before initialize is a no-op");
            return;
        };
        if surface.text.is_some() {
            return;
        }

        let position = Point::new(
            f64::from(surface.logical_width) / 2.0 - f64::from(defaults.box_width) / 2.0,
            f64::from(surface.logical_height) / 2.0,
        );
        surface.text = Some(TextLayer {
            content: defaults.placeholder.clone(),
            font_family: defaults.font_family.clone(),
            font_size_display: defaults.display_font_size,
            font_size_logical: scale::to_logical_font_size(
                defaults.display_font_size,
                scale_factor,
            ),
            fill_color: defaults.fill_color,
            position,
            rotation_deg: 0.0,
            scale: 1.0,
            box_width: defaults.box_width,
        });
        self.dirty = true;
    }

    pub fn text_layer(&self) -> Option<&TextLayer> {
        self.surface.as_ref().and_then(|s| s.text.as_ref())
    }

    pub(crate) fn text_layer_mut(&mut self) -> Option<&mut TextLayer> {
        self.surface.as_mut().and_then(|s| s.text.as_mut())
    }

    /// Overwrite the text layer's content without rendering. Returns whether
    /// a text layer existed to mutate.
    pub(crate) fn set_text_content(&mut self, content: &str) -> bool {
        let Some(text) = self.text_layer_mut() else {
            return false;
        };
        if text.content != content {
            text.content = content.to_string();
        }
        self.dirty = true;
        true
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recomposite background and text layer into the session frame.
    /// Mutations are not rendered until this is called.
    pub fn render(&mut self) -> ScrivoResult<()> {
        let surface = self.surface.as_ref().ok_or(ScrivoError::NoSurface)?;
        let frame = render::compose(surface, &mut self.fonts)?;
        self.frame = Some(frame);
        self.dirty = false;
        Ok(())
    }

    /// Last rendered composite, if any.
    pub fn frame(&self) -> Option<&FrameRgba> {
        self.frame.as_ref()
    }

    /// Release the surface and frame. The session may be initialized again
    /// afterwards (view remount).
    pub fn dispose(&mut self) {
        info!("disposing canvas");
        self.surface = None;
        self.frame = None;
        self.dirty = false;
    }

    fn recompute_scale(&mut self) {
        let (w, h) = self.logical_size().unwrap_or((0, 0));
        self.scale_factor = scale::compute_scale_factor(self.viewport_width, w, h);

        // The display-to-logical mapping is reapplied on every factor
        // change so glyphs keep their on-screen size.
        let factor = self.scale_factor;
        if let Some(text) = self.surface.as_mut().and_then(|s| s.text.as_mut()) {
            let logical = scale::to_logical_font_size(text.font_size_display, factor);
            if (logical - text.font_size_logical).abs() > f32::EPSILON {
                text.font_size_logical = logical;
                self.dirty = true;
            }
        }
    }
}

fn background_from_prepared(prepared: &PreparedImage) -> ScrivoResult<BackgroundLayer> {
    let expected = (prepared.width as usize)
        .checked_mul(prepared.height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| ScrivoError::validation("background byte size overflow"))?;
    if prepared.rgba8_premul.len() != expected {
        return Err(ScrivoError::validation(
            "prepared background byte length mismatch",
        ));
    }
    u16::try_from(prepared.width)
        .and_then(|_| u16::try_from(prepared.height))
        .map_err(|_| ScrivoError::validation("background dimensions exceed u16"))?;

    Ok(BackgroundLayer {
        width: prepared.width,
        height: prepared.height,
        rgba8_premul: prepared.rgba8_premul.clone(),
    })
}
