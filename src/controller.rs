use std::time::{Duration, Instant};

use tracing::debug;

use crate::{
    error::{ScrivoError, ScrivoResult},
    fonts::Rgba8,
    scale,
    session::CanvasSession,
};

/// Quiet period after the last content edit before the pending value is
/// applied. Bounds render frequency during typing without dropping the
/// final value.
pub const CONTENT_QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Inclusive display-space font size range accepted from the slider.
pub const MIN_DISPLAY_FONT_SIZE: u32 = 10;
pub const MAX_DISPLAY_FONT_SIZE: u32 = 200;

#[derive(Debug)]
struct PendingContent {
    value: String,
    last_call: Instant,
}

/// Applies text-content, font, size, and color updates to the session's
/// single text layer.
///
/// Content updates arrive at keystroke rate and are damped: each call
/// replaces the pending value and restarts the quiet period; [`poll`]
/// applies it once the period elapses. The other setters fire at
/// UI-interaction rate and apply immediately. Every setter is a no-op when
/// no text layer exists yet; applied mutations trigger a render.
///
/// [`poll`]: TextController::poll
#[derive(Debug)]
pub struct TextController {
    pending: Option<PendingContent>,
    quiet: Duration,
}

impl Default for TextController {
    fn default() -> Self {
        Self::new()
    }
}

impl TextController {
    pub fn new() -> Self {
        Self::with_quiet_period(CONTENT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet: Duration) -> Self {
        Self {
            pending: None,
            quiet,
        }
    }

    /// Record a damped content update. Cancels any previously pending value.
    pub fn set_content(&mut self, text: impl Into<String>, now: Instant) {
        self.pending = Some(PendingContent {
            value: text.into(),
            last_call: now,
        });
    }

    pub fn has_pending_content(&self) -> bool {
        self.pending.is_some()
    }

    /// Apply the pending content once the quiet period has elapsed.
    /// Returns whether a mutation was applied.
    pub fn poll(&mut self, session: &mut CanvasSession, now: Instant) -> ScrivoResult<bool> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.last_call) >= self.quiet);
        if !due {
            return Ok(false);
        }
        self.apply_pending(session)
    }

    /// Apply any pending content immediately, ignoring the quiet period.
    pub fn flush(&mut self, session: &mut CanvasSession) -> ScrivoResult<bool> {
        self.apply_pending(session)
    }

    fn apply_pending(&mut self, session: &mut CanvasSession) -> ScrivoResult<bool> {
        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };
        if !session.set_text_content(&pending.value) {
            debug!("content update dropped, no text layer yet");
            return Ok(false);
        }
        session.render()?;
        Ok(true)
    }

    /// Immediately switch the text layer's font family.
    pub fn set_font(&mut self, session: &mut CanvasSession, family: &str) -> ScrivoResult<bool> {
        let Some(text) = session.text_layer_mut() else {
            return Ok(false);
        };
        text.font_family = family.to_string();
        session.mark_dirty();
        session.render()?;
        Ok(true)
    }

    /// Immediately set the fill color from a 6-digit hex string.
    pub fn set_color(&mut self, session: &mut CanvasSession, hex: &str) -> ScrivoResult<bool> {
        if session.text_layer().is_none() {
            return Ok(false);
        }
        let color = Rgba8::from_hex(hex)?;
        if let Some(text) = session.text_layer_mut() {
            text.fill_color = color;
        }
        session.mark_dirty();
        session.render()?;
        Ok(true)
    }

    /// Immediately set the font size from a display-space slider value.
    ///
    /// The stored logical size is `display / scale_factor` so glyphs stay
    /// visually stable regardless of the display scale; the result depends
    /// only on the latest call.
    pub fn set_font_size(
        &mut self,
        session: &mut CanvasSession,
        display_size: u32,
    ) -> ScrivoResult<bool> {
        if session.text_layer().is_none() {
            return Ok(false);
        }
        if !(MIN_DISPLAY_FONT_SIZE..=MAX_DISPLAY_FONT_SIZE).contains(&display_size) {
            return Err(ScrivoError::validation(format!(
                "display font size must be in [{MIN_DISPLAY_FONT_SIZE}, {MAX_DISPLAY_FONT_SIZE}], got {display_size}"
            )));
        }

        let logical = scale::to_logical_font_size(display_size as f32, session.scale_factor());
        if let Some(text) = session.text_layer_mut() {
            text.font_size_display = display_size as f32;
            text.font_size_logical = logical;
        }
        session.mark_dirty();
        session.render()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TextLayerDefaults;

    fn session_with_text_layer() -> CanvasSession {
        let mut session = CanvasSession::new();
        session.set_viewport_width(800.0);
        session.initialize(400, 400);
        session.ensure_text_layer(&TextLayerDefaults::default());
        session
    }

    #[test]
    fn rapid_content_edits_collapse_to_one_mutation() {
        let mut session = session_with_text_layer();
        let mut controller = TextController::new();
        let t0 = Instant::now();

        for (i, value) in ["H", "Ha", "Ham", "Hamz", "Hamzah"].iter().enumerate() {
            let at = t0 + Duration::from_millis(10 * i as u64);
            controller.set_content(*value, at);
            // nothing is due while calls keep arriving inside the window
            assert!(!controller.poll(&mut session, at).unwrap());
        }
        assert_eq!(session.text_layer().unwrap().content, "Sample Text");

        let quiet_elapsed = t0 + Duration::from_millis(40) + CONTENT_QUIET_PERIOD;
        assert!(controller.poll(&mut session, quiet_elapsed).unwrap());
        assert_eq!(session.text_layer().unwrap().content, "Hamzah");

        // pending is consumed; a second poll applies nothing
        assert!(!controller.poll(&mut session, quiet_elapsed).unwrap());
    }

    #[test]
    fn flush_applies_pending_immediately() {
        let mut session = session_with_text_layer();
        let mut controller = TextController::new();
        controller.set_content("Sara", Instant::now());
        assert!(controller.flush(&mut session).unwrap());
        assert_eq!(session.text_layer().unwrap().content, "Sara");
    }

    #[test]
    fn setters_are_noops_without_a_text_layer() {
        let mut session = CanvasSession::new();
        session.initialize(400, 400);
        let mut controller = TextController::new();

        assert!(!controller.set_font(&mut session, "Cairo").unwrap());
        assert!(!controller.set_color(&mut session, "#ff0000").unwrap());
        assert!(!controller.set_font_size(&mut session, 40).unwrap());

        controller.set_content("dropped", Instant::now());
        assert!(!controller.flush(&mut session).unwrap());
    }

    #[test]
    fn set_color_validates_hex() {
        let mut session = session_with_text_layer();
        let mut controller = TextController::new();
        assert!(controller.set_color(&mut session, "#12345").is_err());
        assert!(controller.set_color(&mut session, "#00B0F0").unwrap());
        assert_eq!(
            session.text_layer().unwrap().fill_color,
            Rgba8::opaque(0x00, 0xB0, 0xF0)
        );
    }

    #[test]
    fn set_font_size_validates_range_and_divides_by_factor() {
        let mut session = session_with_text_layer();
        let mut controller = TextController::new();

        assert!(controller.set_font_size(&mut session, 9).is_err());
        assert!(controller.set_font_size(&mut session, 201).is_err());

        // 400x400 surface at wide viewport: factor capped at 0.5
        assert!(controller.set_font_size(&mut session, 40).unwrap());
        let text = session.text_layer().unwrap();
        assert!((text.font_size_display - 40.0).abs() < 1e-4);
        assert!((text.font_size_logical - 80.0).abs() < 1e-4);

        // final-state, not cumulative
        controller.set_font_size(&mut session, 100).unwrap();
        controller.set_font_size(&mut session, 40).unwrap();
        let logical = session.text_layer().unwrap().font_size_logical;
        assert!((logical - 80.0).abs() < 1e-4);
    }

    #[test]
    fn set_font_applies_immediately() {
        let mut session = session_with_text_layer();
        let mut controller = TextController::new();
        assert!(controller.set_font(&mut session, "Lateef").unwrap());
        assert_eq!(session.text_layer().unwrap().font_family, "Lateef");
    }
}
