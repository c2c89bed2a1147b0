//! Display-to-logical scale model.
//!
//! The canvas is rendered and encoded at its logical pixel size; on-screen
//! presentation shrinks it by a scale factor. The factor never exceeds
//! [`SCALE_CAP`], so the canvas is never displayed above its logical size,
//! and it never affects exported pixel data.

/// Hard cap on the display scale factor, also the fallback for degenerate
/// (zero-sized) canvases.
pub const SCALE_CAP: f64 = 0.5;

/// Maximum on-screen canvas height in display pixels.
pub const TARGET_DISPLAY_HEIGHT: f64 = 500.0;

/// Viewports wider than this get the wide display-width budget.
pub const VIEWPORT_BREAKPOINT: f64 = 640.0;

/// Target display width above the breakpoint.
pub const TARGET_DISPLAY_WIDTH_WIDE: f64 = 400.0;

/// Target display width at or below the breakpoint.
pub const TARGET_DISPLAY_WIDTH_NARROW: f64 = 300.0;

/// Compute the display/logical scale factor for the current viewport.
pub fn compute_scale_factor(viewport_width: f64, logical_width: u32, logical_height: u32) -> f64 {
    if logical_width == 0 || logical_height == 0 {
        return SCALE_CAP;
    }

    let target_width = if viewport_width > VIEWPORT_BREAKPOINT {
        TARGET_DISPLAY_WIDTH_WIDE
    } else {
        TARGET_DISPLAY_WIDTH_NARROW
    };

    (target_width / f64::from(logical_width))
        .min(TARGET_DISPLAY_HEIGHT / f64::from(logical_height))
        .min(SCALE_CAP)
}

/// Map a display-space font size (what the slider shows) to the logical
/// size the text layer must carry so glyphs look the same at any display
/// scale. Reapplied whenever the slider value or the factor changes; the
/// result depends only on the latest inputs.
pub fn to_logical_font_size(display_size: f32, factor: f64) -> f32 {
    debug_assert!(factor > 0.0);
    (f64::from(display_size) / factor) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_viewport_scenario_from_contract() {
        // 800px viewport, 1600x1200 image: min(400/1600, 500/1200, 0.5) = 0.25
        let factor = compute_scale_factor(800.0, 1600, 1200);
        assert!((factor - 0.25).abs() < 1e-9);
        assert!((to_logical_font_size(40.0, factor) - 160.0).abs() < 1e-4);
    }

    #[test]
    fn narrow_viewport_uses_smaller_width_budget() {
        let factor = compute_scale_factor(600.0, 1600, 1200);
        assert!((factor - 300.0 / 1600.0).abs() < 1e-9);
    }

    #[test]
    fn small_canvases_hit_the_cap() {
        assert_eq!(compute_scale_factor(800.0, 100, 100), SCALE_CAP);
    }

    #[test]
    fn zero_dimensions_fall_back_to_cap() {
        assert_eq!(compute_scale_factor(800.0, 0, 100), SCALE_CAP);
        assert_eq!(compute_scale_factor(800.0, 100, 0), SCALE_CAP);
    }

    #[test]
    fn tall_canvas_is_bounded_by_display_height() {
        let factor = compute_scale_factor(800.0, 400, 4000);
        assert!((factor - 500.0 / 4000.0).abs() < 1e-9);
    }

    #[test]
    fn font_size_mapping_is_final_state_idempotent() {
        let factor = 0.25;
        let mut logical = 0.0f32;
        for display in [10.0f32, 55.0, 200.0, 40.0] {
            logical = to_logical_font_size(display, factor);
        }
        assert!((logical - 160.0).abs() < 1e-4);
    }
}
