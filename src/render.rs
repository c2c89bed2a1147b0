use kurbo::Affine;

use crate::{
    error::{ScrivoError, ScrivoResult},
    fonts::FontLibrary,
    session::{BackgroundLayer, Surface, TextLayer},
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A rendered composite at the canvas's logical size.
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

/// Rasterize the surface: clear color, then background layer stretched to
/// the logical dimensions, then the text layer at its current transform.
pub(crate) fn compose(surface: &Surface, fonts: &mut FontLibrary) -> ScrivoResult<FrameRgba> {
    let width_u16: u16 = surface
        .logical_width
        .try_into()
        .map_err(|_| ScrivoError::validation("surface width exceeds u16"))?;
    let height_u16: u16 = surface
        .logical_height
        .try_into()
        .map_err(|_| ScrivoError::validation("surface height exceeds u16"))?;
    if width_u16 == 0 || height_u16 == 0 {
        return Err(ScrivoError::validation("surface dimensions must be > 0"));
    }

    let mut pixmap = vello_cpu::Pixmap::new(width_u16, height_u16);
    let mut ctx = vello_cpu::RenderContext::new(width_u16, height_u16);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    // Surface color goes through the context too; render_to_pixmap
    // overwrites the buffer, so pre-written pixels would be lost.
    let [r, g, b, a] = surface.clear_rgba;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(surface.logical_width),
        f64::from(surface.logical_height),
    ));

    if let Some(bg) = &surface.background {
        draw_background(&mut ctx, bg, surface.logical_width, surface.logical_height)?;
    }
    if let Some(text) = &surface.text {
        draw_text(&mut ctx, text, fonts)?;
    }

    ctx.flush();
    ctx.render_to_pixmap(&mut pixmap);

    Ok(FrameRgba {
        width: surface.logical_width,
        height: surface.logical_height,
        data: pixmap.data_as_u8_slice().to_vec(),
        premultiplied: true,
    })
}

/// Paint the background stretched to exactly the logical dimensions.
fn draw_background(
    ctx: &mut vello_cpu::RenderContext,
    bg: &BackgroundLayer,
    logical_width: u32,
    logical_height: u32,
) -> ScrivoResult<()> {
    let pixmap = image_premul_bytes_to_pixmap(&bg.rgba8_premul, bg.width, bg.height)?;
    let paint = vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(std::sync::Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    };

    let sx = f64::from(logical_width) / f64::from(bg.width);
    let sy = f64::from(logical_height) / f64::from(bg.height);
    ctx.set_transform(affine_to_cpu(Affine::scale_non_uniform(sx, sy)));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(bg.width),
        f64::from(bg.height),
    ));
    Ok(())
}

fn draw_text(
    ctx: &mut vello_cpu::RenderContext,
    text: &TextLayer,
    fonts: &mut FontLibrary,
) -> ScrivoResult<()> {
    if fonts.families().is_empty() {
        // Browser-canvas behavior: an unresolvable font never fails the
        // paint. With an empty catalog there is nothing to shape with.
        tracing::warn!("no fonts registered, skipping text layer");
        return Ok(());
    }

    let (layout, resolved) = fonts.layout(
        &text.content,
        &text.font_family,
        text.font_size_logical,
        text.fill_color,
        Some(text.box_width),
    )?;
    let font = fonts.font_data(&resolved)?;

    let transform = Affine::translate(text.position.to_vec2())
        * Affine::rotate(text.rotation_deg.to_radians())
        * Affine::scale(text.scale);
    ctx.set_transform(affine_to_cpu(transform));

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };

            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));

            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(&font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }

    Ok(())
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn image_premul_bytes_to_pixmap(
    rgba8_premul: &[u8],
    width: u32,
    height: u32,
) -> ScrivoResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ScrivoError::validation("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ScrivoError::validation("image height exceeds u16"))?;
    if rgba8_premul.len() != width as usize * height as usize * 4 {
        return Err(ScrivoError::validation(
            "prepared image byte length mismatch",
        ));
    }

    let mut may_have_opacities = false;
    let mut pixels =
        Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(width as usize * height as usize);
    for px in rgba8_premul.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }

    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}
