//! Canvas composition and batch export for personalized invitations.
//!
//! A [`CanvasSession`] holds one background layer (an ingested template
//! image) and one editable text layer, composited on demand into an RGBA
//! frame. [`export_batch`] substitutes each recipient name into the text
//! layer and bundles the rendered PNGs into a single ZIP archive.

#![forbid(unsafe_code)]

pub mod controller;
pub mod error;
pub mod export;
pub mod fonts;
pub mod ingest;
pub mod names;
pub mod render;
pub mod scale;
pub mod session;

pub use controller::{
    CONTENT_QUIET_PERIOD, MAX_DISPLAY_FONT_SIZE, MIN_DISPLAY_FONT_SIZE, TextController,
};
pub use error::{ScrivoError, ScrivoResult};
pub use export::{BatchExport, BatchFailure, ExportArtifact, export_batch, export_current};
pub use fonts::{FontLibrary, Rgba8};
pub use ingest::{IngestedImage, MAX_DIMENSION, PreparedImage, ingest};
pub use names::NameList;
pub use render::FrameRgba;
pub use scale::{SCALE_CAP, compute_scale_factor, to_logical_font_size};
pub use session::{CanvasSession, EditPolicies, TextLayer, TextLayerDefaults};
