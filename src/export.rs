use std::{
    collections::{HashMap, HashSet},
    io::{Cursor, Write as _},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context as _;
use rayon::prelude::*;
use tracing::warn;
use zip::write::FileOptions;

use crate::{
    error::{ScrivoError, ScrivoResult},
    render::FrameRgba,
    session::CanvasSession,
};

/// Top-level folder inside the batch archive.
const ARCHIVE_FOLDER: &str = "invitations";

#[derive(Clone, Debug)]
/// A named raster (or archive) byte buffer ready for download.
pub struct ExportArtifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
/// A per-name cycle that failed during a batch run. The text layer was
/// restored before the failure was recorded.
pub struct BatchFailure {
    pub name: String,
    pub error: ScrivoError,
}

#[derive(Debug)]
/// Outcome of a batch export: the archive plus any skipped names.
///
/// A failing per-name cycle never aborts the batch; it is recorded here and
/// the remaining names still export (skip-and-continue policy).
pub struct BatchExport {
    pub artifact: ExportArtifact,
    pub failed: Vec<BatchFailure>,
}

/// Encode the session composite as it currently stands into one PNG,
/// lossless at 1:1 logical scale.
pub fn export_current(session: &mut CanvasSession) -> ScrivoResult<ExportArtifact> {
    if !session.is_initialized() {
        return Err(ScrivoError::NoSurface);
    }
    session.render()?;
    let frame = session.frame().ok_or(ScrivoError::NoSurface)?;
    let bytes = encode_png(frame)?;
    Ok(ExportArtifact {
        name: format!("invitation-{}.png", unix_epoch_ms()),
        bytes,
    })
}

/// Export one PNG per name, in list order, bundled into a single ZIP.
///
/// Each cycle substitutes the name into the text layer, renders, snapshots
/// the frame, then restores the prior content and renders again; the
/// exclusive borrow of the session keeps cycles serialized, so no caller
/// can observe the substituted text. Snapshots are PNG-encoded in parallel
/// once all cycles are done, and the archive is assembled in one final
/// step. Duplicate names get suffixed entries (`Alice.png`, `Alice-2.png`)
/// rather than silently overwriting each other.
#[tracing::instrument(skip_all, fields(names = names.len()))]
pub fn export_batch(session: &mut CanvasSession, names: &[String]) -> ScrivoResult<BatchExport> {
    if names.is_empty() {
        return Err(ScrivoError::EmptyNameList);
    }
    if !session.is_initialized() {
        return Err(ScrivoError::NoSurface);
    }

    let mut namer = EntryNamer::default();
    let mut snapshots: Vec<(String, String, FrameRgba)> = Vec::with_capacity(names.len());
    let mut failed = Vec::new();

    for name in names {
        let entry = namer.entry_for(name);
        match snapshot_with_name(session, name) {
            Ok(frame) => snapshots.push((name.clone(), entry, frame)),
            Err(error) => {
                warn!(name = %name, %error, "skipping name after failed cycle");
                failed.push(BatchFailure {
                    name: name.clone(),
                    error,
                });
            }
        }
    }

    let encoded: Vec<(String, String, ScrivoResult<Vec<u8>>)> = snapshots
        .into_par_iter()
        .map(|(name, entry, frame)| {
            let bytes = encode_png(&frame);
            (name, entry, bytes)
        })
        .collect();

    let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    archive
        .add_directory(format!("{ARCHIVE_FOLDER}/"), options)
        .context("create archive folder")?;

    for (name, entry, bytes) in encoded {
        match bytes {
            Ok(bytes) => {
                archive
                    .start_file(format!("{ARCHIVE_FOLDER}/{entry}"), options)
                    .with_context(|| format!("start archive entry '{entry}'"))?;
                archive
                    .write_all(&bytes)
                    .with_context(|| format!("write archive entry '{entry}'"))?;
            }
            Err(error) => {
                warn!(name = %name, %error, "skipping name after failed encode");
                failed.push(BatchFailure { name, error });
            }
        }
    }

    let cursor = archive.finish().context("finalize archive")?;
    Ok(BatchExport {
        artifact: ExportArtifact {
            name: format!("invitations-{}.zip", unix_epoch_ms()),
            bytes: cursor.into_inner(),
        },
        failed,
    })
}

/// One substitution cycle: save content, substitute, render, snapshot,
/// restore, render. Restoration runs on every path before a cycle failure
/// propagates, so a bad name never corrupts the next cycle's state.
fn snapshot_with_name(session: &mut CanvasSession, name: &str) -> ScrivoResult<FrameRgba> {
    let saved = session.text_layer().map(|t| t.content.clone());

    session.set_text_content(name);
    let frame = session
        .render()
        .and_then(|()| session.frame().cloned().ok_or(ScrivoError::NoSurface));

    let restored = match saved {
        Some(saved) => {
            session.set_text_content(&saved);
            session.render()
        }
        None => Ok(()),
    };

    let frame = frame?;
    restored?;
    Ok(frame)
}

/// PNG-encode a frame, converting premultiplied pixels back to straight
/// alpha first.
pub fn encode_png(frame: &FrameRgba) -> ScrivoResult<Vec<u8>> {
    let mut data = frame.data.clone();
    if frame.premultiplied {
        unpremultiply_rgba8_in_place(&mut data);
    }

    let img = image::RgbaImage::from_raw(frame.width, frame.height, data)
        .ok_or_else(|| ScrivoError::validation("frame byte length mismatch"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

#[derive(Default)]
struct EntryNamer {
    seen: HashMap<String, u32>,
    emitted: HashSet<String>,
}

impl EntryNamer {
    /// Final entry names are globally unique: the suffix keeps bumping
    /// until the candidate does not collide with anything already emitted,
    /// including literal names that look like suffixed ones ("Alice-2").
    fn entry_for(&mut self, name: &str) -> String {
        let base = sanitize_entry_name(name);
        let n = self.seen.entry(base.clone()).or_insert(0);
        loop {
            *n += 1;
            let candidate = if *n == 1 {
                format!("{base}.png")
            } else {
                format!("{base}-{n}.png")
            };
            if self.emitted.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Keep every entry inside the archive folder: path separators and control
/// characters are replaced, and an empty name gets a stable placeholder.
fn sanitize_entry_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

fn unix_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
