//! Encode pipeline: decode, route, encode, finalize, fallback.
//!
//! Processes one candidate at a time. Every failure is terminal for the
//! single file it concerns: decode failures abandon the file with no state
//! change, a failed primary encode gets exactly one JPEG fallback attempt,
//! and a failed fallback leaves the original untouched and unmarked. All
//! outcomes land in the event log.

use crate::codec::{EncodeOptions, ImageCodec};
use crate::events::EventLog;
use crate::router::{route, OutputFormat, LOSSY_QUALITY};
use crate::scan::LITE_SUFFIX;
use crate::store::MetadataStore;
use std::fs;
use std::path::{Path, PathBuf};

/// User options consumed by the pipeline, read at decision time.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Delete the source file after its output is finalized.
    pub delete_originals: bool,
    /// Convert alpha-free PNG inputs to JPEG.
    pub convert_png_to_jpeg: bool,
}

/// Terminal outcome of processing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// An output file was finalized and the path was marked processed.
    Compressed {
        output: PathBuf,
        original_removed: bool,
        fallback_used: bool,
    },
    /// The file could not be decoded; nothing was written or recorded.
    DecodeFailed,
    /// Both the primary encode and the JPEG fallback failed; the original
    /// is untouched and the path was not marked processed.
    Failed,
}

/// Constructs the output path for a given source file and extension.
///
/// The output is a sibling of the source: `/dir/photo.png` with extension
/// `jpeg` becomes `/dir/photo_lite.jpeg`.
pub fn lite_output_path(source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}{}.{}", stem, LITE_SUFFIX, extension);
    match source.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Process one candidate file through decode, routing, encode, and
/// finalization.
///
/// On a primary encode failure a single fallback re-encodes the already
/// decoded image as JPEG to `<base>_lite.jpeg`. No further retries happen;
/// a file whose fallback also failed is only revisited if its modification
/// time moves past the watermark again.
pub fn process_file(
    path: &Path,
    codec: &dyn ImageCodec,
    store: &MetadataStore,
    log: &EventLog,
    options: &PipelineOptions,
) -> FileOutcome {
    log.info(format!("discovered {}", path.display()));

    let decoded = match codec.decode(path) {
        Ok(decoded) => decoded,
        Err(e) => {
            log.error(format!("decode failed for {}: {}", path.display(), e));
            return FileOutcome::DecodeFailed;
        }
    };

    let original_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let decision = route(
        decoded.format,
        &original_ext,
        decoded.has_alpha,
        options.convert_png_to_jpeg,
        codec,
    );

    let output = lite_output_path(path, decision.extension);
    remove_stale_output(&output);

    let encode_options = EncodeOptions {
        format: decision.format,
        quality: decision.quality,
        metadata: decoded.metadata.clone(),
        embed_thumbnail: false,
    };

    match codec.encode(&decoded, &output, &encode_options) {
        Ok(()) => finalize(path, &output, false, store, log, options),
        Err(primary) => {
            log.error(format!(
                "compression to {} failed for {}: {}",
                decision.format,
                path.display(),
                primary
            ));

            log.warn(format!("attempting jpeg fallback for {}", path.display()));
            let fallback_output = lite_output_path(path, OutputFormat::Jpeg.extension());
            remove_stale_output(&fallback_output);

            let fallback_options = EncodeOptions {
                format: OutputFormat::Jpeg,
                quality: Some(LOSSY_QUALITY),
                metadata: decoded.metadata.clone(),
                embed_thumbnail: false,
            };

            match codec.encode(&decoded, &fallback_output, &fallback_options) {
                Ok(()) => finalize(path, &fallback_output, true, store, log, options),
                Err(fallback) => {
                    log.error(format!(
                        "jpeg fallback failed for {}: {}",
                        path.display(),
                        fallback
                    ));
                    FileOutcome::Failed
                }
            }
        }
    }
}

/// Overwrite semantics: delete a pre-existing output, best-effort. A failed
/// delete is left for the encode attempt itself to surface.
fn remove_stale_output(output: &Path) {
    if output.exists() {
        let _ = fs::remove_file(output);
    }
}

/// Mark the path processed, optionally delete the original, and log the
/// outcome.
fn finalize(
    source: &Path,
    output: &Path,
    fallback_used: bool,
    store: &MetadataStore,
    log: &EventLog,
    options: &PipelineOptions,
) -> FileOutcome {
    if let Err(e) = store.mark_processed(source) {
        log.warn(format!(
            "state snapshot not persisted ({}); tracking {} in memory only",
            e,
            source.display()
        ));
    }

    let mut original_removed = false;
    if options.delete_originals {
        match fs::remove_file(source) {
            Ok(()) => original_removed = true,
            Err(e) => log.warn(format!(
                "could not remove original {}: {}",
                source.display(),
                e
            )),
        }
    }

    log.info(format!(
        "compressed {} -> {} ({})",
        source.display(),
        output.display(),
        if original_removed {
            "original removed"
        } else {
            "original kept"
        }
    ));

    FileOutcome::Compressed {
        output: output.to_path_buf(),
        original_removed,
        fallback_used,
    }
}
