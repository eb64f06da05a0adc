//! Decode/encode boundary around the image codec library.
//!
//! The pipeline talks to codecs through the [`ImageCodec`] trait: decode a
//! file into a raw image plus its metadata and detected container, query
//! which containers are writable, and encode one frame to a destination
//! path. [`ImageRsCodec`] is the production implementation on the `image`
//! crate.

use crate::router::{EncoderCapabilities, OutputFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageDecoder, ImageEncoder, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// JPEG quality used when the router did not supply one.
const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Errors that can occur while decoding an image file.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to open or probe the file.
    #[error("failed to open image: {0}")]
    Open(#[from] std::io::Error),

    /// The file is corrupt or not a decodable image.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Errors that can occur while encoding to the destination file.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Failed to create or write the output file.
    #[error("failed to write output file: {0}")]
    Io(std::io::Error),

    /// No encoder is available for the requested container.
    #[error("no encoder available for {0}")]
    UnsupportedFormat(OutputFormat),

    /// The encoder rejected the image.
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Metadata captured at decode time and carried to the encoder.
///
/// Opaque to the pipeline; backends apply whatever their encoders support.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    /// Raw EXIF blob, when the source carried one.
    pub exif: Option<Vec<u8>>,
    /// ICC color profile bytes, when the source carried one.
    pub icc_profile: Option<Vec<u8>>,
}

/// A decoded image: first frame only, plus what the decoder learned about it.
pub struct DecodedImage {
    /// Raw pixel data of the first frame.
    pub image: DynamicImage,
    /// Container the decoder actually detected, when it maps to one of the
    /// output containers. May differ from the file extension.
    pub format: Option<OutputFormat>,
    /// True when the pixel layout carries an alpha channel.
    pub has_alpha: bool,
    /// Metadata captured from the source.
    pub metadata: ImageMetadata,
}

/// Options for one encode attempt.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Destination container.
    pub format: OutputFormat,
    /// Quality in `[0, 1]` for lossy containers; `None` means lossless or
    /// encoder default.
    pub quality: Option<f32>,
    /// Source metadata to carry over.
    pub metadata: ImageMetadata,
    /// Whether to embed a preview thumbnail. The pipeline always disables
    /// this.
    pub embed_thumbnail: bool,
}

/// Codec capability boundary used by the encode pipeline.
pub trait ImageCodec: EncoderCapabilities + Send + Sync {
    /// Decode the first frame of the file at `path` along with its metadata.
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;

    /// Encode one frame of `source` to `dest` per `options`.
    ///
    /// Success means the destination file was durably finalized.
    fn encode(
        &self,
        source: &DecodedImage,
        dest: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EncodeError>;
}

/// Production codec backed by the `image` crate.
///
/// Writes JPEG, PNG, TIFF, and (lossless) WebP; HEIC is not writable, so
/// routing falls back to JPEG for it. EXIF cannot be re-embedded by this
/// backend; ICC profiles are re-attached where the destination encoder
/// supports them.
pub struct ImageRsCodec;

impl EncoderCapabilities for ImageRsCodec {
    fn can_write(&self, format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Heic)
    }
}

impl ImageCodec for ImageRsCodec {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format().and_then(output_format_for);

        let mut decoder = reader.into_decoder()?;
        let exif = decoder.exif_metadata().ok().flatten();
        let icc_profile = decoder.icc_profile().ok().flatten();
        let image = DynamicImage::from_decoder(decoder)?;
        let has_alpha = image.color().has_alpha();

        Ok(DecodedImage {
            image,
            format,
            has_alpha,
            metadata: ImageMetadata { exif, icc_profile },
        })
    }

    fn encode(
        &self,
        source: &DecodedImage,
        dest: &Path,
        options: &EncodeOptions,
    ) -> Result<(), EncodeError> {
        let file = File::create(dest).map_err(EncodeError::Io)?;
        let mut writer = BufWriter::new(file);

        match options.format {
            OutputFormat::Jpeg => {
                let mut encoder =
                    JpegEncoder::new_with_quality(&mut writer, jpeg_quality(options.quality));
                if let Some(icc) = options.metadata.icc_profile.clone() {
                    let _ = encoder.set_icc_profile(icc);
                }
                // JPEG has no alpha channel; flatten instead of failing.
                if source.has_alpha {
                    DynamicImage::ImageRgb8(source.image.to_rgb8()).write_with_encoder(encoder)?;
                } else {
                    source.image.write_with_encoder(encoder)?;
                }
            }
            OutputFormat::Png => {
                let mut encoder = PngEncoder::new(&mut writer);
                if let Some(icc) = options.metadata.icc_profile.clone() {
                    let _ = encoder.set_icc_profile(icc);
                }
                source.image.write_with_encoder(encoder)?;
            }
            OutputFormat::Tiff => {
                let encoder = TiffEncoder::new(&mut writer);
                source.image.write_with_encoder(encoder)?;
            }
            OutputFormat::WebP => {
                let encoder = WebPEncoder::new_lossless(&mut writer);
                source.image.write_with_encoder(encoder)?;
            }
            OutputFormat::Heic => {
                return Err(EncodeError::UnsupportedFormat(OutputFormat::Heic));
            }
        }

        writer.flush().map_err(EncodeError::Io)?;
        Ok(())
    }
}

/// Maps a detected `image` crate format to an output container, when one
/// exists for it.
fn output_format_for(format: image::ImageFormat) -> Option<OutputFormat> {
    match format {
        image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        image::ImageFormat::Png => Some(OutputFormat::Png),
        image::ImageFormat::Tiff => Some(OutputFormat::Tiff),
        image::ImageFormat::WebP => Some(OutputFormat::WebP),
        _ => None,
    }
}

/// Scales a `[0, 1]` quality to the encoder's 1-100 range.
fn jpeg_quality(quality: Option<f32>) -> u8 {
    match quality {
        Some(q) => (q.clamp(0.0, 1.0) * 100.0).round() as u8,
        None => DEFAULT_JPEG_QUALITY,
    }
}
