//! Format router for choosing the output container of a compressed image.
//!
//! Pure decision logic: given what the decoder actually found, the file's
//! extension, and the user's conversion preference, pick a destination
//! container, whether lossy compression applies, and the quality level.
//! Encoder availability is injected through [`EncoderCapabilities`] so the
//! router never touches a codec library.

use serde::{Deserialize, Serialize};

/// Quality level used for every lossy destination.
pub const LOSSY_QUALITY: f32 = 0.7;

/// Output container formats the router can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Tiff,
    Heic,
    WebP,
}

impl OutputFormat {
    /// File extension derived from the container, without the dot.
    ///
    /// The output extension always comes from the chosen destination, never
    /// from the input file, so a PNG routed to JPEG produces a `.jpeg` file.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Heic => "heic",
            OutputFormat::WebP => "webp",
        }
    }

    /// Whether this container gets the lossy quality knob.
    /// PNG and TIFF are written lossless with encoder defaults.
    pub fn is_lossy(self) -> bool {
        matches!(
            self,
            OutputFormat::Jpeg | OutputFormat::Heic | OutputFormat::WebP
        )
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Jpeg => write!(f, "jpeg"),
            OutputFormat::Png => write!(f, "png"),
            OutputFormat::Tiff => write!(f, "tiff"),
            OutputFormat::Heic => write!(f, "heic"),
            OutputFormat::WebP => write!(f, "webp"),
        }
    }
}

/// Capability lookup against the runtime's available encoders.
pub trait EncoderCapabilities {
    /// Returns true if an encoder for `format` is available.
    fn can_write(&self, format: OutputFormat) -> bool;
}

/// The routing outcome for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    /// Destination container.
    pub format: OutputFormat,
    /// Whether lossy compression applies.
    pub lossy: bool,
    /// Quality in `[0, 1]`; present exactly when `lossy` is true.
    pub quality: Option<f32>,
    /// Extension for the output file, derived from `format`.
    pub extension: &'static str,
}

impl RouteDecision {
    fn for_format(format: OutputFormat) -> Self {
        let lossy = format.is_lossy();
        Self {
            format,
            lossy,
            quality: lossy.then_some(LOSSY_QUALITY),
            extension: format.extension(),
        }
    }
}

/// Choose the destination container for one input file.
///
/// Decision order:
/// 1. Alpha-free PNG inputs convert to JPEG when the user enabled the
///    conversion. PNG is lossless, so this is where the large savings are;
///    inputs with an alpha channel refuse this path because JPEG cannot
///    represent alpha.
/// 2. Otherwise the original container is preserved when an encoder for the
///    detected source format exists.
/// 3. Otherwise the extension decides: jpg/jpeg to JPEG, png to PNG,
///    tiff/tif to TIFF, heic and webp to themselves when writable and to
///    JPEG when not, anything else to JPEG.
///
/// `source_tag` is the format the decoder actually detected, which may
/// differ from the extension (and is `None` when the decoder could not name
/// a container we can target). This function never fails; an unrecognized
/// input lands on JPEG.
pub fn route(
    source_tag: Option<OutputFormat>,
    original_ext: &str,
    has_alpha: bool,
    convert_png_to_jpeg: bool,
    caps: &dyn EncoderCapabilities,
) -> RouteDecision {
    if original_ext == "png" && convert_png_to_jpeg && !has_alpha {
        return RouteDecision::for_format(OutputFormat::Jpeg);
    }

    if let Some(tag) = source_tag {
        if caps.can_write(tag) {
            return RouteDecision::for_format(tag);
        }
    }

    let format = match original_ext {
        "jpg" | "jpeg" => OutputFormat::Jpeg,
        "png" => OutputFormat::Png,
        "tiff" | "tif" => OutputFormat::Tiff,
        "heic" if caps.can_write(OutputFormat::Heic) => OutputFormat::Heic,
        "webp" if caps.can_write(OutputFormat::WebP) => OutputFormat::WebP,
        _ => OutputFormat::Jpeg,
    };
    RouteDecision::for_format(format)
}
