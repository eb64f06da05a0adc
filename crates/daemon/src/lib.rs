//! imglite daemon
//!
//! Background service that watches a directory for incoming images and
//! writes size-reduced `_lite` sibling copies, optionally deleting the
//! originals.

pub mod codec;
pub mod daemon;
pub mod events;
pub mod pipeline;
pub mod router;
pub mod scan;
pub mod store;
pub mod watch;

pub use imglite_config as config;
pub use imglite_config::Config;

pub use codec::{
    DecodeError, DecodedImage, EncodeError, EncodeOptions, ImageCodec, ImageMetadata, ImageRsCodec,
};
pub use daemon::{Daemon, DaemonError};
pub use events::{EventLog, LogEntry, LogLevel, DEFAULT_LOG_CAPACITY};
pub use pipeline::{lite_output_path, process_file, FileOutcome, PipelineOptions};
pub use router::{route, EncoderCapabilities, OutputFormat, RouteDecision, LOSSY_QUALITY};
pub use scan::{
    check_file, scan_directory, Candidate, SkipReason, LITE_SUFFIX, SUPPORTED_IMAGE_EXTENSIONS,
};
pub use store::{MetadataStore, StoreError};
pub use watch::{watch_directory, ChangeNotifier, ScanTrigger};
