//! Scanner module for discovering image files that still need compression.
//!
//! Lists one directory level and applies the eligibility filters: visible
//! name, supported extension, not an already-produced `_lite` output, not in
//! the processed set, and modified at or after the current watermark.

use crate::store::MetadataStore;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Image file extensions supported by the scanner (case-insensitive matching).
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "heic", "webp", "tiff", "tif"];

/// Suffix that marks a file as one of our own outputs.
pub const LITE_SUFFIX: &str = "_lite";

/// A candidate image file discovered during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Full path to the image file.
    pub path: PathBuf,
    /// Last modified time of the file.
    pub modified: SystemTime,
}

/// Why a file was rejected by the eligibility filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not a regular file.
    NotAFile,
    /// Name starts with `.` or `~` (hidden/temp-file convention).
    HiddenOrTemp,
    /// Extension is not in [`SUPPORTED_IMAGE_EXTENSIONS`].
    UnsupportedExtension,
    /// Base name ends with `_lite`; the file is one of our outputs.
    LiteOutput,
    /// Path is already in the processed set.
    AlreadyProcessed,
    /// Modified before the current watermark.
    OlderThanWatermark,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAFile => write!(f, "not a regular file"),
            SkipReason::HiddenOrTemp => write!(f, "hidden or temporary file"),
            SkipReason::UnsupportedExtension => write!(f, "unsupported extension"),
            SkipReason::LiteOutput => write!(f, "already a compressed output"),
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
            SkipReason::OlderThanWatermark => write!(f, "older than last scan"),
        }
    }
}

/// Checks if a file name uses the hidden/temp-file convention.
pub fn is_hidden_or_temp_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('~')
}

/// Checks if a file has a supported image extension (case-insensitive).
pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            SUPPORTED_IMAGE_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Checks if a file's base name marks it as one of our own outputs.
pub fn is_lite_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.ends_with(LITE_SUFFIX))
        .unwrap_or(false)
}

/// Name-only filters: visible, supported extension, not a `_lite` output.
fn passes_name_filters(path: &Path) -> Option<SkipReason> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if is_hidden_or_temp_name(name) {
        return Some(SkipReason::HiddenOrTemp);
    }
    if !has_supported_extension(path) {
        return Some(SkipReason::UnsupportedExtension);
    }
    if is_lite_output(path) {
        return Some(SkipReason::LiteOutput);
    }
    None
}

/// Apply the full eligibility check to one explicitly selected file.
///
/// Used by the manual-selection path; the directory scan applies the same
/// filters entry by entry. The watermark is read from the store at call
/// time.
pub fn check_file(path: &Path, store: &MetadataStore) -> Result<Candidate, SkipReason> {
    let metadata = std::fs::metadata(path).map_err(|_| SkipReason::NotAFile)?;
    if !metadata.is_file() {
        return Err(SkipReason::NotAFile);
    }
    if let Some(reason) = passes_name_filters(path) {
        return Err(reason);
    }
    if store.is_processed(path) {
        return Err(SkipReason::AlreadyProcessed);
    }

    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    if modified < store.watermark() {
        return Err(SkipReason::OlderThanWatermark);
    }

    Ok(Candidate {
        path: path.to_path_buf(),
        modified,
    })
}

/// Scans one directory for images requiring processing.
///
/// This function:
/// - Lists a single directory level (no recursion into subdirectories)
/// - Reads the watermark once at entry, not per file
/// - Skips hidden/temp names, unsupported extensions, and `_lite` outputs
/// - Excludes paths already in the processed set
/// - Excludes files modified before the watermark
///
/// Candidates come back in directory-listing order; nothing downstream
/// depends on it. An empty result is a valid, silent outcome. A failure to
/// read the directory aborts the whole scan so the caller can log it and
/// leave state untouched.
pub fn scan_directory(dir: &Path, store: &MetadataStore) -> Result<Vec<Candidate>, std::io::Error> {
    let watermark = store.watermark();
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(into_io_error)?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if passes_name_filters(path).is_some() {
            continue;
        }
        if store.is_processed(path) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < watermark {
            continue;
        }

        candidates.push(Candidate {
            path: path.to_path_buf(),
            modified,
        });
    }

    Ok(candidates)
}

fn into_io_error(e: walkdir::Error) -> std::io::Error {
    let msg = e.to_string();
    e.into_io_error()
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fresh_store(dir: &TempDir) -> MetadataStore {
        MetadataStore::open(dir.path().join("state.json")).unwrap()
    }

    #[test]
    fn test_supported_extensions_defined() {
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"png"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"jpg"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"jpeg"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"heic"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"webp"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"tiff"));
        assert!(SUPPORTED_IMAGE_EXTENSIONS.contains(&"tif"));
        assert_eq!(SUPPORTED_IMAGE_EXTENSIONS.len(), 7);
    }

    #[test]
    fn test_has_supported_extension() {
        assert!(has_supported_extension(Path::new("/d/photo.png")));
        assert!(has_supported_extension(Path::new("/d/photo.PNG"))); // case-insensitive
        assert!(has_supported_extension(Path::new("/d/photo.Jpeg")));
        assert!(has_supported_extension(Path::new("/d/IMG_0001.heic")));
        assert!(!has_supported_extension(Path::new("/d/notes.txt")));
        assert!(!has_supported_extension(Path::new("/d/video.mp4")));
        assert!(!has_supported_extension(Path::new("/d/photo"))); // no extension
    }

    #[test]
    fn test_is_hidden_or_temp_name() {
        assert!(is_hidden_or_temp_name(".DS_Store.png"));
        assert!(is_hidden_or_temp_name("~photo.png"));
        assert!(!is_hidden_or_temp_name("photo.png"));
    }

    #[test]
    fn test_is_lite_output() {
        assert!(is_lite_output(Path::new("/d/photo_lite.jpg")));
        assert!(is_lite_output(Path::new("/d/photo_lite.jpeg")));
        assert!(!is_lite_output(Path::new("/d/photo.jpg")));
        assert!(!is_lite_output(Path::new("/d/lite_photo.jpg")));
    }

    #[test]
    fn test_scan_includes_eligible_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        let photo = temp_dir.path().join("photo.png");
        File::create(&photo).unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, photo);
    }

    #[test]
    fn test_scan_excludes_hidden_file_regardless_of_extension() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        File::create(temp_dir.path().join(".DS_Store.png")).unwrap();
        File::create(temp_dir.path().join("~partial.jpg")).unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_scan_excludes_lite_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        File::create(temp_dir.path().join("photo_lite.jpg")).unwrap();
        File::create(temp_dir.path().join("photo.jpg")).unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, temp_dir.path().join("photo.jpg"));
    }

    #[test]
    fn test_scan_excludes_processed_paths_for_any_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        let photo = temp_dir.path().join("photo.png");
        File::create(&photo).unwrap();
        store.mark_processed(&photo).unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_scan_excludes_files_older_than_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        File::create(temp_dir.path().join("photo.png")).unwrap();

        // Watermark far in the future: nothing qualifies.
        store
            .advance_watermark(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_scan_does_not_recurse_into_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        let sub = temp_dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        File::create(sub.join("nested.png")).unwrap();

        let candidates = scan_directory(temp_dir.path(), &store).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_scan_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        let missing = temp_dir.path().join("missing");

        assert!(scan_directory(&missing, &store).is_err());
    }

    #[test]
    fn test_check_file_reports_skip_reasons() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);

        let notes = temp_dir.path().join("notes.txt");
        File::create(&notes).unwrap();
        assert_eq!(
            check_file(&notes, &store),
            Err(SkipReason::UnsupportedExtension)
        );

        let lite = temp_dir.path().join("photo_lite.jpg");
        File::create(&lite).unwrap();
        assert_eq!(check_file(&lite, &store), Err(SkipReason::LiteOutput));

        let processed = temp_dir.path().join("done.png");
        File::create(&processed).unwrap();
        store.mark_processed(&processed).unwrap();
        assert_eq!(
            check_file(&processed, &store),
            Err(SkipReason::AlreadyProcessed)
        );

        assert_eq!(
            check_file(&temp_dir.path().join("absent.png"), &store),
            Err(SkipReason::NotAFile)
        );

        let fresh = temp_dir.path().join("fresh.png");
        File::create(&fresh).unwrap();
        assert!(check_file(&fresh, &store).is_ok());
    }

    #[test]
    fn test_check_file_respects_watermark() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir);
        let photo = temp_dir.path().join("photo.png");
        File::create(&photo).unwrap();

        store
            .advance_watermark(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();
        assert_eq!(
            check_file(&photo, &store),
            Err(SkipReason::OlderThanWatermark)
        );
    }

    // *For any* file name, the scanner includes it as a candidate if and
    // only if its extension (case-insensitive) is one of the supported set.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                // Supported extensions (should pass)
                Just("png"), Just("PNG"), Just("Png"),
                Just("jpg"), Just("JPG"),
                Just("jpeg"), Just("JPEG"),
                Just("heic"), Just("HEIC"),
                Just("webp"), Just("WebP"),
                Just("tiff"), Just("TIFF"),
                Just("tif"), Just("Tif"),
                // Unsupported extensions (should fail)
                Just("txt"), Just("gif"), Just("bmp"), Just("pdf"),
                Just("mp4"), Just("exe"), Just("zip"), Just("svg"),
            ],
        ) {
            let path = PathBuf::from(format!("/downloads/{}.{}", basename, ext));
            let supported = has_supported_extension(&path);

            let ext_lower = ext.to_lowercase();
            let expected = matches!(
                ext_lower.as_str(),
                "png" | "jpg" | "jpeg" | "heic" | "webp" | "tiff" | "tif"
            );

            prop_assert_eq!(
                supported, expected,
                "Extension '{}' should {} be supported, but has_supported_extension returned {}",
                ext, if expected { "" } else { "not" }, supported
            );
        }

        // *For any* name starting with `.` or `~`, the name filters reject it.
        #[test]
        fn prop_hidden_and_temp_names_rejected(
            prefix in prop_oneof![Just('.'), Just('~')],
            rest in "[a-zA-Z0-9]{1,10}",
        ) {
            let name = format!("{}{}.png", prefix, rest);
            prop_assert!(is_hidden_or_temp_name(&name));
            prop_assert!(
                passes_name_filters(Path::new(&format!("/d/{}", name))).is_some(),
                "name filters should reject hidden/temp name"
            );
        }

        // *For any* base name ending in `_lite`, the filters reject it for
        // every supported extension.
        #[test]
        fn prop_lite_suffix_rejected(
            basename in "[a-zA-Z0-9]{1,10}",
            ext in prop_oneof![Just("png"), Just("jpg"), Just("jpeg"), Just("webp")],
        ) {
            let path = PathBuf::from(format!("/d/{}_lite.{}", basename, ext));
            prop_assert!(is_lite_output(&path));
            prop_assert!(passes_name_filters(&path).is_some());
        }
    }
}
