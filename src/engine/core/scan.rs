use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Input extensions picked up when scanning directories
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "wmv", "mpg", "mpeg", "ts", "m2ts",
    "mts", "3gp", "ogv", "vob", "mxf", "mp3", "wav", "flac", "ogg", "opus", "m4a", "aac",
    "wma", "aiff", "aif", "ac3", "dts", "mka", "wv", "ape", "tta", "caf", "amr",
];

/// Check if a path has a media file extension
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Scan a directory recursively for media files and invoke a callback for each
pub fn scan_streaming<F>(root: &Path, mut on_file: F)
where
    F: FnMut(PathBuf),
{
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_media_file(path) {
            on_file(path.to_path_buf());
        }
    }
}

/// Scan a directory recursively for media files
pub fn scan(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    scan_streaming(root, |path| files.push(path));
    files
}

/// Expand a mix of files and directories into the list of inputs to convert.
///
/// Files given explicitly are kept even without a known extension; directories
/// contribute only recognised media files.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            scan_streaming(path, |file| inputs.push(file));
        } else {
            inputs.push(path.clone());
        }
    }
    inputs
}
