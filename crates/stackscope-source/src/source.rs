//! The `FrameSource` abstraction and format dispatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use stackscope_core::{Frame, Result, StackscopeError};

use crate::dataset::{Dataset, LoadOptions};
use crate::sequence::ImageSequenceSource;
use crate::stack::NpyStackSource;

/// Extensions decoded as one-image-per-frame sequence members.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "tiff", "tif", "bmp", "jpeg", "jpg"];

/// Extensions decoded as multi-frame stack containers.
pub const STACK_EXTENSIONS: &[&str] = &["npy"];

/// Random access to the decoded frames of one dataset.
///
/// Implementations are read-only after open and must tolerate concurrent
/// `read_frame` calls from prefetch workers; they use an independent file
/// handle per call rather than shared mutable state.
pub trait FrameSource: Send + Sync {
    /// The immutable dataset description.
    fn dataset(&self) -> &Dataset;

    /// Decode the frame at `index`.
    ///
    /// `IndexOutOfRange` when `index >= dataset().len()`; `Io`/`Decode` on
    /// read failure. Decode failures are transient from the caller's point
    /// of view and may be retried.
    fn read_frame(&self, index: usize) -> Result<Frame>;
}

/// Shared handle to a frame source.
pub type SharedFrameSource = Arc<dyn FrameSource>;

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_image(path: &Path) -> bool {
    IMAGE_EXTENSIONS.contains(&extension_of(path).as_str())
}

fn is_stack(path: &Path) -> bool {
    STACK_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Open a path set as a dataset, dispatching on file type.
///
/// Accepts a single stack container, one or more image files, or a single
/// directory of image files. Fails with `Format` when headers are unreadable
/// or shapes/sample types disagree across sequence members; on failure no
/// dataset is returned and nothing is cached.
pub fn open_paths(paths: &[PathBuf], options: &LoadOptions) -> Result<SharedFrameSource> {
    let [first] = paths else {
        if paths.is_empty() {
            return Err(StackscopeError::InvalidParameter(
                "No paths to open".into(),
            ));
        }
        return open_image_set(paths.to_vec(), options);
    };

    if first.is_dir() {
        return open_image_set(expand_directory(first)?, options);
    }
    if is_stack(first) {
        info!(path = %first.display(), "Opening stack container");
        let source = NpyStackSource::open(first, options)?;
        return Ok(Arc::new(source));
    }
    if is_image(first) {
        return open_image_set(vec![first.clone()], options);
    }
    Err(StackscopeError::Format(format!(
        "Unsupported file type: {}",
        first.display()
    )))
}

fn open_image_set(files: Vec<PathBuf>, options: &LoadOptions) -> Result<SharedFrameSource> {
    for file in &files {
        if !is_image(file) {
            return Err(StackscopeError::Format(format!(
                "Unsupported file type in sequence: {}",
                file.display()
            )));
        }
    }
    info!(files = files.len(), "Opening image sequence");
    let source = ImageSequenceSource::open(files, options)?;
    Ok(Arc::new(source))
}

/// List a directory's files, keeping only the most frequent extension when
/// mixed, in lexicographic name order.
fn expand_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(StackscopeError::Format(format!(
            "Directory contains no files: {}",
            dir.display()
        )));
    }

    let mut by_extension: HashMap<String, usize> = HashMap::new();
    for file in &files {
        *by_extension.entry(extension_of(file)).or_default() += 1;
    }
    if by_extension.len() > 1 {
        // Ties resolve to the lexicographically smallest extension so the
        // selection is reproducible.
        let majority = by_extension
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(ext, _)| ext.clone())
            .unwrap_or_default();
        warn!(
            directory = %dir.display(),
            extension = %majority,
            "Directory contains multiple file types; loading majority extension"
        );
        files.retain(|f| extension_of(f) == majority);
    }

    files.sort();
    Ok(files)
}
