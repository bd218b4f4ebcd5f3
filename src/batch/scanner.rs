//! Input enumeration and output path mapping
//!
//! Walks the input root, keeps files with a recognized audio extension, and
//! maps each onto a mirrored path under the output root with a `.wav`
//! extension.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::transcode::OUTPUT_EXTENSION;

/// Recognized input extensions (lowercase, compared case-insensitively)
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "aac", "wma", "opus"];

/// One file's transcode job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// An input whose output path was already claimed by an earlier input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub input: PathBuf,
    pub output: PathBuf,
    pub claimed_by: PathBuf,
}

/// Result of scanning an input root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Runnable tasks, sorted by input path
    pub tasks: Vec<Task>,
    /// Inputs that will not run because their output path is taken
    pub collisions: Vec<Collision>,
    /// Inputs that will not run because their output would replace an input file
    pub overwrites: Vec<Task>,
}

impl ScanResult {
    /// Total number of eligible input files found.
    pub fn discovered(&self) -> usize {
        self.tasks.len() + self.collisions.len() + self.overwrites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discovered() == 0
    }
}

/// Whether `path` has one of the recognized audio extensions.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Mirror `input` (under `input_root`) onto `output_root` with the output extension.
///
/// Returns `None` if `input` is not inside `input_root`.
pub fn output_path_for(input_root: &Path, output_root: &Path, input: &Path) -> Option<PathBuf> {
    let relative = input.strip_prefix(input_root).ok()?;
    let mut output = output_root.join(relative);
    output.set_extension(OUTPUT_EXTENSION);
    Some(output)
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
///
/// The longest existing ancestor is canonicalized and the remaining
/// components are appended unchanged.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return std::fs::canonicalize(".").unwrap_or_default();
    }
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolve_path(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Recursively enumerate eligible inputs under `input_root`.
///
/// Unreadable directory entries are logged and skipped. If `output_root` lies
/// inside `input_root` it is not descended into, so earlier outputs are never
/// picked up as inputs. Roots are compared after resolving symlinks and `.`
/// or `..` components. An input whose output path names an input file is set
/// aside in [`ScanResult::overwrites`] instead of becoming a task.
pub fn scan(input_root: &Path, output_root: &Path) -> ScanResult {
    let resolved_output_root = resolve_path(output_root);

    let mut inputs: Vec<PathBuf> = WalkDir::new(input_root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || resolve_path(e.path()) != resolved_output_root
        })
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_audio_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    inputs.sort();

    let resolved_inputs: HashSet<PathBuf> = inputs.iter().map(|p| resolve_path(p)).collect();

    let mut result = ScanResult::default();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    for input in inputs {
        let Some(output) = output_path_for(input_root, output_root, &input) else {
            continue;
        };
        if resolved_inputs.contains(&resolve_path(&output)) {
            tracing::warn!(
                input = %input.display(),
                output = %output.display(),
                "output would overwrite an input file"
            );
            result.overwrites.push(Task { input, output });
            continue;
        }
        if let Some(first) = claimed.get(&output) {
            tracing::warn!(
                input = %input.display(),
                output = %output.display(),
                claimed_by = %first.display(),
                "output path collision"
            );
            result.collisions.push(Collision {
                input,
                output,
                claimed_by: first.clone(),
            });
            continue;
        }
        claimed.insert(output.clone(), input.clone());
        result.tasks.push(Task { input, output });
    }

    tracing::debug!(
        tasks = result.tasks.len(),
        collisions = result.collisions.len(),
        overwrites = result.overwrites.len(),
        root = %input_root.display(),
        "scan complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a/b.mp3")));
        assert!(is_audio_file(Path::new("B.FLAC")));
        assert!(is_audio_file(Path::new("c.Opus")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("mp3")));
        assert!(!is_audio_file(Path::new("archive.mp3.zip")));
    }

    #[test]
    fn test_output_path_mirrors_tree() {
        let out = output_path_for(
            Path::new("/data/in"),
            Path::new("/data/out"),
            Path::new("/data/in/speaker1/take.final.M4A"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("/data/out/speaker1/take.final.wav"));

        assert!(output_path_for(Path::new("/a"), Path::new("/b"), Path::new("/c/x.mp3")).is_none());
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("in");
        touch(&root.join("z.mp3"));
        touch(&root.join("sub/a.OGG"));
        touch(&root.join("sub/readme.md"));
        touch(&root.join("b.wma"));

        let out = dir.path().join("out");
        let result = scan(&root, &out);
        let inputs: Vec<_> = result.tasks.iter().map(|t| t.input.clone()).collect();
        assert_eq!(
            inputs,
            vec![root.join("b.wma"), root.join("sub/a.OGG"), root.join("z.mp3")]
        );
        assert_eq!(result.tasks[1].output, out.join("sub/a.wav"));
        assert!(result.collisions.is_empty());
    }

    #[test]
    fn test_scan_detects_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("in");
        touch(&root.join("clip.mp3"));
        touch(&root.join("clip.wav"));
        touch(&root.join("other.flac"));

        let result = scan(&root, &dir.path().join("out"));
        assert_eq!(result.tasks.len(), 2);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.discovered(), 3);
        // First in sorted order wins
        assert_eq!(result.collisions[0].claimed_by, root.join("clip.mp3"));
        assert_eq!(result.collisions[0].input, root.join("clip.wav"));
    }

    #[test]
    fn test_scan_skips_nested_output_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let out = root.join("normalized");
        touch(&root.join("a.mp3"));
        touch(&out.join("a.wav"));

        let result = scan(&root, &out);
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].input, root.join("a.mp3"));
    }

    #[test]
    fn test_scan_skips_output_root_given_indirectly() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("in");
        touch(&root.join("a.mp3"));
        touch(&root.join("normalized/a.wav"));

        let dotted = root.join(".").join("normalized");
        let result = scan(&root, &dotted);
        assert_eq!(result.tasks.len(), 1);
        assert_eq!(result.tasks[0].input, root.join("a.mp3"));

        let parent_hop = root.join("normalized").join("..").join("normalized");
        assert_eq!(scan(&root, &parent_hop).tasks.len(), 1);

        #[cfg(unix)]
        {
            let link = dir.path().join("link");
            std::os::unix::fs::symlink(&root, &link).unwrap();
            let result = scan(&root, &link.join("normalized"));
            assert_eq!(result.tasks.len(), 1);
        }
    }

    #[test]
    fn test_scan_same_root_never_targets_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        touch(&root.join("clip.wav"));
        touch(&root.join("song.mp3"));
        touch(&root.join("take.flac"));
        touch(&root.join("take.wav"));

        let result = scan(&root, &root);
        assert_eq!(result.discovered(), 4);
        for task in &result.tasks {
            assert_ne!(task.input, task.output);
        }
        let tasks: Vec<_> = result.tasks.iter().map(|t| t.input.clone()).collect();
        assert_eq!(tasks, vec![root.join("song.mp3")]);

        let overwrites: Vec<_> = result.overwrites.iter().map(|t| t.input.clone()).collect();
        assert_eq!(
            overwrites,
            vec![root.join("clip.wav"), root.join("take.flac"), root.join("take.wav")]
        );
    }

    #[test]
    fn test_resolve_path_of_missing_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        let missing = dir.path().join("sub").join("..").join("new").join("x.wav");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert_eq!(resolve_path(&missing), base.join("new").join("x.wav"));
    }

    #[test]
    fn test_scan_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan(dir.path(), &dir.path().join("out"));
        assert!(result.is_empty());
    }
}
