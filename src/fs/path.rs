//! Path utilities
//!
//! Pure helpers for separator handling, long-form (`\\?\`) paths,
//! case-insensitive comparison, and snapshot-space rewriting.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Device-path marker of a volume shadow copy root
pub const SHADOW_DEVICE_MARKER: &str = "HarddiskVolumeShadowCopy";

/// Ensure `path` ends in the OS separator
pub fn ensure_trailing_separator(path: &Path) -> PathBuf {
    let lossy = path.to_string_lossy();
    if lossy.ends_with(MAIN_SEPARATOR) || (cfg!(windows) && lossy.ends_with('/')) {
        return path.to_path_buf();
    }
    let mut s = path.as_os_str().to_os_string();
    s.push(MAIN_SEPARATOR.to_string());
    PathBuf::from(s)
}

/// Prefix the raw-path marker so the OS skips path processing: long paths
/// work and literal trailing dots/spaces survive. Paths already carrying
/// the marker pass through unchanged.
#[cfg(windows)]
pub fn long_form(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with(r"\\?\") {
        return path.to_path_buf();
    }
    if let Some(unc) = s.strip_prefix(r"\\") {
        return PathBuf::from(format!(r"\\?\UNC\{unc}"));
    }
    PathBuf::from(format!(r"\\?\{s}"))
}

/// No raw-path marker exists on this platform; paths pass through.
#[cfg(not(windows))]
pub fn long_form(path: &Path) -> PathBuf {
    path.to_path_buf()
}

fn normalize_for_compare(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/").to_lowercase();
    while s.len() > 1 && s.ends_with('/') {
        s.pop();
    }
    s
}

/// Case-insensitive, separator-normalized, trailing-separator-insensitive
/// path equality. Does not canonicalize: two different names for the same
/// object (drive letter vs. volume GUID vs. junction mount) compare unequal.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    normalize_for_compare(a) == normalize_for_compare(b)
}

/// Parent directory of `path`, if it has one
pub fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent().map(Path::to_path_buf)
}

/// Append the separator a bare shadow-copy device root is missing.
///
/// Listing or stat-ing the device root of a volume shadow copy fails unless
/// the path carries its trailing separator; anywhere below the root the OS
/// does not care.
pub fn normalize_device_root(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(idx) = s.find(SHADOW_DEVICE_MARKER) {
        let tail = &s[idx + SHADOW_DEVICE_MARKER.len()..];
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            return ensure_trailing_separator(path);
        }
    }
    path.to_path_buf()
}

/// Maps paths inside a volume snapshot back to the live volume they were
/// taken from, for display and ignore-path matching.
#[derive(Debug, Clone)]
pub struct SnapshotPathMap {
    snapshot_root: PathBuf,
    original_root: PathBuf,
}

impl SnapshotPathMap {
    /// Create a map from `snapshot_root` back to `original_root`
    pub fn new(snapshot_root: impl Into<PathBuf>, original_root: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_root: snapshot_root.into(),
            original_root: original_root.into(),
        }
    }

    /// Identity map for runs without a snapshot
    pub fn identity(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            snapshot_root: root.clone(),
            original_root: root,
        }
    }

    /// The snapshot-space root this map translates from
    pub fn snapshot_root(&self) -> &Path {
        &self.snapshot_root
    }

    /// Translate a snapshot-space path to the original-volume path.
    /// Paths outside the snapshot root pass through unchanged.
    pub fn to_original(&self, path: &Path) -> PathBuf {
        let mut remainder = path.components();
        for expected in self.snapshot_root.components() {
            match remainder.next() {
                Some(actual)
                    if actual
                        .as_os_str()
                        .to_string_lossy()
                        .eq_ignore_ascii_case(&expected.as_os_str().to_string_lossy()) => {}
                _ => return path.to_path_buf(),
            }
        }
        let mut out = self.original_root.clone();
        for component in remainder {
            out.push(component);
        }
        out
    }

    /// Original-volume rendering of a snapshot-space path, for log lines
    pub fn display(&self, path: &Path) -> String {
        self.to_original(path).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_equal() {
        assert!(paths_equal(
            Path::new("C:\\Data\\Photos"),
            Path::new("c:/data/photos/")
        ));
        assert!(paths_equal(Path::new("/srv/mirror"), Path::new("/srv/mirror/")));
        assert!(!paths_equal(Path::new("/srv/mirror"), Path::new("/srv/mirrors")));
        // No canonicalization: different names for one object stay unequal.
        assert!(!paths_equal(
            Path::new("C:\\mount\\data"),
            Path::new("D:\\data")
        ));
    }

    #[test]
    fn test_trailing_separator() {
        let p = ensure_trailing_separator(Path::new("/srv/mirror"));
        assert!(p.to_string_lossy().ends_with(MAIN_SEPARATOR));
        let q = ensure_trailing_separator(&p);
        assert_eq!(p, q);
    }

    #[cfg(windows)]
    #[test]
    fn test_long_form() {
        assert_eq!(
            long_form(Path::new(r"C:\data")).to_string_lossy(),
            r"\\?\C:\data"
        );
        assert_eq!(
            long_form(Path::new(r"\\?\C:\data")).to_string_lossy(),
            r"\\?\C:\data"
        );
        assert_eq!(
            long_form(Path::new(r"\\server\share")).to_string_lossy(),
            r"\\?\UNC\server\share"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_long_form_passthrough() {
        assert_eq!(long_form(Path::new("/srv/data")), PathBuf::from("/srv/data"));
    }

    #[test]
    fn test_normalize_device_root() {
        let bare = Path::new(r"\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopy12");
        assert_eq!(
            normalize_device_root(bare).to_string_lossy(),
            format!(
                r"\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopy12{}",
                MAIN_SEPARATOR
            )
        );
        // Already below the root: untouched.
        let deep = Path::new(r"\\?\GLOBALROOT\Device\HarddiskVolumeShadowCopy12\Users");
        assert_eq!(normalize_device_root(deep), deep.to_path_buf());
        let plain = Path::new("/srv/data");
        assert_eq!(normalize_device_root(plain), plain.to_path_buf());
    }

    #[test]
    fn test_snapshot_rewrite() {
        let map = SnapshotPathMap::new("/snap/vol1", "/data");
        assert_eq!(
            map.to_original(Path::new("/snap/vol1/users/alice")),
            PathBuf::from("/data/users/alice")
        );
        assert_eq!(map.to_original(Path::new("/snap/vol1")), PathBuf::from("/data"));
        // Outside the snapshot root: passes through.
        assert_eq!(
            map.to_original(Path::new("/elsewhere/file")),
            PathBuf::from("/elsewhere/file")
        );
    }

    #[test]
    fn test_snapshot_rewrite_case_insensitive() {
        let map = SnapshotPathMap::new("/Snap/Vol1", "/data");
        assert_eq!(
            map.to_original(Path::new("/snap/vol1/File.txt")),
            PathBuf::from("/data/File.txt")
        );
    }

    #[test]
    fn test_identity_map() {
        let map = SnapshotPathMap::identity("/data");
        assert_eq!(
            map.to_original(Path::new("/data/users")),
            PathBuf::from("/data/users")
        );
    }
}
