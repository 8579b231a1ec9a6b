//! Entry classification
//!
//! Turns one filesystem path into an [`Item`]: kind, attributes, reparse
//! data, and length, in a single pass. The kind is a tagged union so that
//! impossible states (a plain file carrying reparse data, a junction with
//! a length) are unrepresentable.

use crate::error::Result;
use crate::fs::operations::{file_length, read_attributes, BasicAttributes, ListedEntry};
use crate::fs::reparse::{read_reparse_data, ReparsePointData, ReparseTag};
use std::ffi::OsString;
use std::mem;
use std::path::{Path, PathBuf};

/// What one filesystem entry is, with the per-kind payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Plain file with its size in bytes
    File {
        /// File size in bytes
        length: u64,
    },
    /// Plain directory
    Dir,
    /// Symbolic link presenting as a file
    FileSymlink(ReparsePointData),
    /// Symbolic link presenting as a directory
    DirSymlink(ReparsePointData),
    /// Junction (mount point)
    Junction(ReparsePointData),
}

impl ItemKind {
    /// Human-readable kind name used in change messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Dir => "directory",
            Self::FileSymlink(_) => "file symlink",
            Self::DirSymlink(_) => "directory symlink",
            Self::Junction(_) => "junction",
        }
    }

    /// True only for a plain directory; links that present as directories
    /// are opaque entries and never count
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Dir)
    }

    /// File size in bytes; 0 for every non-file kind
    pub fn length(&self) -> u64 {
        match self {
            Self::File { length } => *length,
            _ => 0,
        }
    }

    /// The reparse payload of the three link kinds
    pub fn reparse(&self) -> Option<&ReparsePointData> {
        match self {
            Self::FileSymlink(data) | Self::DirSymlink(data) | Self::Junction(data) => Some(data),
            Self::File { .. } | Self::Dir => None,
        }
    }

    /// Same variant, payloads ignored
    pub fn same_kind(&self, other: &ItemKind) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

/// One classified filesystem entry
#[derive(Debug, Clone)]
pub struct Item {
    /// Absolute path as presented to the OS (snapshot-space on the source side)
    pub full_path: PathBuf,
    /// Leaf name as returned by the directory listing, case preserved
    pub name: OsString,
    /// Timestamps and attribute bits
    pub attrs: BasicAttributes,
    /// Kind with per-kind payload
    pub kind: ItemKind,
}

impl Item {
    /// Classify the entry at `path` in one pass
    pub fn classify(path: &Path) -> Result<Item> {
        let attrs = read_attributes(path)?;
        let kind = classify_kind(path, &attrs, None)?;
        Ok(Item {
            full_path: path.to_path_buf(),
            name: path
                .file_name()
                .map(OsString::from)
                .unwrap_or_else(|| path.as_os_str().to_os_string()),
            attrs,
            kind,
        })
    }

    /// Classify a child using the listing's pre-stat'd attributes; only
    /// reparse-point children need another open
    pub fn classify_listed(parent: &Path, listed: &ListedEntry) -> Result<Item> {
        let full_path = parent.join(&listed.name);
        let kind = classify_kind(&full_path, &listed.attrs, Some(listed.length))?;
        Ok(Item {
            full_path,
            name: listed.name.clone(),
            attrs: listed.attrs,
            kind,
        })
    }

    /// Override the kind to a plain directory. Snapshot volume roots list
    /// as reparse points but must still be walked.
    pub fn force_dir(mut self) -> Item {
        self.kind = ItemKind::Dir;
        self
    }
}

fn classify_kind(
    path: &Path,
    attrs: &BasicAttributes,
    listed_length: Option<u64>,
) -> Result<ItemKind> {
    let reparse = if attrs.flags.is_reparse_point() {
        read_reparse_data(path)?
    } else {
        None
    };

    match reparse {
        Some(data) => match data.tag {
            ReparseTag::MountPoint => Ok(ItemKind::Junction(data)),
            ReparseTag::Symlink => {
                if symlink_presents_as_dir(path, attrs) {
                    Ok(ItemKind::DirSymlink(data))
                } else {
                    Ok(ItemKind::FileSymlink(data))
                }
            }
        },
        None => {
            if attrs.flags.is_directory() {
                Ok(ItemKind::Dir)
            } else {
                let length = match listed_length {
                    Some(length) => length,
                    None => file_length(path)?,
                };
                Ok(ItemKind::File { length })
            }
        }
    }
}

#[cfg(windows)]
fn symlink_presents_as_dir(_path: &Path, attrs: &BasicAttributes) -> bool {
    attrs.flags.is_directory()
}

/// POSIX symlinks carry no directory bit of their own; the shape comes
/// from a stat of the target (a broken link presents as a file link).
#[cfg(not(windows))]
fn symlink_presents_as_dir(path: &Path, _attrs: &BasicAttributes) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_file_and_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"abcdef").unwrap();

        let item = Item::classify(&file).unwrap();
        assert_eq!(item.kind, ItemKind::File { length: 6 });
        assert_eq!(item.name, OsString::from("a.txt"));
        assert_eq!(item.kind.length(), 6);
        assert!(item.kind.reparse().is_none());

        let item = Item::classify(dir.path()).unwrap();
        assert!(item.kind.is_dir());
        assert_eq!(item.kind.length(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_symlinks() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let file_link = dir.path().join("file-link");
        std::os::unix::fs::symlink(&file, &file_link).unwrap();
        let dir_link = dir.path().join("dir-link");
        std::os::unix::fs::symlink(&sub, &dir_link).unwrap();

        let item = Item::classify(&file_link).unwrap();
        assert!(matches!(item.kind, ItemKind::FileSymlink(_)));
        assert_eq!(item.kind.label(), "file symlink");
        assert_eq!(item.kind.length(), 0);

        let item = Item::classify(&dir_link).unwrap();
        assert!(matches!(item.kind, ItemKind::DirSymlink(_)));
        assert!(!item.kind.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_link_is_file_symlink() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("broken");
        std::os::unix::fs::symlink(dir.path().join("missing"), &link).unwrap();

        let item = Item::classify(&link).unwrap();
        assert!(matches!(item.kind, ItemKind::FileSymlink(_)));
    }

    #[test]
    fn test_classify_listed_matches_direct() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abcd").unwrap();

        let listing = crate::fs::operations::list_directory(dir.path()).unwrap();
        let item = Item::classify_listed(dir.path(), &listing[0]).unwrap();
        let direct = Item::classify(&dir.path().join("a.txt")).unwrap();
        assert!(item.kind.same_kind(&direct.kind));
        assert_eq!(item.kind.length(), direct.kind.length());
    }

    #[test]
    fn test_same_kind_ignores_payload() {
        let a = ItemKind::File { length: 1 };
        let b = ItemKind::File { length: 99 };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&ItemKind::Dir));
    }

    #[test]
    fn test_force_dir() {
        let dir = TempDir::new().unwrap();
        let item = Item::classify(dir.path()).unwrap().force_dir();
        assert!(item.kind.is_dir());
    }
}
