//! Filesystem primitives with backup semantics
//!
//! Every operation transits the long-form path wrapper, opens reparse
//! points as the point itself (never the target), and reports failures
//! through [`MirrorError`]. Recursion is the engine's job; these calls
//! touch exactly one entry each.

use crate::error::{IoResultExt, MirrorError, Result};
use crate::fs::path::long_form;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Chunk size for file-content copies
pub const COPY_CHUNK_SIZE: usize = 128 * 1024;

/// Filesystem attribute bits, as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileAttributes {
    /// Raw attribute value
    pub value: u32,
}

impl FileAttributes {
    pub const READONLY: u32 = 0x0000_0001;
    pub const HIDDEN: u32 = 0x0000_0002;
    pub const SYSTEM: u32 = 0x0000_0004;
    pub const DIRECTORY: u32 = 0x0000_0010;
    pub const ARCHIVE: u32 = 0x0000_0020;
    pub const NORMAL: u32 = 0x0000_0080;
    pub const TEMPORARY: u32 = 0x0000_0100;
    pub const SPARSE: u32 = 0x0000_0200;
    pub const REPARSE_POINT: u32 = 0x0000_0400;
    pub const COMPRESSED: u32 = 0x0000_0800;
    pub const OFFLINE: u32 = 0x0000_1000;
    pub const NOT_CONTENT_INDEXED: u32 = 0x0000_2000;
    pub const ENCRYPTED: u32 = 0x0000_4000;

    /// Create from a raw attribute value
    pub fn new(value: u32) -> Self {
        Self { value }
    }

    /// Check if a specific bit is set
    pub fn has(&self, bit: u32) -> bool {
        self.value & bit == bit
    }

    /// Set a bit
    pub fn insert(&mut self, bit: u32) {
        self.value |= bit;
    }

    /// Clear a bit
    pub fn remove(&mut self, bit: u32) {
        self.value &= !bit;
    }

    /// Directory bit
    pub fn is_directory(&self) -> bool {
        self.has(Self::DIRECTORY)
    }

    /// Reparse-point bit
    pub fn is_reparse_point(&self) -> bool {
        self.has(Self::REPARSE_POINT)
    }

    /// Read-only bit
    pub fn is_readonly(&self) -> bool {
        self.has(Self::READONLY)
    }

    /// Get human-readable bit names
    pub fn describe(&self) -> Vec<&'static str> {
        let mut bits = Vec::new();
        if self.has(Self::READONLY) {
            bits.push("read-only");
        }
        if self.has(Self::HIDDEN) {
            bits.push("hidden");
        }
        if self.has(Self::SYSTEM) {
            bits.push("system");
        }
        if self.has(Self::DIRECTORY) {
            bits.push("directory");
        }
        if self.has(Self::ARCHIVE) {
            bits.push("archive");
        }
        if self.has(Self::SPARSE) {
            bits.push("sparse");
        }
        if self.has(Self::REPARSE_POINT) {
            bits.push("reparse-point");
        }
        if self.has(Self::COMPRESSED) {
            bits.push("compressed");
        }
        if self.has(Self::ENCRYPTED) {
            bits.push("encrypted");
        }
        bits
    }
}

/// Timestamps and attribute bits of a filesystem entry, round-trippable
/// between [`read_attributes`] and [`write_attributes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicAttributes {
    /// Creation time
    pub created: SystemTime,
    /// Last access time
    pub accessed: SystemTime,
    /// Last write time
    pub modified: SystemTime,
    /// Attribute bits
    pub flags: FileAttributes,
}

impl BasicAttributes {
    /// Derive attributes from already-fetched metadata without another stat
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        #[cfg(windows)]
        let flags = {
            use std::os::windows::fs::MetadataExt;
            FileAttributes::new(meta.file_attributes())
        };
        #[cfg(not(windows))]
        let flags = {
            let mut f = FileAttributes::default();
            if meta.is_dir() {
                f.insert(FileAttributes::DIRECTORY);
            }
            if meta.file_type().is_symlink() {
                f.insert(FileAttributes::REPARSE_POINT);
            } else if meta.permissions().readonly() {
                f.insert(FileAttributes::READONLY);
            }
            if f.value == 0 {
                f.insert(FileAttributes::NORMAL);
            }
            f
        };

        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        Self {
            created: meta.created().unwrap_or(modified),
            accessed: meta.accessed().unwrap_or(modified),
            modified,
            flags,
        }
    }
}

/// One child of a directory listing: name plus pre-stat'd attributes,
/// so reconciliation never opens a handle per entry just to compare
#[derive(Debug, Clone)]
pub struct ListedEntry {
    /// Leaf name, case preserved
    pub name: OsString,
    /// Timestamps and attribute bits
    pub attrs: BasicAttributes,
    /// File size in bytes; 0 for anything that is not a plain file
    pub length: u64,
}

/// Progress of a file-content copy
#[derive(Debug, Clone, Copy)]
pub struct CopyProgress {
    /// Total bytes to copy
    pub total: u64,
    /// Bytes copied so far
    pub copied: u64,
}

/// Read timestamps and attribute bits without following reparse points
pub fn read_attributes(path: &Path) -> Result<BasicAttributes> {
    let meta = fs::symlink_metadata(long_form(path)).with_path(path)?;
    Ok(BasicAttributes::from_metadata(&meta))
}

/// File size in bytes; 0 for non-files. Never follows reparse points.
pub fn file_length(path: &Path) -> Result<u64> {
    let meta = fs::symlink_metadata(long_form(path)).with_path(path)?;
    Ok(if meta.is_file() { meta.len() } else { 0 })
}

/// Apply timestamps and attribute bits without following reparse points
#[cfg(windows)]
pub fn write_attributes(path: &Path, attrs: &BasicAttributes) -> Result<()> {
    let p = long_form(path);
    win::set_file_times(&p, attrs).with_path(path)?;
    win::set_attribute_flags(&p, attrs.flags).with_path(path)?;
    Ok(())
}

/// Apply timestamps and attribute bits without following reparse points.
/// The read-only bit is the one attribute bit with a POSIX rendering.
#[cfg(not(windows))]
pub fn write_attributes(path: &Path, attrs: &BasicAttributes) -> Result<()> {
    let p = long_form(path);
    let meta = fs::symlink_metadata(&p).with_path(path)?;
    if !meta.file_type().is_symlink() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = meta.permissions();
            let mode = if attrs.flags.is_readonly() {
                perms.mode() & !0o222
            } else {
                perms.mode() | 0o200
            };
            if mode != perms.mode() {
                perms.set_mode(mode);
                fs::set_permissions(&p, perms).with_path(path)?;
            }
        }
    }
    let atime = filetime::FileTime::from_system_time(attrs.accessed);
    let mtime = filetime::FileTime::from_system_time(attrs.modified);
    filetime::set_symlink_file_times(&p, atime, mtime).with_path(path)?;
    Ok(())
}

fn clear_readonly(path: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        win::clear_readonly_flag(path).with_path(path)
    }
    #[cfg(not(windows))]
    {
        let meta = fs::symlink_metadata(path).with_path(path)?;
        if !meta.file_type().is_symlink() && meta.permissions().readonly() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = meta.permissions();
                perms.set_mode(perms.mode() | 0o200);
                fs::set_permissions(path, perms).with_path(path)?;
            }
        }
        Ok(())
    }
}

/// Delete one file or one EMPTY directory. Reparse points are deleted as
/// the point itself, never the target. Read-only entries are deleted too.
/// Fails on a non-empty directory.
pub fn delete_entry(path: &Path, directory: bool) -> Result<()> {
    let p = long_form(path);
    clear_readonly(&p)?;
    if directory {
        fs::remove_dir(&p).with_path(path)
    } else {
        fs::remove_file(&p).with_path(path)
    }
}

/// Rename, atomic within a volume. When `overwrite` is set the existing
/// target must be a file (replacing a directory fails) and its read-only
/// flag is ignored.
pub fn rename_entry(old: &Path, new: &Path, overwrite: bool) -> Result<()> {
    let old_p = long_form(old);
    let new_p = long_form(new);
    match fs::symlink_metadata(&new_p) {
        Ok(meta) => {
            if !overwrite {
                return Err(MirrorError::io(
                    new,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target exists"),
                ));
            }
            if meta.is_dir() {
                return Err(MirrorError::Io {
                    path: new.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "cannot overwrite a directory",
                    ),
                });
            }
            clear_readonly(&new_p)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(MirrorError::io(new, e)),
    }
    #[cfg(windows)]
    {
        win::move_replace(&old_p, &new_p).with_path(old)
    }
    #[cfg(not(windows))]
    {
        fs::rename(&old_p, &new_p).with_path(old)
    }
}

/// Copy file content in 128 KiB chunks. `dst` must not exist. Progress is
/// yielded at start, after each chunk, and at end. Copies bytes only:
/// timestamps, attribute bits, and ACLs are the caller's responsibility.
pub fn copy_file_content(
    src: &Path,
    dst: &Path,
    mut progress: impl FnMut(CopyProgress),
) -> Result<u64> {
    let mut reader = File::open(long_form(src)).with_path(src)?;
    let total = reader.metadata().with_path(src)?.len();
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(long_form(dst))
        .with_path(dst)?;

    progress(CopyProgress { total, copied: 0 });
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf).with_path(src)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).with_path(dst)?;
        copied += n as u64;
        progress(CopyProgress { total, copied });
    }
    writer.flush().with_path(dst)?;
    progress(CopyProgress { total, copied });
    Ok(copied)
}

/// Create an empty file; fails if the path exists
pub fn create_empty_file(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(long_form(path))
        .with_path(path)?;
    Ok(())
}

/// Create a directory; fails if the path exists
pub fn create_directory(path: &Path) -> Result<()> {
    fs::create_dir(long_form(path)).with_path(path)
}

/// List one directory: each child's name, attributes, and length in a
/// single pass. Never recurses, never follows reparse points, skips the
/// dot entries. Fails as a whole on an unreadable directory.
pub fn list_directory(path: &Path) -> Result<Vec<ListedEntry>> {
    let p = long_form(path);
    let mut entries = Vec::new();
    for entry in fs::read_dir(&p).with_path(path)? {
        let entry = entry.with_path(path)?;
        let meta = entry.metadata().with_path(entry.path())?;
        let length = if meta.is_file() { meta.len() } else { 0 };
        entries.push(ListedEntry {
            name: entry.file_name(),
            attrs: BasicAttributes::from_metadata(&meta),
            length,
        });
    }
    Ok(entries)
}

#[cfg(windows)]
pub(crate) mod win {
    //! Thin winapi wrappers shared by the primitive and reparse layers.
    //! All opens use backup semantics and open the reparse point itself.

    use super::{BasicAttributes, FileAttributes};
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr;
    use std::time::{SystemTime, UNIX_EPOCH};
    use winapi::shared::minwindef::{DWORD, FILETIME};
    use winapi::um::fileapi::{
        CreateFileW, GetFileAttributesW, SetFileAttributesW, SetFileTime, INVALID_FILE_ATTRIBUTES,
        OPEN_EXISTING,
    };
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::winbase::{
        MoveFileExW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OPEN_REPARSE_POINT,
        MOVEFILE_REPLACE_EXISTING,
    };
    use winapi::um::winnt::{
        FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, FILE_WRITE_ATTRIBUTES, HANDLE,
    };

    /// 100 ns intervals between 1601-01-01 and the Unix epoch
    const EPOCH_DIFFERENCE_100NS: u64 = 116_444_736_000_000_000;

    pub fn wide(path: &Path) -> Vec<u16> {
        path.as_os_str().encode_wide().chain(Some(0)).collect()
    }

    /// Handle that closes on drop; scoped to a single operation
    pub struct OwnedHandle(pub HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if self.0 != INVALID_HANDLE_VALUE {
                unsafe {
                    CloseHandle(self.0);
                }
            }
        }
    }

    /// Open with backup semantics, getting the reparse point itself
    pub fn open_handle(path: &Path, access: DWORD) -> io::Result<OwnedHandle> {
        let wide_path = wide(path);
        let handle = unsafe {
            CreateFileW(
                wide_path.as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedHandle(handle))
    }

    fn to_filetime(t: SystemTime) -> FILETIME {
        let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
        let ticks =
            EPOCH_DIFFERENCE_100NS + d.as_secs() * 10_000_000 + u64::from(d.subsec_nanos() / 100);
        FILETIME {
            dwLowDateTime: ticks as u32,
            dwHighDateTime: (ticks >> 32) as u32,
        }
    }

    pub fn set_file_times(path: &Path, attrs: &BasicAttributes) -> io::Result<()> {
        let handle = open_handle(path, FILE_WRITE_ATTRIBUTES)?;
        let created = to_filetime(attrs.created);
        let accessed = to_filetime(attrs.accessed);
        let modified = to_filetime(attrs.modified);
        let ok = unsafe { SetFileTime(handle.0, &created, &accessed, &modified) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn set_attribute_flags(path: &Path, flags: FileAttributes) -> io::Result<()> {
        let wide_path = wide(path);
        // DIRECTORY and REPARSE_POINT are not settable bits.
        let settable =
            flags.value & !(FileAttributes::DIRECTORY | FileAttributes::REPARSE_POINT);
        let value = if settable == 0 {
            FileAttributes::NORMAL
        } else {
            settable
        };
        let ok = unsafe { SetFileAttributesW(wide_path.as_ptr(), value) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn clear_readonly_flag(path: &Path) -> io::Result<()> {
        let wide_path = wide(path);
        let current = unsafe { GetFileAttributesW(wide_path.as_ptr()) };
        if current == INVALID_FILE_ATTRIBUTES {
            return Err(io::Error::last_os_error());
        }
        if current & FileAttributes::READONLY != 0 {
            let ok =
                unsafe { SetFileAttributesW(wide_path.as_ptr(), current & !FileAttributes::READONLY) };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    pub fn move_replace(old: &Path, new: &Path) -> io::Result<()> {
        let old_wide = wide(old);
        let new_wide = wide(new);
        let ok =
            unsafe { MoveFileExW(old_wide.as_ptr(), new_wide.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_attribute_bits() {
        let mut flags = FileAttributes::new(FileAttributes::READONLY);
        assert!(flags.is_readonly());
        assert!(!flags.is_directory());

        flags.insert(FileAttributes::HIDDEN);
        assert!(flags.has(FileAttributes::HIDDEN));

        flags.remove(FileAttributes::READONLY);
        assert!(!flags.is_readonly());

        let desc = FileAttributes::new(FileAttributes::READONLY | FileAttributes::DIRECTORY)
            .describe();
        assert!(desc.contains(&"read-only"));
        assert!(desc.contains(&"directory"));
    }

    #[test]
    fn test_read_attributes_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.txt", b"hello");

        let attrs = read_attributes(&file).unwrap();
        assert!(!attrs.flags.is_directory());
        write_attributes(&file, &attrs).unwrap();
        let again = read_attributes(&file).unwrap();
        assert_eq!(attrs.modified, again.modified);
        assert_eq!(attrs.flags, again.flags);
    }

    #[test]
    fn test_file_length() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "a.bin", &[7u8; 300]);
        assert_eq!(file_length(&file).unwrap(), 300);
        assert_eq!(file_length(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_copy_file_content_progress() {
        let dir = TempDir::new().unwrap();
        let src = write_file(dir.path(), "src.bin", &vec![0xAB; COPY_CHUNK_SIZE + 17]);
        let dst = dir.path().join("dst.bin");

        let mut updates = Vec::new();
        let copied = copy_file_content(&src, &dst, |p| updates.push(p.copied)).unwrap();

        assert_eq!(copied, (COPY_CHUNK_SIZE + 17) as u64);
        assert_eq!(fs::read(&dst).unwrap(), fs::read(&src).unwrap());
        // start + two chunks + end
        assert_eq!(updates.first(), Some(&0));
        assert_eq!(updates.last(), Some(&copied));
        assert!(updates.contains(&(COPY_CHUNK_SIZE as u64)));
    }

    #[test]
    fn test_copy_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        let src = write_file(dir.path(), "src.bin", b"new");
        let dst = write_file(dir.path(), "dst.bin", b"old");

        assert!(copy_file_content(&src, &dst, |_| {}).is_err());
        assert_eq!(fs::read(&dst).unwrap(), b"old");
    }

    #[test]
    fn test_rename_overwrite() {
        let dir = TempDir::new().unwrap();
        let old = write_file(dir.path(), "incoming.tmp", b"fresh");
        let new = write_file(dir.path(), "final.txt", b"stale");

        rename_entry(&old, &new, true).unwrap();
        assert_eq!(fs::read(&new).unwrap(), b"fresh");
        assert!(!old.exists());
    }

    #[test]
    fn test_rename_without_overwrite_fails() {
        let dir = TempDir::new().unwrap();
        let old = write_file(dir.path(), "incoming.tmp", b"fresh");
        let new = write_file(dir.path(), "final.txt", b"stale");

        assert!(rename_entry(&old, &new, false).is_err());
        assert_eq!(fs::read(&new).unwrap(), b"stale");
    }

    #[test]
    fn test_rename_never_replaces_directory() {
        let dir = TempDir::new().unwrap();
        let old = write_file(dir.path(), "incoming.tmp", b"fresh");
        let target = dir.path().join("final");
        fs::create_dir(&target).unwrap();
        write_file(&target, "inner.txt", b"x");

        assert!(rename_entry(&old, &target, true).is_err());
        assert!(target.join("inner.txt").exists());
        assert!(old.exists());
    }

    #[test]
    fn test_rename_overwrites_readonly_target() {
        let dir = TempDir::new().unwrap();
        let old = write_file(dir.path(), "incoming.tmp", b"fresh");
        let new = write_file(dir.path(), "final.txt", b"stale");
        let mut perms = fs::metadata(&new).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&new, perms).unwrap();

        rename_entry(&old, &new, true).unwrap();
        assert_eq!(fs::read(&new).unwrap(), b"fresh");
    }

    #[test]
    fn test_delete_readonly_file() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "locked.txt", b"x");
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        delete_entry(&file, false).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_delete_refuses_nonempty_directory() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_file(&sub, "f.txt", b"x");

        assert!(delete_entry(&sub, true).is_err());
        assert!(sub.exists());
    }

    #[test]
    fn test_create_primitives_fail_on_existing() {
        let dir = TempDir::new().unwrap();
        let file = write_file(dir.path(), "f.txt", b"x");
        assert!(create_empty_file(&file).is_err());
        assert!(create_directory(dir.path()).is_err());

        let fresh = dir.path().join("fresh.txt");
        create_empty_file(&fresh).unwrap();
        assert_eq!(file_length(&fresh).unwrap(), 0);
    }

    #[test]
    fn test_list_directory() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "b.txt", b"abcd");
        fs::create_dir(dir.path().join("sub")).unwrap();

        let listing = list_directory(dir.path()).unwrap();
        assert_eq!(listing.len(), 2);

        let file = listing
            .iter()
            .find(|e| e.name == OsString::from("b.txt"))
            .unwrap();
        assert_eq!(file.length, 4);
        assert!(!file.attrs.flags.is_directory());

        let sub = listing
            .iter()
            .find(|e| e.name == OsString::from("sub"))
            .unwrap();
        assert_eq!(sub.length, 0);
        assert!(sub.attrs.flags.is_directory());
    }

    #[cfg(unix)]
    #[test]
    fn test_list_directory_does_not_follow_links() {
        let dir = TempDir::new().unwrap();
        let target = write_file(dir.path(), "target.txt", b"0123456789");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let listing = list_directory(dir.path()).unwrap();
        let entry = listing
            .iter()
            .find(|e| e.name == OsString::from("link"))
            .unwrap();
        assert!(entry.attrs.flags.is_reparse_point());
        assert_eq!(entry.length, 0);
    }

    #[test]
    fn test_write_attributes_applies_mtime() {
        let dir = TempDir::new().unwrap();
        let a = write_file(dir.path(), "a.txt", b"x");
        let b = write_file(dir.path(), "b.txt", b"y");

        let src_attrs = read_attributes(&a).unwrap();
        write_attributes(&b, &src_attrs).unwrap();
        let b_attrs = read_attributes(&b).unwrap();
        assert_eq!(src_attrs.modified, b_attrs.modified);
    }
}
