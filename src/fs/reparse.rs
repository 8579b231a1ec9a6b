//! Reparse-point codec
//!
//! Reads and writes junction (MOUNT_POINT) and symbolic-link (SYMLINK)
//! reparse data, and converts between the two textual name forms: the raw
//! NT-namespace form (`\??\...`) stored in the point and the user-facing
//! form (`\\?\...`). The two forms stay distinct; converters are pure
//! string substitutions, never normalization.
//!
//! On non-Windows platforms POSIX symlinks stand in for symbolic-link
//! reparse points; junctions have no rendering and their operations fail
//! with an unsupported-operation error.

use crate::error::{IoResultExt, MirrorError, Result};
use std::path::Path;

/// Raw NT-namespace prefix stored inside reparse points
pub const RAW_PREFIX: &str = r"\??\";
/// User-facing raw-path prefix
pub const NICE_PREFIX: &str = r"\\?\";

/// Reparse tag of a mount point (junction)
pub const TAG_MOUNT_POINT: u32 = 0xA000_0003;
/// Reparse tag of a symbolic link
pub const TAG_SYMLINK: u32 = 0xA000_000C;

/// Recognized reparse tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseTag {
    /// MOUNT_POINT: a junction
    MountPoint,
    /// SYMLINK: a file or directory symbolic link
    Symlink,
}

impl ReparseTag {
    /// The on-disk tag value
    pub fn raw_value(&self) -> u32 {
        match self {
            Self::MountPoint => TAG_MOUNT_POINT,
            Self::Symlink => TAG_SYMLINK,
        }
    }
}

/// Decoded reparse data of a junction or symbolic link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparsePointData {
    /// Which flavor of reparse point this is
    pub tag: ReparseTag,
    /// Raw NT-namespace target
    pub substitute_name: String,
    /// User-visible target
    pub print_name: String,
    /// Relative-target flag; only meaningful for symbolic links
    pub relative: bool,
}

/// Substitute `\??\` with `\\?\`; other names pass through
pub fn raw_to_nice(name: &str) -> String {
    match name.strip_prefix(RAW_PREFIX) {
        Some(rest) => format!("{NICE_PREFIX}{rest}"),
        None => name.to_string(),
    }
}

/// Substitute `\\?\` with `\??\`; other names pass through
pub fn nice_to_raw(name: &str) -> String {
    match name.strip_prefix(NICE_PREFIX) {
        Some(rest) => format!("{RAW_PREFIX}{rest}"),
        None => name.to_string(),
    }
}

/// Read the reparse data of `path`. Returns `None` iff the entry exists
/// and is not a reparse point; an unrecognized tag is an error.
#[cfg(windows)]
pub fn read_reparse_data(path: &Path) -> Result<Option<ReparsePointData>> {
    win::get_reparse_data(path)
}

/// POSIX rendering: a symlink is a SYMLINK reparse point whose substitute
/// and print names are both the link target.
#[cfg(not(windows))]
pub fn read_reparse_data(path: &Path) -> Result<Option<ReparsePointData>> {
    let meta = std::fs::symlink_metadata(path).with_path(path)?;
    if !meta.file_type().is_symlink() {
        return Ok(None);
    }
    let target = std::fs::read_link(path).with_path(path)?;
    let name = target.to_string_lossy().into_owned();
    Ok(Some(ReparsePointData {
        tag: ReparseTag::Symlink,
        substitute_name: name.clone(),
        print_name: name,
        relative: target.is_relative(),
    }))
}

/// Set MOUNT_POINT data on an existing directory. Overwrites an existing
/// junction; fails if a symbolic link is present.
#[cfg(windows)]
pub fn set_junction_data(path: &Path, substitute_name: &str, print_name: &str) -> Result<()> {
    reject_other_tag(path, ReparseTag::MountPoint)?;
    win::set_reparse_data(path, ReparseTag::MountPoint, substitute_name, print_name, false)
}

/// Junctions have no POSIX rendering
#[cfg(not(windows))]
pub fn set_junction_data(path: &Path, _substitute_name: &str, _print_name: &str) -> Result<()> {
    Err(unsupported(path, "junctions are not supported on this platform"))
}

/// Set SYMLINK data on an existing zero-length file or empty directory.
/// Overwrites an existing symbolic link; fails if a junction is present.
#[cfg(windows)]
pub fn set_symlink_data(
    path: &Path,
    substitute_name: &str,
    print_name: &str,
    relative: bool,
) -> Result<()> {
    reject_other_tag(path, ReparseTag::Symlink)?;
    win::set_reparse_data(path, ReparseTag::Symlink, substitute_name, print_name, relative)
}

/// POSIX rendering: replace the placeholder entry with a symlink
#[cfg(not(windows))]
pub fn set_symlink_data(
    path: &Path,
    substitute_name: &str,
    print_name: &str,
    _relative: bool,
) -> Result<()> {
    reject_other_tag(path, ReparseTag::Symlink)?;
    let target = if print_name.is_empty() {
        raw_to_nice(substitute_name)
    } else {
        print_name.to_string()
    };
    let meta = std::fs::symlink_metadata(path).with_path(path)?;
    if meta.is_dir() {
        std::fs::remove_dir(path).with_path(path)?;
    } else {
        std::fs::remove_file(path).with_path(path)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, path).with_path(path)?;
    Ok(())
}

/// Remove only the junction metadata; the directory remains
#[cfg(windows)]
pub fn delete_junction_data(path: &Path) -> Result<()> {
    win::delete_reparse_data(path, ReparseTag::MountPoint)
}

/// Junctions have no POSIX rendering
#[cfg(not(windows))]
pub fn delete_junction_data(path: &Path) -> Result<()> {
    Err(unsupported(path, "junctions are not supported on this platform"))
}

/// Remove only the symlink metadata; the underlying entry remains
#[cfg(windows)]
pub fn delete_symlink_data(path: &Path) -> Result<()> {
    win::delete_reparse_data(path, ReparseTag::Symlink)
}

/// POSIX rendering: swap the symlink for an empty entry of the shape the
/// link presented (directory target becomes an empty directory).
#[cfg(not(windows))]
pub fn delete_symlink_data(path: &Path) -> Result<()> {
    let points_to_dir = std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false);
    std::fs::remove_file(path).with_path(path)?;
    if points_to_dir {
        std::fs::create_dir(path).with_path(path)
    } else {
        super::operations::create_empty_file(path)
    }
}

fn reject_other_tag(path: &Path, wanted: ReparseTag) -> Result<()> {
    if let Some(existing) = read_reparse_data(path)? {
        if existing.tag != wanted {
            return Err(MirrorError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "a reparse point with a different tag is present",
                ),
            });
        }
    }
    Ok(())
}

#[cfg(not(windows))]
fn unsupported(path: &Path, message: &str) -> MirrorError {
    MirrorError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Unsupported, message),
    }
}

#[cfg(windows)]
mod win {
    use super::{ReparsePointData, ReparseTag, TAG_MOUNT_POINT, TAG_SYMLINK};
    use crate::error::{MirrorError, Result};
    use crate::fs::operations::win::{open_handle, OwnedHandle};
    use std::io;
    use std::path::Path;
    use std::ptr;
    use winapi::shared::minwindef::DWORD;
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::winioctl::{
        FSCTL_DELETE_REPARSE_POINT, FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT,
    };
    use winapi::um::winnt::GENERIC_WRITE;

    const MAXIMUM_REPARSE_DATA_BUFFER_SIZE: usize = 16 * 1024;
    const SYMLINK_FLAG_RELATIVE: u32 = 0x0000_0001;

    fn malformed(path: &Path) -> MirrorError {
        MirrorError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, "malformed reparse data buffer"),
        }
    }

    fn read_u16(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    fn read_u32(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ])
    }

    fn decode_wide(buf: &[u8]) -> String {
        let units: Vec<u16> = buf
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }

    fn encode_wide(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    fn ioctl(
        handle: &OwnedHandle,
        code: DWORD,
        input: Option<&[u8]>,
        output: Option<&mut [u8]>,
    ) -> io::Result<usize> {
        let mut returned: DWORD = 0;
        let (in_ptr, in_len) = match input {
            Some(buf) => (buf.as_ptr() as *mut _, buf.len() as DWORD),
            None => (ptr::null_mut(), 0),
        };
        let (out_ptr, out_len) = match output {
            Some(buf) => (buf.as_mut_ptr() as *mut _, buf.len() as DWORD),
            None => (ptr::null_mut(), 0),
        };
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                code,
                in_ptr,
                in_len,
                out_ptr,
                out_len,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(returned as usize)
    }

    pub fn get_reparse_data(path: &Path) -> Result<Option<ReparsePointData>> {
        use crate::error::IoResultExt;
        use crate::fs::operations::read_attributes;

        let attrs = read_attributes(path)?;
        if !attrs.flags.is_reparse_point() {
            return Ok(None);
        }

        let handle = open_handle(path, 0).with_path(path)?;
        let mut buf = vec![0u8; MAXIMUM_REPARSE_DATA_BUFFER_SIZE];
        let len = ioctl(&handle, FSCTL_GET_REPARSE_POINT, None, Some(&mut buf))
            .with_path(path)?;
        buf.truncate(len);

        if buf.len() < 16 {
            return Err(malformed(path));
        }
        let tag_value = read_u32(&buf, 0);
        // Header: tag u32, data length u16, reserved u16. The name table
        // starts at 8 for mount points and 8 + flags u32 for symlinks.
        let (tag, names_at, relative) = match tag_value {
            TAG_MOUNT_POINT => (ReparseTag::MountPoint, 16usize, false),
            TAG_SYMLINK => {
                if buf.len() < 20 {
                    return Err(malformed(path));
                }
                let flags = read_u32(&buf, 16);
                (ReparseTag::Symlink, 20usize, flags & SYMLINK_FLAG_RELATIVE != 0)
            }
            other => {
                return Err(MirrorError::UnrecognizedReparseTag {
                    path: path.to_path_buf(),
                    tag: other,
                })
            }
        };

        let substitute_offset = read_u16(&buf, 8) as usize;
        let substitute_len = read_u16(&buf, 10) as usize;
        let print_offset = read_u16(&buf, 12) as usize;
        let print_len = read_u16(&buf, 14) as usize;

        let substitute_end = names_at + substitute_offset + substitute_len;
        let print_end = names_at + print_offset + print_len;
        if substitute_end > buf.len() || print_end > buf.len() {
            return Err(malformed(path));
        }
        let substitute_name =
            decode_wide(&buf[names_at + substitute_offset..substitute_end]);
        let print_name = decode_wide(&buf[names_at + print_offset..print_end]);

        Ok(Some(ReparsePointData {
            tag,
            substitute_name,
            print_name,
            relative,
        }))
    }

    pub fn set_reparse_data(
        path: &Path,
        tag: ReparseTag,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()> {
        use crate::error::IoResultExt;

        let substitute = encode_wide(substitute_name);
        let print = encode_wide(print_name);

        // Name table: substitute, NUL, print, NUL.
        let mut names = Vec::with_capacity(substitute.len() + print.len() + 4);
        names.extend_from_slice(&substitute);
        names.extend_from_slice(&[0, 0]);
        names.extend_from_slice(&print);
        names.extend_from_slice(&[0, 0]);

        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_le_bytes()); // substitute offset
        body.extend_from_slice(&(substitute.len() as u16).to_le_bytes());
        body.extend_from_slice(&((substitute.len() + 2) as u16).to_le_bytes()); // print offset
        body.extend_from_slice(&(print.len() as u16).to_le_bytes());
        if tag == ReparseTag::Symlink {
            let flags = if relative { SYMLINK_FLAG_RELATIVE } else { 0 };
            body.extend_from_slice(&flags.to_le_bytes());
        }
        body.extend_from_slice(&names);

        let mut buf = Vec::with_capacity(8 + body.len());
        buf.extend_from_slice(&tag.raw_value().to_le_bytes());
        buf.extend_from_slice(&(body.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // reserved
        buf.extend_from_slice(&body);

        let handle = open_handle(path, GENERIC_WRITE).with_path(path)?;
        ioctl(&handle, FSCTL_SET_REPARSE_POINT, Some(&buf), None).with_path(path)?;
        Ok(())
    }

    pub fn delete_reparse_data(path: &Path, tag: ReparseTag) -> Result<()> {
        use crate::error::IoResultExt;

        // Header only: tag, zero data length, reserved.
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&tag.raw_value().to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());

        let handle = open_handle(path, GENERIC_WRITE).with_path(path)?;
        ioctl(&handle, FSCTL_DELETE_REPARSE_POINT, Some(&buf), None).with_path(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_forms() {
        assert_eq!(raw_to_nice(r"\??\C:\foo"), r"\\?\C:\foo");
        assert_eq!(nice_to_raw(r"\\?\C:\foo"), r"\??\C:\foo");
        assert_eq!(
            raw_to_nice(r"\??\Volume{3a1b}\x"),
            r"\\?\Volume{3a1b}\x"
        );
        // Plain names pass through both ways.
        assert_eq!(raw_to_nice(r"C:\foo"), r"C:\foo");
        assert_eq!(nice_to_raw("../relative"), "../relative");
    }

    #[test]
    fn test_roundtrip_is_inverse() {
        for name in [r"\??\C:\a", r"\\?\C:\a", r"relative\path", ""] {
            assert_eq!(nice_to_raw(&raw_to_nice(name)), nice_to_raw(name));
        }
    }

    #[test]
    fn test_tag_values() {
        assert_eq!(ReparseTag::MountPoint.raw_value(), 0xA000_0003);
        assert_eq!(ReparseTag::Symlink.raw_value(), 0xA000_000C);
    }

    #[test]
    fn test_regular_entries_have_no_reparse_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        assert!(read_reparse_data(&file).unwrap().is_none());
        assert!(read_reparse_data(dir.path()).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_read_and_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, b"x").unwrap();

        // Placeholder file, then symlink data on it.
        let link = dir.path().join("link");
        super::super::operations::create_empty_file(&link).unwrap();
        let target_str = target.to_string_lossy().into_owned();
        set_symlink_data(&link, &target_str, &target_str, false).unwrap();

        let data = read_reparse_data(&link).unwrap().unwrap();
        assert_eq!(data.tag, ReparseTag::Symlink);
        assert_eq!(data.substitute_name, target_str);
        assert!(!data.relative);
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_symlink_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("target.txt"), b"x").unwrap();
        let link = dir.path().join("rel-link");
        super::super::operations::create_empty_file(&link).unwrap();
        set_symlink_data(&link, "target.txt", "target.txt", true).unwrap();

        let data = read_reparse_data(&link).unwrap().unwrap();
        assert!(data.relative);
        assert_eq!(data.print_name, "target.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_symlink_data_keeps_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        delete_symlink_data(&link).unwrap();
        assert!(read_reparse_data(&link).unwrap().is_none());
        assert!(link.exists());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_junctions_unsupported_off_windows() {
        let dir = tempfile::TempDir::new().unwrap();
        let sub = dir.path().join("j");
        std::fs::create_dir(&sub).unwrap();
        assert!(set_junction_data(&sub, r"\??\C:\x", r"C:\x").is_err());
        assert!(delete_junction_data(&sub).is_err());
    }

    #[cfg(windows)]
    #[test]
    fn test_junction_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let junction = dir.path().join("junction");
        std::fs::create_dir(&junction).unwrap();

        let raw = nice_to_raw(&format!(r"\\?\{}", target.display()));
        set_junction_data(&junction, &raw, &target.display().to_string()).unwrap();

        let data = read_reparse_data(&junction).unwrap().unwrap();
        assert_eq!(data.tag, ReparseTag::MountPoint);
        assert_eq!(data.substitute_name, raw);

        delete_junction_data(&junction).unwrap();
        assert!(read_reparse_data(&junction).unwrap().is_none());
        assert!(junction.is_dir());
    }
}
