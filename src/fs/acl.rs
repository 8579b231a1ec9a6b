//! Security-descriptor copying
//!
//! Reads and applies the binary security descriptor of a file or
//! directory: owner, group, DACL, and (when the process holds
//! SeSecurityPrivilege) SACL, all in one opaque self-relative blob.
//! Applying an inheritable ACL to a directory can cascade into existing
//! children, so callers apply a directory's descriptor BEFORE syncing
//! that directory's children.

use crate::error::Result;
use std::path::Path;

/// Opaque self-relative security descriptor bytes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityDescriptor {
    bytes: Vec<u8>,
}

impl SecurityDescriptor {
    /// Wrap raw self-relative descriptor bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw descriptor bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether any descriptor data is present
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read the full security descriptor of a file or directory
#[cfg(windows)]
pub fn get_security_descriptor(path: &Path, is_dir: bool) -> Result<SecurityDescriptor> {
    use crate::error::IoResultExt;
    tracing::trace!(
        "reading security descriptor of {} '{}'",
        if is_dir { "directory" } else { "file" },
        path.display()
    );
    win::get_file_security(path).with_path(path)
}

/// Security descriptors have no rendering on this platform
#[cfg(not(windows))]
pub fn get_security_descriptor(path: &Path, is_dir: bool) -> Result<SecurityDescriptor> {
    tracing::trace!(
        "no security descriptor support for {} '{}' on this platform",
        if is_dir { "directory" } else { "file" },
        path.display()
    );
    Ok(SecurityDescriptor::default())
}

/// Apply all sections of a security descriptor to a file or directory
#[cfg(windows)]
pub fn set_security_descriptor(
    path: &Path,
    is_dir: bool,
    descriptor: &SecurityDescriptor,
) -> Result<()> {
    use crate::error::IoResultExt;
    if descriptor.is_empty() {
        return Ok(());
    }
    tracing::trace!(
        "applying security descriptor to {} '{}'",
        if is_dir { "directory" } else { "file" },
        path.display()
    );
    win::set_file_security(path, descriptor.as_bytes()).with_path(path)
}

/// No-op on this platform
#[cfg(not(windows))]
pub fn set_security_descriptor(
    path: &Path,
    is_dir: bool,
    descriptor: &SecurityDescriptor,
) -> Result<()> {
    let _ = (is_dir, descriptor);
    Ok(())
}

/// Copy the security descriptor from one entry to another
pub fn copy_security(src: &Path, dst: &Path, is_dir: bool) -> Result<()> {
    let descriptor = get_security_descriptor(src, is_dir)?;
    set_security_descriptor(dst, is_dir, &descriptor)
}

#[cfg(windows)]
mod win {
    use super::SecurityDescriptor;
    use crate::fs::operations::win::wide;
    use std::io;
    use std::path::Path;
    use winapi::shared::minwindef::DWORD;
    use winapi::shared::winerror::ERROR_INSUFFICIENT_BUFFER;
    use winapi::um::winbase::{GetFileSecurityW, SetFileSecurityW};
    use winapi::um::winnt::{
        DACL_SECURITY_INFORMATION, GROUP_SECURITY_INFORMATION, OWNER_SECURITY_INFORMATION,
        SACL_SECURITY_INFORMATION, SECURITY_INFORMATION,
    };

    const FULL_SECTIONS: SECURITY_INFORMATION = OWNER_SECURITY_INFORMATION
        | GROUP_SECURITY_INFORMATION
        | DACL_SECURITY_INFORMATION
        | SACL_SECURITY_INFORMATION;
    const UNPRIVILEGED_SECTIONS: SECURITY_INFORMATION =
        OWNER_SECURITY_INFORMATION | GROUP_SECURITY_INFORMATION | DACL_SECURITY_INFORMATION;

    fn read_with_sections(
        path: &Path,
        sections: SECURITY_INFORMATION,
    ) -> io::Result<SecurityDescriptor> {
        let wide_path = wide(path);
        let mut needed: DWORD = 0;
        let ok = unsafe {
            GetFileSecurityW(wide_path.as_ptr(), sections, std::ptr::null_mut(), 0, &mut needed)
        };
        if ok == 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(ERROR_INSUFFICIENT_BUFFER as i32) {
                return Err(err);
            }
        }
        let mut buf = vec![0u8; needed as usize];
        let ok = unsafe {
            GetFileSecurityW(
                wide_path.as_ptr(),
                sections,
                buf.as_mut_ptr() as *mut _,
                needed,
                &mut needed,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(SecurityDescriptor::from_bytes(buf))
    }

    pub fn get_file_security(path: &Path) -> io::Result<SecurityDescriptor> {
        // SACL access requires SeSecurityPrivilege; fall back without it.
        match read_with_sections(path, FULL_SECTIONS) {
            Ok(descriptor) => Ok(descriptor),
            Err(_) => read_with_sections(path, UNPRIVILEGED_SECTIONS),
        }
    }

    pub fn set_file_security(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let wide_path = wide(path);
        let apply = |sections: SECURITY_INFORMATION| -> io::Result<()> {
            let ok = unsafe {
                SetFileSecurityW(wide_path.as_ptr(), sections, bytes.as_ptr() as *mut _)
            };
            if ok == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        };
        match apply(FULL_SECTIONS) {
            Ok(()) => Ok(()),
            Err(_) => apply(UNPRIVILEGED_SECTIONS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_descriptor_wrapper() {
        let empty = SecurityDescriptor::default();
        assert!(empty.is_empty());

        let descriptor = SecurityDescriptor::from_bytes(vec![1, 2, 3]);
        assert_eq!(descriptor.as_bytes(), &[1, 2, 3]);
        assert!(!descriptor.is_empty());
    }

    #[test]
    fn test_copy_security_between_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"x").unwrap();
        std::fs::write(&b, b"y").unwrap();

        copy_security(&a, &b, false).unwrap();
        #[cfg(windows)]
        {
            let sd_a = get_security_descriptor(&a, false).unwrap();
            assert!(!sd_a.is_empty());
        }
    }

    #[test]
    fn test_directory_descriptor() {
        let dir = TempDir::new().unwrap();
        let descriptor = get_security_descriptor(dir.path(), true).unwrap();
        set_security_descriptor(dir.path(), true, &descriptor).unwrap();
    }
}
