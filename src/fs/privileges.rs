//! Process privilege setup
//!
//! Backup semantics only bypass ACL checks once the process token holds
//! the backup and restore privileges, and SACL access additionally needs
//! the security privilege. These are enabled once, before the engine
//! runs; a privilege the account does not hold is logged and skipped.

use crate::error::Result;

/// Privileges the mirroring process asks for
#[cfg(windows)]
const WANTED_PRIVILEGES: [&str; 4] = [
    "SeBackupPrivilege",
    "SeRestorePrivilege",
    "SeSecurityPrivilege",
    "SeTakeOwnershipPrivilege",
];

/// Enable the backup, restore, and security privileges on the process
/// token. Privileges the account lacks are reported and skipped; only a
/// failure to open the token itself is an error.
#[cfg(windows)]
pub fn enable_backup_privileges() -> Result<()> {
    use std::io;

    let token = win::open_process_token()
        .map_err(|e| crate::error::MirrorError::config(format!("could not open process token: {e}")))?;
    for name in WANTED_PRIVILEGES {
        match win::enable_privilege(&token, name) {
            Ok(()) => tracing::debug!("enabled {name}"),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::warn!("privilege {name} not held; continuing without it")
            }
            Err(e) => tracing::warn!("could not enable {name}: {e}"),
        }
    }
    Ok(())
}

/// No privilege model to adjust on this platform
#[cfg(not(windows))]
pub fn enable_backup_privileges() -> Result<()> {
    tracing::debug!("no backup privileges to enable on this platform");
    Ok(())
}

#[cfg(windows)]
mod win {
    use std::io;
    use std::os::windows::ffi::OsStrExt;
    use winapi::shared::winerror::ERROR_NOT_ALL_ASSIGNED;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::processthreadsapi::{GetCurrentProcess, OpenProcessToken};
    use winapi::um::securitybaseapi::AdjustTokenPrivileges;
    use winapi::um::winbase::LookupPrivilegeValueW;
    use winapi::um::winnt::{
        HANDLE, LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES,
        TOKEN_PRIVILEGES, TOKEN_QUERY,
    };

    pub struct Token(HANDLE);

    impl Drop for Token {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    pub fn open_process_token() -> io::Result<Token> {
        let mut handle: HANDLE = std::ptr::null_mut();
        let ok = unsafe {
            OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut handle,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Token(handle))
    }

    pub fn enable_privilege(token: &Token, name: &str) -> io::Result<()> {
        let wide: Vec<u16> = std::ffi::OsStr::new(name)
            .encode_wide()
            .chain(Some(0))
            .collect();

        let mut privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: unsafe { std::mem::zeroed() },
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };
        let ok = unsafe {
            LookupPrivilegeValueW(
                std::ptr::null(),
                wide.as_ptr(),
                &mut privileges.Privileges[0].Luid,
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }

        let ok = unsafe {
            AdjustTokenPrivileges(
                token.0,
                0,
                &mut privileges,
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        // AdjustTokenPrivileges succeeds even when nothing was assigned;
        // ERROR_NOT_ALL_ASSIGNED arrives through the thread error state.
        let last = io::Error::last_os_error();
        if last.raw_os_error() == Some(ERROR_NOT_ALL_ASSIGNED as i32) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "privilege not held by this account",
            ));
        }
        Ok(())
    }
}
