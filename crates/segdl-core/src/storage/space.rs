//! Free-space query for the storage headroom check.

use std::path::Path;

/// Bytes available to an unprivileged user on the filesystem holding `path`.
/// `None` when the platform or the path does not allow the query.
#[cfg(unix)]
pub fn available_space(path: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    Some((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
pub fn available_space(_path: &Path) -> Option<u64> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn tempdir_has_some_space() {
        let dir = tempfile::tempdir().unwrap();
        assert!(available_space(dir.path()).is_some());
    }

    #[test]
    fn missing_path_is_none() {
        assert!(available_space(Path::new("/definitely/not/here/segdl")).is_none());
    }
}
