//! Utility functions for file operations and path manipulation

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Buffer size for streaming reads while hashing or copying
pub(crate) const IO_BUFFER_SIZE: usize = 64 * 1024;

/// Name under which a version of `file_name` is stored in the public folder
///
/// The version is appended to the file stem so that several versions can
/// live side by side and keep their extension.
///
/// # Examples
///
/// ```
/// use file_publish::utils::stored_file_name;
///
/// assert_eq!(stored_file_name("report.pdf", 3), "report_v3.pdf");
/// assert_eq!(stored_file_name("archive.tar.gz", 1), "archive.tar_v1.gz");
/// assert_eq!(stored_file_name("Makefile", 2), "Makefile_v2");
/// assert_eq!(stored_file_name(".profile", 1), ".profile_v1");
/// ```
#[must_use]
pub fn stored_file_name(file_name: &str, version: i64) -> String {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str());
    let extension = path.extension().and_then(|e| e.to_str());

    match (stem, extension) {
        (Some(stem), Some(ext)) => format!("{}_v{}.{}", stem, version, ext),
        _ => format!("{}_v{}", file_name, version),
    }
}

/// Loose email syntax check: exactly one `@`, non-empty local part and domain,
/// no whitespace
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty() && !domain.is_empty() && !email.chars().any(char::is_whitespace)
}

/// Compute the lowercase hex MD5 digest and length of a file
pub fn hash_file(path: &Path) -> io::Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; IO_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        context.consume(&buffer[..n]);
        total += n as u64;
    }

    Ok((total, format!("{:x}", context.compute())))
}

/// Whether two existing paths live on the same filesystem
#[cfg(unix)]
pub fn same_device(a: &Path, b: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    Ok(std::fs::metadata(a)?.dev() == std::fs::metadata(b)?.dev())
}

/// Rename `from` to `to`, failing with `AlreadyExists` rather than replacing `to`
///
/// Uses `renameat2(RENAME_NOREPLACE)` on Linux. Where that is unavailable
/// (other unixes, filesystems rejecting the flag) a hard link followed by
/// removal of `from` gives the same guarantee.
pub fn rename_noclobber(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_from = CString::new(from.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let c_to = CString::new(to.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: both paths are valid NUL-terminated strings that outlive the call
        let rc = unsafe {
            libc::renameat2(
                libc::AT_FDCWD,
                c_from.as_ptr(),
                libc::AT_FDCWD,
                c_to.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if !matches!(err.raw_os_error(), Some(libc::EINVAL) | Some(libc::ENOSYS)) {
            return Err(err);
        }
    }

    std::fs::hard_link(from, to)?;
    if let Err(e) = std::fs::remove_file(from) {
        // Leave `from` as the only name again
        let _ = std::fs::remove_file(to);
        return Err(e);
    }
    Ok(())
}

/// Resolve a numeric user id to a login name
///
/// Falls back to the decimal uid when the account has no passwd entry.
#[cfg(unix)]
pub fn owner_name(uid: u32) -> String {
    use std::ffi::CStr;

    let mut buffer = vec![0 as libc::c_char; 4096];
    // SAFETY: passwd is plain old data and only read after a successful call
    let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all pointers reference live, properly sized buffers owned by
    // this frame; getpwuid_r writes only within `buffer` and `passwd`
    let rc = unsafe {
        libc::getpwuid_r(
            uid,
            &mut passwd,
            buffer.as_mut_ptr(),
            buffer.len(),
            &mut result,
        )
    };

    if rc != 0 || result.is_null() || passwd.pw_name.is_null() {
        return uid.to_string();
    }

    // SAFETY: on success pw_name points to a NUL-terminated string inside `buffer`
    let name = unsafe { CStr::from_ptr(passwd.pw_name) };
    name.to_str()
        .map(str::to_string)
        .unwrap_or_else(|_| uid.to_string())
}

/// Owner of a file as a login name
#[cfg(unix)]
pub fn file_owner(path: &Path) -> io::Result<String> {
    use std::os::unix::fs::MetadataExt;

    Ok(owner_name(std::fs::metadata(path)?.uid()))
}

/// Get available disk space for a given path
///
/// Returns the number of bytes available to unprivileged users on the
/// filesystem containing the path.
///
/// # Errors
///
/// Returns an error if the path doesn't exist or filesystem stats cannot be read.
pub fn get_available_space(path: &Path) -> io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: This is safe because:
        // 1. c_path is a valid, null-terminated C string created from the input path
        // 2. stat is zeroed before the call and only read after it succeeds
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(io::Error::last_os_error());
            }

            // f_bavail counts blocks for unprivileged users, f_frsize is the fragment size
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
