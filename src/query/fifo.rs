//! Named-pipe setup for the server's request and response channels.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{IndexError, Result};

/// Make sure `path` is a FIFO: create it (mode 0666) if missing, accept an
/// existing FIFO, reject anything else.
#[cfg(unix)]
pub fn ensure_fifo(path: &Path) -> Result<()> {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(IndexError::Protocol(format!(
            "{} exists and is not a FIFO",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                IndexError::Protocol(format!("pipe path {} contains a NUL byte", path.display()))
            })?;
            // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
            let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
            if rc != 0 {
                return Err(io::Error::last_os_error().into());
            }
            tracing::info!(path = %path.display(), "created FIFO");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Open a pipe end for both reading and writing, so the open never blocks
/// waiting for the peer to appear.
pub fn open_pipe(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().read(true).write(true).open(path)?)
}

#[cfg(not(unix))]
pub fn ensure_fifo(path: &Path) -> Result<()> {
    Err(IndexError::Protocol(format!(
        "named pipes are not supported on this platform: {}",
        path.display()
    )))
}
