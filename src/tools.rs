//! Small filesystem and host-identity helpers shared by the store backends
//! and the snapshot core.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use nix::unistd;

use crate::error::Error;

/// Atomically write `data` to `path` via a temp file in the same directory
/// followed by `rename(2)`. A rename that loses a race to another writer of
/// the same content-addressed path is folded into success: same checksum
/// means same bytes (SPEC_FULL.md §4.2, "Puts ... are idempotent").
pub fn replace_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut template = dir.join(format!(
        ".{}.tmp_XXXXXX",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp")
    ));
    let (fd, tmp_path) = unistd::mkstemp(&template)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    template.pop();

    let result = (|| -> Result<(), Error> {
        use std::os::unix::io::FromRawFd;
        let mut file = unsafe { File::from_raw_fd(fd) };
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = unistd::unlink(&tmp_path);
        return Err(err);
    }

    match fs::rename(&tmp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            // Another writer may have already produced the same
            // content-addressed blob; treat "destination exists" as success.
            if path.exists() {
                let _ = unistd::unlink(&tmp_path);
                Ok(())
            } else {
                let _ = unistd::unlink(&tmp_path);
                Err(Error::Io(err))
            }
        }
    }
}

/// Best-effort local hostname, used to populate `Metadata.hostname`.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    nix::unistd::gethostname(&mut buf)
        .ok()
        .and_then(|cstr| cstr.to_str().ok().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Best-effort local username, used to populate `Metadata.username`.
pub fn username() -> String {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| "unknown".to_string())
}

/// A stable-enough machine identifier for `Metadata.machine_id`: the
/// `/etc/machine-id` contents when readable, otherwise the hostname.
pub fn machine_id() -> String {
    fs::read_to_string("/etc/machine-id")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| hostname())
}
