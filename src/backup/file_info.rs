use serde::{Deserialize, Serialize};

/// Filesystem metadata for one path entry: a regular file, a directory, or a
/// non-regular entry (symlink, device, fifo). Content lives elsewhere — in
/// `Index::pathnames` for regular files, pointing at an `Object`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: i64,
    pub symlink_target: Option<String>,
}

impl FileInfo {
    pub fn from_metadata(meta: &std::fs::Metadata, symlink_target: Option<String>) -> Self {
        use std::os::unix::fs::MetadataExt;
        FileInfo {
            mode: meta.mode(),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            mtime: meta.mtime(),
            symlink_target,
        }
    }
}
