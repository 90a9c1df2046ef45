use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CURRENT_VERSION;
use crate::tools;

/// Snapshot metadata, immutable once the snapshot is constructed
/// (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub uuid: Uuid,
    pub creation_time: String,
    pub version: String,
    pub hostname: String,
    pub username: String,
    pub command_line: String,
    pub machine_id: String,
    /// Base64 of the signing public key; empty if the snapshot is unsigned.
    pub public_key: String,
}

impl Metadata {
    /// Capture host identity metadata for a freshly created snapshot.
    pub fn capture(uuid: Uuid, public_key: Option<&[u8]>) -> Self {
        let command_line: String = std::env::args().collect::<Vec<_>>().join(" ");
        Metadata {
            uuid,
            creation_time: now_rfc3339(),
            version: CURRENT_VERSION.to_string(),
            hostname: tools::hostname(),
            username: tools::username(),
            command_line,
            machine_id: tools::machine_id(),
            public_key: public_key.map(base64::encode).unwrap_or_default(),
        }
    }
}

/// Current time formatted as an RFC3339-ish timestamp without pulling in a
/// datetime crate: seconds since the epoch is sufficient for the metadata
/// field, which is informational only and never parsed by the core.
fn now_rfc3339() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", since_epoch.as_secs())
}
