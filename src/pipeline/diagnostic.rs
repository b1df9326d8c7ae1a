//! On-disk session dump for inspecting how documents were identified.
//!
//! Written only when `BillsenseConfig::dump_dir` is set (`--dump-dir`,
//! `--dump` or `BILLSENSE_DUMP_DIR`). Layout:
//! ```text
//! {dump_dir}/{session_id}/
//!   00-report.json
//!   01-{fingerprint}-canonical.txt
//!   01-{fingerprint}-snapshot.json
//! ```
//! Write failures are logged and skipped; a dump never fails the session.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Directory receiving one session's artifacts.
#[derive(Debug, Clone)]
pub struct SessionDump {
    dir: PathBuf,
}

impl SessionDump {
    /// Create `{base}/{session_id}`. `None` when the directory cannot be made.
    pub fn open(base: &Path, session_id: &Uuid) -> Option<Self> {
        let dir = base.join(session_id.to_string());
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(Self { dir }),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Session dump unavailable");
                None
            }
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Pretty JSON, e.g. the report or a document snapshot.
    pub fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> bool {
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.write(name, json.as_bytes()),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Session dump: serialization failed");
                false
            }
        }
    }

    /// A canonical identity string, verbatim.
    pub fn write_text(&self, name: &str, text: &str) -> bool {
        self.write(name, text.as_bytes())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> bool {
        let path = self.dir.join(name);
        match std::fs::write(&path, bytes) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "Session dump: wrote");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Session dump: write failed");
                false
            }
        }
    }
}
