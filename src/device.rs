use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-install identifier that partitions records by owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub const UNKNOWN: &'static str = "UnknownDeviceID";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Picks the identifier for this run: an explicit value wins, then the id
    /// persisted in `id_file`, then a freshly generated one written to
    /// `id_file`. Falls back to [`DeviceId::UNKNOWN`] rather than failing.
    pub fn resolve(explicit: Option<&str>, id_file: &Path) -> Self {
        if let Some(value) = explicit.map(str::trim).filter(|value| !value.is_empty()) {
            return Self::new(value);
        }

        match std::fs::read_to_string(id_file) {
            Ok(content) if !content.trim().is_empty() => {
                debug!(path = %id_file.display(), "Loaded persisted device id");
                return Self::new(content.trim());
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %id_file.display(), error = %err, "Could not read device id file");
                return Self::unknown();
            }
        }

        let generated = Uuid::new_v4().to_string();
        match std::fs::write(id_file, &generated) {
            Ok(()) => {
                info!(path = %id_file.display(), "Generated new device id");
                Self(generated)
            }
            Err(err) => {
                warn!(path = %id_file.display(), error = %err, "Could not persist device id");
                Self::unknown()
            }
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
