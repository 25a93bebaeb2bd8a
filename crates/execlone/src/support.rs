//! Platform support check

use crate::memfd::AnonymousFile;
use serde::{Deserialize, Serialize};

/// Information about sealed-memfd support on the current system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportInfo {
    /// Whether clones can be created and sealed
    pub is_supported: bool,
    /// Platform name
    pub platform: String,
    /// Details about what was checked
    pub details: String,
}

/// Create and seal a throwaway memfd to see whether cloning can work here.
#[must_use]
pub fn support_info() -> SupportInfo {
    let outcome = AnonymousFile::create("execlone-support").and_then(|memfd| {
        memfd.seal()?;
        memfd.seals()
    });

    match outcome {
        Ok(seals) if seals.is_immutable() => SupportInfo {
            is_supported: true,
            platform: "linux".to_string(),
            details: format!("memfd_create with sealing available (seals: {seals})"),
        },
        Ok(seals) => SupportInfo {
            is_supported: false,
            platform: "linux".to_string(),
            details: format!("memfd sealing incomplete (seals: {seals})"),
        },
        Err(e) => SupportInfo {
            is_supported: false,
            platform: "linux".to_string(),
            details: format!(
                "{e}. Requires Linux 3.17+ with memfd_create and file sealing."
            ),
        },
    }
}
