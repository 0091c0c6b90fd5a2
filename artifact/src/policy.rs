/// A caller-supplied description of how completely `files/` must be
/// materialized for `cached()` to report a hit. The core never chooses
/// this itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializationPolicy {
    pub require_directories: bool,
    pub require_files: bool,
}

impl MaterializationPolicy {
    /// `files/` need not be present at all; a metadata-only hit counts.
    pub fn metadata_only() -> MaterializationPolicy {
        MaterializationPolicy {
            require_directories: false,
            require_files: false,
        }
    }

    /// `files/`'s manifests must be present, but file blobs may be absent.
    pub fn directories_only() -> MaterializationPolicy {
        MaterializationPolicy {
            require_directories: true,
            require_files: false,
        }
    }

    /// `files/` must be fully materialized, manifests and blobs alike.
    pub fn full() -> MaterializationPolicy {
        MaterializationPolicy {
            require_directories: true,
            require_files: true,
        }
    }
}
