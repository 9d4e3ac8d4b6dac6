//! Labels marking images as managed by this crate.
//!
//! Images without [`REPO_LABEL`] are never deleted or reaped.

/// Organization / repository the image belongs to.
pub const REPO_LABEL: &str = "dev.foundry.repo";

/// Application name within the repository.
pub const APP_LABEL: &str = "dev.foundry.app";

/// Revision of the application.
pub const REVISION_LABEL: &str = "dev.foundry.revision";
