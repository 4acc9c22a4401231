//! Recovery of remote paths that vanished between listing and use.
//!
//! When a client asks for a directory that no longer exists, the service
//! answers with the closest ancestor that still does, so the client can
//! navigate there instead of showing a dead end.

use crate::paths;
use crate::remote::{RemoteError, RemoteStore};

/// Walk from `path` towards the root until an existing directory is found.
///
/// The root is never stat-ed: it always exists. An existing file resolves to
/// its parent directory. `NotFound` moves one level up; any other error is
/// returned unchanged. At most `depth(path)` stat calls are made.
pub async fn resolve_existing(
    store: &dyn RemoteStore,
    path: &str,
) -> Result<String, RemoteError> {
    let mut current = paths::normalize(path);

    loop {
        if paths::is_root(&current) {
            return Ok("/".to_string());
        }

        match store.stat(&current).await {
            Ok(meta) if meta.is_dir() => return Ok(current),
            Ok(_) => {}
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(path = %current, "Path missing, trying parent");
            }
            Err(e) => return Err(e),
        }

        current = paths::parent(&current);
    }
}
