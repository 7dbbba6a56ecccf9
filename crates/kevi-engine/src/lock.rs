//! Process-wide lock around manifest builds
//!
//! Every manifest build in the process runs under `MANIFEST_BUILD_LOCK`.
//! Chart renders do not take it.

use std::sync::{Mutex, PoisonError};

static MANIFEST_BUILD_LOCK: Mutex<()> = Mutex::new(());

/// Run `f` while holding the manifest build lock
///
/// A poisoned lock is recovered: the guarded state is `()`, so a panic in a
/// previous build leaves nothing inconsistent behind.
pub fn with_manifest_build_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = MANIFEST_BUILD_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    tracing::debug!("acquired manifest build lock");
    f()
}
