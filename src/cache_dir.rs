//=====================================================
// File: cache_dir.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Process-wide compiled-scripts cache directory setting
// Objective: Single choke point for reading the cache-dir variable and for
//            overriding it for the duration of a scoped block
//=====================================================

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use tracing::debug;

/// Environment variable telling the host where compiled scripts are cached.
///
/// Unset selects the user cache directory, an empty value disables
/// caching, anything else is used as the cache directory.
pub const COMPILED_SCRIPTS_CACHE_DIR_VAR: &str = "SOLVRA_MAIN_COMPILED_SCRIPTS_CACHE_DIR";

const DEFAULT_CACHE_SUBDIR: &str = "solvra.main.scripts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDirSetting {
    Default,
    Disabled,
    Directory(PathBuf),
}

impl CacheDirSetting {
    /// Where artifacts go, or `None` when caching is off.
    pub fn resolve(&self) -> Option<PathBuf> {
        match self {
            CacheDirSetting::Default => dirs::cache_dir().map(|dir| dir.join(DEFAULT_CACHE_SUBDIR)),
            CacheDirSetting::Disabled => None,
            CacheDirSetting::Directory(dir) => Some(dir.clone()),
        }
    }
}

/// Raw value of the setting, `None` when unset.
pub fn current() -> Option<OsString> {
    env::var_os(COMPILED_SCRIPTS_CACHE_DIR_VAR)
}

pub fn setting() -> CacheDirSetting {
    match current() {
        None => CacheDirSetting::Default,
        Some(value) if value.is_empty() => CacheDirSetting::Disabled,
        Some(value) => CacheDirSetting::Directory(PathBuf::from(value)),
    }
}

fn store(value: Option<&OsStr>) {
    // SAFETY: overrides are used sequentially; no other thread touches the
    // environment while an override is being installed or restored.
    match value {
        Some(value) => unsafe { env::set_var(COMPILED_SCRIPTS_CACHE_DIR_VAR, value) },
        None => unsafe { env::remove_var(COMPILED_SCRIPTS_CACHE_DIR_VAR) },
    }
}

/// Installs a cache-dir value and puts the previous one back when dropped,
/// including while unwinding from a panic.
///
/// Not reentrant-safe: concurrent or interleaved overrides race on the same
/// process-wide variable.
#[must_use = "the previous value is restored as soon as the guard is dropped"]
pub struct CacheDirOverride {
    previous: Option<OsString>,
}

impl CacheDirOverride {
    /// `None` clears the setting for the lifetime of the guard.
    pub fn install<S: AsRef<OsStr>>(value: Option<S>) -> Self {
        let previous = current();
        let value: Option<&OsStr> = value.as_ref().map(|v| v.as_ref());
        debug!(
            previous = ?previous,
            value = ?value,
            "installing compiled-scripts cache dir override"
        );
        store(value);
        Self { previous }
    }
}

impl Drop for CacheDirOverride {
    fn drop(&mut self) {
        store(self.previous.as_deref());
        debug!(restored = ?self.previous, "restored compiled-scripts cache dir");
    }
}

/// Runs `body` with the cache-dir setting replaced by `value` (or cleared
/// when `None`), restoring the prior value on every exit path.
pub fn with_cache_dir<S, T>(value: Option<S>, body: impl FnOnce() -> T) -> T
where
    S: AsRef<OsStr>,
{
    let _guard = CacheDirOverride::install(value);
    body()
}

#[cfg(test)]
pub(crate) static TEST_ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
