#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard};
use solvra_main::harness::{TEST_DATA_ROOT, install_tracing};
use std::fs;
use std::path::{Path, PathBuf};

// Tests in one binary run on several threads; anything that installs a
// cache-dir override holds this first.
static ENV_LOCK: Mutex<()> = Mutex::new(());

pub fn env_lock() -> MutexGuard<'static, ()> {
    install_tracing();
    ENV_LOCK.lock()
}

pub fn fixture(relative: &str) -> PathBuf {
    Path::new(TEST_DATA_ROOT).join(relative)
}

pub fn write_script(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).expect("write script");
    path
}

pub fn cache_artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut artifacts: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "smc"))
                .collect()
        })
        .unwrap_or_default();
    artifacts.sort();
    artifacts
}
