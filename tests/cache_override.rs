mod util;

use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};

use solvra_main::cache_dir::{self, CacheDirSetting, current, with_cache_dir};
use solvra_main::{CacheDirOverride, COMPILED_SCRIPTS_CACHE_DIR_VAR};

#[test]
fn every_override_value_is_restored() {
    let _lock = util::env_lock();
    let original = current();

    let values: [Option<&str>; 4] = [None, Some(""), Some("/tmp/solvra-a"), Some("relative/cache")];
    for outer in values {
        with_cache_dir(outer, || {
            for inner in values {
                let before = current();
                let seen = with_cache_dir(inner, current);
                assert_eq!(seen, inner.map(OsString::from));
                assert_eq!(current(), before);
            }
        });
        assert_eq!(current(), original);
    }
}

#[test]
fn override_is_restored_when_the_body_panics() {
    let _lock = util::env_lock();
    let _baseline = CacheDirOverride::install(Some("/tmp/solvra-baseline"));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        with_cache_dir(Some("/tmp/solvra-panicking"), || {
            panic!("body failed");
        })
    }));
    assert!(result.is_err());
    assert_eq!(
        std::env::var_os(COMPILED_SCRIPTS_CACHE_DIR_VAR),
        Some(OsString::from("/tmp/solvra-baseline"))
    );
}

#[test]
fn absent_override_is_restored_when_the_body_panics() {
    let _lock = util::env_lock();
    let _baseline = CacheDirOverride::install(Some("/tmp/solvra-baseline"));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        with_cache_dir::<_, ()>(None::<&str>, || {
            assert_eq!(current(), None);
            panic!("body failed");
        })
    }));
    assert!(result.is_err());
    assert_eq!(current(), Some(OsString::from("/tmp/solvra-baseline")));
}

#[test]
fn every_override_value_survives_a_panicking_body() {
    let _lock = util::env_lock();
    let values: [Option<&str>; 3] = [None, Some(""), Some("/tmp/solvra-panicking")];
    for baseline in values {
        let _baseline = CacheDirOverride::install(baseline);
        for value in values {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                with_cache_dir::<_, ()>(value, || panic!("body failed"))
            }));
            assert!(result.is_err());
            assert_eq!(current(), baseline.map(OsString::from));
        }
    }
}

#[test]
fn repeated_overrides_are_idempotent() {
    let _lock = util::env_lock();
    let original = current();
    for _ in 0..3 {
        with_cache_dir(Some("/tmp/solvra-repeat"), || {
            assert_eq!(
                cache_dir::setting(),
                CacheDirSetting::Directory("/tmp/solvra-repeat".into())
            );
        });
    }
    assert_eq!(current(), original);
}

#[test]
fn setting_interprets_the_variable() {
    let _lock = util::env_lock();
    with_cache_dir(None::<&str>, || {
        assert_eq!(cache_dir::setting(), CacheDirSetting::Default);
    });
    with_cache_dir(Some(""), || {
        assert_eq!(cache_dir::setting(), CacheDirSetting::Disabled);
        assert_eq!(cache_dir::setting().resolve(), None);
    });
}
