//! RAII restoration for environment variables mutated in tests.
//!
//! The mail transport and SLA defaults read the process environment, so
//! their tests have to set and clear variables. A guard snapshots the
//! variable on construction and puts it back on drop, panic included.
//! The environment is process-global; every test holding a guard must
//! also be `#[serial]`.

use std::env;
use std::ffi::OsString;

pub struct EnvGuard {
    key: String,
    original: Option<OsString>,
}

impl EnvGuard {
    /// Snapshot the current value of `key` without changing it.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            original: env::var_os(key),
        }
    }

    /// Snapshot `key`, then set it to `value`.
    ///
    /// # Safety
    /// Mutates the process environment, which is unsound under
    /// concurrent access. Callers must hold `#[serial]`.
    pub unsafe fn set(key: &str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let guard = Self::new(key);
        unsafe { env::set_var(key, value) };
        guard
    }

    /// Snapshot `key`, then unset it.
    ///
    /// # Safety
    /// Same contract as [`EnvGuard::set`].
    pub unsafe fn remove(key: &str) -> Self {
        let guard = Self::new(key);
        unsafe { env::remove_var(key) };
        guard
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: guards only exist inside #[serial] tests, so teardown
        // has exclusive access to the environment.
        match &self.original {
            Some(val) => unsafe { env::set_var(&self.key, val) },
            None => unsafe { env::remove_var(&self.key) },
        }
    }
}
