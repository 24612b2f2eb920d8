//! Subsystem configuration that hosts can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment switch for reclaim tracing. Unset or `"0"` means off.
pub const ENV_GC_DEBUG: &str = "CARRAY_GC_DEBUG";
/// Optional hard cap on live buffer bytes.
pub const ENV_MEM_CAP_BYTES: &str = "CARRAY_MEM_CAP_BYTES";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// Emit a line at each reclaim step (descriptor, metadata, data).
    pub debug: bool,

    /// Hard cap on bytes the allocator may hand out at once. `None` is unbounded.
    pub mem_cap_bytes: Option<usize>,
}

impl GcConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CARRAY_GC_DEBUG`: any value other than `0` enables tracing
    /// - `CARRAY_MEM_CAP_BYTES`: cap on live buffer bytes
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GcConfig::from_env`] but reads through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(s) = lookup(ENV_GC_DEBUG) {
            cfg.debug = s.trim() != "0";
        }

        if let Some(s) = lookup(ENV_MEM_CAP_BYTES) {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.mem_cap_bytes = Some(v);
            }
        }

        cfg
    }

    /// Reject configurations no allocator could honor.
    pub fn validate(&self) -> Result<()> {
        if self.mem_cap_bytes == Some(0) {
            return Err(Error::Config(format!(
                "{} must be greater than zero",
                ENV_MEM_CAP_BYTES
            )));
        }
        Ok(())
    }
}
