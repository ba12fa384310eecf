// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the server.
//!
//! All configuration comes from `RUNCELL_*` variables with sensible
//! defaults for local development. Nothing here panics: unparsable values
//! fall back to the default with a warning.

use runcell_core::Language;
use std::time::Duration;

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = raw, "unparsable value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name).ok().as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        Some(other) => {
            tracing::warn!(var = name, value = other, "unparsable boolean, using default");
            default
        }
        None => default,
    }
}

/// Server configuration snapshot, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub namespace: Option<String>,
    pub sidecar_image: String,
    pub image_prefix: String,
    /// Accepted API keys. Empty disables authentication (dev only).
    pub api_keys: Vec<String>,
    pub session_ttl_secs: u64,
    pub session_cleanup_interval: Duration,
    pub orphan_cleanup_enabled: bool,
    pub state_persistence_enabled: bool,
    pub state_capture_on_error: bool,
    pub state_ttl_secs: u64,
    pub state_archive_enabled: bool,
    pub state_archive_after_secs: u64,
    pub state_archive_ttl_days: u64,
    pub state_archive_check_interval: Duration,
    pub max_execution_time_secs: u64,
    pub network_enabled: bool,
    /// Warm pool sizes per language; absent or 0 means job execution.
    pub pool_sizes: Vec<(Language, usize)>,
    pub log_dir: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let mut pool_sizes = Vec::new();
        for language in Language::ALL {
            let var = format!("RUNCELL_POOL_SIZE_{}", language.as_str().to_uppercase());
            let default = match language {
                Language::Py => 2,
                Language::Js => 1,
                _ => 0,
            };
            pool_sizes.push((language, env_u64(&var, default) as usize));
        }

        Self {
            bind_addr: env_string("RUNCELL_BIND_ADDR", "0.0.0.0:8000"),
            redis_url: env_string("RUNCELL_REDIS_URL", "redis://127.0.0.1:6379"),
            s3_bucket: env_string("RUNCELL_S3_BUCKET", "runcell"),
            s3_endpoint: env_opt("RUNCELL_S3_ENDPOINT"),
            namespace: env_opt("RUNCELL_NAMESPACE"),
            sidecar_image: env_string("RUNCELL_SIDECAR_IMAGE", "runcell/sidecar:latest"),
            image_prefix: env_string("RUNCELL_IMAGE_PREFIX", "runcell"),
            api_keys: env_opt("RUNCELL_API_KEYS")
                .map(|raw| raw.split(',').map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect())
                .unwrap_or_default(),
            session_ttl_secs: env_u64("RUNCELL_SESSION_TTL_SECS", 3600),
            session_cleanup_interval: Duration::from_secs(env_u64(
                "RUNCELL_SESSION_CLEANUP_INTERVAL_SECS",
                300,
            )),
            orphan_cleanup_enabled: env_bool("RUNCELL_ORPHAN_CLEANUP_ENABLED", true),
            state_persistence_enabled: env_bool("RUNCELL_STATE_PERSISTENCE_ENABLED", true),
            state_capture_on_error: env_bool("RUNCELL_STATE_CAPTURE_ON_ERROR", false),
            state_ttl_secs: env_u64("RUNCELL_STATE_TTL_SECS", 7200),
            state_archive_enabled: env_bool("RUNCELL_STATE_ARCHIVE_ENABLED", true),
            state_archive_after_secs: env_u64("RUNCELL_STATE_ARCHIVE_AFTER_SECS", 1800),
            state_archive_ttl_days: env_u64("RUNCELL_STATE_ARCHIVE_TTL_DAYS", 7),
            state_archive_check_interval: Duration::from_secs(env_u64(
                "RUNCELL_STATE_ARCHIVE_CHECK_INTERVAL_SECS",
                300,
            )),
            // Capped: the sidecar enforces this inside the sandbox and the
            // job deadline sits above it.
            max_execution_time_secs: env_u64("RUNCELL_MAX_EXECUTION_TIME_SECS", 30).min(120),
            network_enabled: env_bool("RUNCELL_NETWORK_ENABLED", false),
            pool_sizes,
            log_dir: env_opt("RUNCELL_LOG_DIR"),
        }
    }

    pub fn image_for(&self, language: Language) -> String {
        let var = format!("RUNCELL_IMAGE_{}", language.as_str().to_uppercase());
        env_opt(&var).unwrap_or_else(|| format!("{}/{language}:latest", self.image_prefix))
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
