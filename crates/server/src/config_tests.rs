// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config parsing tests. Env mutation is process-global, so these tests
//! only use variables no other test reads.

use super::*;

#[test]
fn defaults_are_sane_without_env() {
    let config = Config::from_env();
    assert_eq!(config.session_ttl_secs, 3600);
    assert_eq!(config.state_ttl_secs, 7200);
    assert!(config.max_execution_time_secs <= 120);
    assert!(!config.auth_enabled());

    let py_size = config
        .pool_sizes
        .iter()
        .find(|(l, _)| *l == Language::Py)
        .map(|(_, s)| *s)
        .unwrap();
    assert_eq!(py_size, 2);
}

#[test]
fn image_fallback_uses_prefix() {
    let config = Config::from_env();
    assert_eq!(config.image_for(Language::Go), "runcell/go:latest");
}

#[test]
fn bool_parsing() {
    assert!(env_bool("RUNCELL_TEST_MISSING_BOOL", true));
    assert!(!env_bool("RUNCELL_TEST_MISSING_BOOL", false));
}
