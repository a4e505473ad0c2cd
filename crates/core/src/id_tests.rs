// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{InvocationId, JobId};

#[test]
fn generated_ids_carry_prefix() {
    let id = JobId::new();
    assert!(id.as_str().starts_with("job-"));
    assert_eq!(id.as_str().len(), 20);

    let id = InvocationId::new();
    assert!(id.as_str().starts_with("inv-"));
}

#[test]
fn generated_ids_are_unique() {
    let a = JobId::new();
    let b = JobId::new();
    assert_ne!(a, b);
}

#[test]
fn id_from_string_round_trips() {
    let id = JobId::from_string("job-abc");
    assert_eq!(id.as_str(), "job-abc");
    assert_eq!(id, "job-abc");
}

#[test]
fn id_serde() {
    let id = JobId::from_string("job-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-xyz\"");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn idbuf_hash_matches_str() {
    use std::collections::HashMap;
    let mut map: HashMap<JobId, u32> = HashMap::new();
    map.insert(JobId::from_string("job-1"), 7);
    // Borrow<str> lookup must hit the same bucket.
    assert_eq!(map.get("job-1"), Some(&7));
}

#[test]
fn idbuf_empty() {
    assert!(IdBuf::empty().is_empty());
    assert_eq!(IdBuf::empty().as_str(), "");
}
