//! Digest computation for instance snapshots.
//!
//! An instance carries a SHA256 **semantic digest**: the hash of the
//! canonical JSON of its contents with `created_at` left out. Two instances
//! built from the same CPS state share a digest whatever the time they were
//! taken, and a later CPS mutation that does not reach an existing instance
//! leaves that instance's digest untouched.
//!
//! Order matters: entries and memberships are hashed in the deterministic
//! order the instance builder produces them.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::instance::Instance;
use crate::errors::Result;
use crate::model::PSpaceParams;

#[derive(Serialize)]
struct RelshpDigest {
    id: u32,
    points: Vec<u32>,
    variations: Vec<u32>,
}

#[derive(Serialize)]
struct EntryDigest<'a> {
    functor: u32,
    uid: u32,
    pspace: u32,
    variation: Option<u32>,
    costs_needed: usize,
    relationships: Vec<(u32, &'a serde_json::Value)>,
}

#[derive(Serialize)]
struct InstanceDigest<'a> {
    pspaces: &'a [PSpaceParams],
    points: Vec<u32>,
    relationships: Vec<RelshpDigest>,
    entries: Vec<EntryDigest<'a>>,
}

/// Compute the semantic digest of an instance (excludes `created_at`).
///
/// Hex-encoded SHA256, 64 characters.
///
/// # Errors
/// * `Internal` - JSON serialization failed
pub fn compute_instance_digest(instance: &Instance) -> Result<String> {
    let points = instance.points();
    let canonical = InstanceDigest {
        pspaces: instance.pspaces(),
        points: points.iter().map(|p| p.raw()).collect(),
        relationships: instance
            .relationships()
            .iter()
            .map(|r| RelshpDigest {
                id: r.id.raw(),
                points: r.points.iter().map(|i| points[*i].raw()).collect(),
                variations: r.variations.iter().map(|v| v.raw()).collect(),
            })
            .collect(),
        entries: instance
            .entries()
            .iter()
            .map(|e| EntryDigest {
                functor: e.functor.raw(),
                uid: e.params.uid.raw(),
                pspace: e.params.pspace.raw(),
                variation: e.variation.map(|v| v.raw()),
                costs_needed: e.costs_needed,
                relationships: e
                    .relationships
                    .iter()
                    .map(|r| (r.id.raw(), r.config.as_ref()))
                    .collect(),
            })
            .collect(),
    };
    let json = serde_json::to_string(&canonical)?;
    Ok(hash_string(&json))
}

fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
