//! Advisory lease files for run directories. A lease is a small TOML file
//! created with `create_new` semantics, so exactly one process wins when
//! several race to start the same job; an expiry lets a crashed holder be
//! broken and taken over.

use crate::core::models::record::epoch_seconds;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub(crate) const LEASE_FILE: &str = "lease.toml";

// Six hours, generous for single jobs.
pub const DEFAULT_LEASE_TTL_SECONDS: u64 = 6 * 60 * 60;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("I/O error at '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub ttl_seconds: u64,
    pub owner: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        // A random tag keeps owners distinguishable when a pid is reused.
        let tag: u32 = rand::thread_rng().gen_range(0..=0xff_ffff);
        Self {
            ttl_seconds: DEFAULT_LEASE_TTL_SECONDS,
            owner: format!("pid-{}-{:06x}", std::process::id(), tag),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRecord {
    owner: String,
    acquired_at: u64,
    expires_at: u64,
}

#[derive(Debug)]
pub enum LeaseDecision {
    Acquired(Lease),
    Busy { owner: String },
}

/// A held lease. Dropping it releases the lease file best-effort; call
/// [`Lease::release`] to observe removal errors.
#[derive(Debug)]
pub struct Lease {
    path: PathBuf,
    released: bool,
}

impl Lease {
    pub fn release(mut self) -> Result<(), LeaseError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LeaseError::Io { path: self.path.clone(), source: e }),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to release a lease file");
            }
        }
    }
}

/// A live lease held by someone else yields `Busy`; an expired or unreadable
/// lease is broken and re-acquired. Losing the re-acquisition race also
/// yields `Busy`.
pub fn acquire(dir: &Path, config: &LeaseConfig) -> Result<LeaseDecision, LeaseError> {
    let path = dir.join(LEASE_FILE);
    for _ in 0..2 {
        match try_create(&path, config) {
            Ok(lease) => return Ok(LeaseDecision::Acquired(lease)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match read_record(&path) {
                Some(record) if record.expires_at > epoch_seconds() => {
                    return Ok(LeaseDecision::Busy { owner: record.owner });
                }
                Some(record) => {
                    warn!(
                        path = %path.display(),
                        owner = %record.owner,
                        "breaking an expired lease"
                    );
                    remove_quietly(&path);
                }
                None => {
                    warn!(path = %path.display(), "breaking an unreadable lease file");
                    remove_quietly(&path);
                }
            },
            Err(e) => return Err(LeaseError::Io { path, source: e }),
        }
    }
    // Lost the re-acquisition race to another breaker.
    let owner = read_record(&path).map(|r| r.owner).unwrap_or_else(|| "unknown".to_string());
    Ok(LeaseDecision::Busy { owner })
}

/// Absent, expired, and unreadable lease files all count as "not live".
pub fn is_live(dir: &Path) -> bool {
    read_record(&dir.join(LEASE_FILE))
        .map(|record| record.expires_at > epoch_seconds())
        .unwrap_or(false)
}

pub fn holder(dir: &Path) -> Option<String> {
    read_record(&dir.join(LEASE_FILE)).map(|record| record.owner)
}

fn try_create(path: &Path, config: &LeaseConfig) -> io::Result<Lease> {
    let now = epoch_seconds();
    let record = LeaseRecord {
        owner: config.owner.clone(),
        acquired_at: now,
        expires_at: now.saturating_add(config.ttl_seconds),
    };
    let body = toml::to_string(&record).map_err(io::Error::other)?;
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(body.as_bytes())?;
    Ok(Lease { path: path.to_path_buf(), released: false })
}

fn read_record(path: &Path) -> Option<LeaseRecord> {
    let content = fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove a broken lease file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(owner: &str) -> LeaseConfig {
        LeaseConfig { ttl_seconds: 600, owner: owner.to_string() }
    }

    #[test]
    fn the_first_acquirer_wins_and_the_second_sees_busy() {
        let dir = TempDir::new().unwrap();
        let first = acquire(dir.path(), &config("alpha")).unwrap();
        let LeaseDecision::Acquired(_held) = first else {
            panic!("expected the first acquisition to succeed");
        };
        match acquire(dir.path(), &config("beta")).unwrap() {
            LeaseDecision::Busy { owner } => assert_eq!(owner, "alpha"),
            LeaseDecision::Acquired(_) => panic!("expected the second acquisition to be busy"),
        }
    }

    #[test]
    fn releasing_makes_the_directory_acquirable_again() {
        let dir = TempDir::new().unwrap();
        let LeaseDecision::Acquired(held) = acquire(dir.path(), &config("alpha")).unwrap() else {
            panic!("expected acquisition to succeed");
        };
        held.release().unwrap();
        assert!(!is_live(dir.path()));
        assert!(matches!(
            acquire(dir.path(), &config("beta")).unwrap(),
            LeaseDecision::Acquired(_)
        ));
    }

    #[test]
    fn dropping_a_lease_releases_it() {
        let dir = TempDir::new().unwrap();
        {
            let _held = acquire(dir.path(), &config("alpha")).unwrap();
            assert!(is_live(dir.path()));
        }
        assert!(!is_live(dir.path()));
    }

    #[test]
    fn an_expired_lease_is_broken_and_taken_over() {
        let dir = TempDir::new().unwrap();
        let stale = LeaseRecord {
            owner: "crashed".to_string(),
            acquired_at: 10,
            expires_at: 20,
        };
        fs::write(dir.path().join(LEASE_FILE), toml::to_string(&stale).unwrap()).unwrap();
        assert!(!is_live(dir.path()));
        assert!(matches!(
            acquire(dir.path(), &config("beta")).unwrap(),
            LeaseDecision::Acquired(_)
        ));
    }

    #[test]
    fn an_unreadable_lease_is_broken_and_taken_over() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LEASE_FILE), "not a lease").unwrap();
        let decision = acquire(dir.path(), &config("beta")).unwrap();
        assert!(matches!(decision, LeaseDecision::Acquired(_)));
        assert!(is_live(dir.path()));
    }
}
