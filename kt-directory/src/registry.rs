// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Directory registry: the admin-facing glue that creates and tears down
//! directories (§3 "Directory", §6 admin surface). Holds the VRF secret
//! key, which the read path never needs and the sequencer needs on every
//! tick — kept here rather than on [`kt_core::Directory`] so the public
//! metadata type stays safely shareable.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kt_core::{Directory, DirectoryId};
use kt_crypto::VrfSecretKey;

use crate::error::DirectoryError;

pub struct RegisteredDirectory {
    pub meta: Directory,
    pub vrf_secret_key: VrfSecretKey,
}

/// In-memory directory registry. A durable deployment would back this with
/// the same storage the queue/map/log backends use, keyed by
/// `directory_id`.
#[derive(Default)]
pub struct DirectoryRegistry {
    directories: RwLock<BTreeMap<DirectoryId, RegisteredDirectory>>,
}

/// Parameters an admin supplies when provisioning a new directory.
pub struct CreateDirectory {
    pub directory_id: DirectoryId,
    pub map_id: String,
    pub log_id: String,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub skip_empty_revisions: bool,
}

impl DirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory with a freshly generated VRF key pair.
    pub fn create(&self, params: CreateDirectory) -> Result<Directory, DirectoryError> {
        let mut directories = self.directories.write().expect("registry lock poisoned");
        if directories.contains_key(&params.directory_id) {
            return Err(DirectoryError::InvalidArgument(format!(
                "directory {:?} already exists",
                params.directory_id
            )));
        }
        let vrf_secret_key = VrfSecretKey::new();
        let meta = Directory {
            directory_id: params.directory_id.clone(),
            vrf_public_key: vrf_secret_key.public(),
            map_id: params.map_id,
            log_id: params.log_id,
            min_interval: params.min_interval,
            max_interval: params.max_interval,
            skip_empty_revisions: params.skip_empty_revisions,
            deleted_at: None,
        };
        directories.insert(params.directory_id, RegisteredDirectory { meta: meta.clone(), vrf_secret_key });
        Ok(meta)
    }

    pub fn get(&self, directory_id: &str) -> Result<Directory, DirectoryError> {
        let directories = self.directories.read().expect("registry lock poisoned");
        directories
            .get(directory_id)
            .map(|d| d.meta.clone())
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))
    }

    pub fn vrf_secret_key(&self, directory_id: &str) -> Result<VrfSecretKey, DirectoryError> {
        let directories = self.directories.read().expect("registry lock poisoned");
        directories
            .get(directory_id)
            .map(|d| d.vrf_secret_key.clone())
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))
    }

    pub fn list(&self) -> Vec<Directory> {
        let directories = self.directories.read().expect("registry lock poisoned");
        directories.values().map(|d| d.meta.clone()).collect()
    }

    /// Soft-deletes a directory: it remains readable (§4.E still serves
    /// history) but the sequencer must stop building new revisions for it.
    pub fn delete(&self, directory_id: &str) -> Result<(), DirectoryError> {
        let mut directories = self.directories.write().expect("registry lock poisoned");
        let entry = directories
            .get_mut(directory_id)
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))?;
        entry.meta.deleted_at = Some(now_unix());
        Ok(())
    }

    /// Reverses a soft-delete, so the sequencer resumes claiming work for
    /// the directory. Errors if the directory was never deleted, to catch
    /// callers racing `GarbageCollect`.
    pub fn undelete(&self, directory_id: &str) -> Result<Directory, DirectoryError> {
        let mut directories = self.directories.write().expect("registry lock poisoned");
        let entry = directories
            .get_mut(directory_id)
            .ok_or_else(|| DirectoryError::NotFound(directory_id.to_string()))?;
        if entry.meta.deleted_at.is_none() {
            return Err(DirectoryError::InvalidArgument(format!("directory {directory_id:?} is not deleted")));
        }
        entry.meta.deleted_at = None;
        Ok(entry.meta.clone())
    }

    /// Removes directories that were soft-deleted more than `grace_period`
    /// ago, tearing down their registry entry. Backend resources (map/log/
    /// queue storage) are the caller's responsibility to reclaim, since the
    /// registry holds no handle to them. Returns the ids removed.
    pub fn garbage_collect(&self, grace_period: Duration) -> Vec<DirectoryId> {
        let mut directories = self.directories.write().expect("registry lock poisoned");
        let now = now_unix();
        let cutoff = Duration::from_secs(now).saturating_sub(grace_period).as_secs();
        let expired: Vec<DirectoryId> = directories
            .iter()
            .filter(|(_, d)| d.meta.deleted_at.map(|at| at <= cutoff).unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            directories.remove(id);
        }
        expired
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: &str) -> CreateDirectory {
        CreateDirectory {
            directory_id: id.to_string(),
            map_id: format!("{id}-map"),
            log_id: format!("{id}-log"),
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(60),
            skip_empty_revisions: false,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let registry = DirectoryRegistry::new();
        let created = registry.create(params("dir-1")).unwrap();
        let fetched = registry.get("dir-1").unwrap();
        assert_eq!(created.directory_id, fetched.directory_id);
        assert_eq!(created.vrf_public_key, fetched.vrf_public_key);
    }

    #[test]
    fn duplicate_directory_id_is_rejected() {
        let registry = DirectoryRegistry::new();
        registry.create(params("dir-1")).unwrap();
        assert!(registry.create(params("dir-1")).is_err());
    }

    #[test]
    fn delete_marks_deleted_but_keeps_directory_readable() {
        let registry = DirectoryRegistry::new();
        registry.create(params("dir-1")).unwrap();
        registry.delete("dir-1").unwrap();
        let fetched = registry.get("dir-1").unwrap();
        assert!(fetched.is_deleted());
    }

    #[test]
    fn unknown_directory_errors() {
        let registry = DirectoryRegistry::new();
        assert!(matches!(registry.get("nope").unwrap_err(), DirectoryError::NotFound(_)));
    }

    #[test]
    fn undelete_reverses_a_soft_delete() {
        let registry = DirectoryRegistry::new();
        registry.create(params("dir-1")).unwrap();
        registry.delete("dir-1").unwrap();
        let undeleted = registry.undelete("dir-1").unwrap();
        assert!(!undeleted.is_deleted());
    }

    #[test]
    fn undelete_on_a_live_directory_is_rejected() {
        let registry = DirectoryRegistry::new();
        registry.create(params("dir-1")).unwrap();
        assert!(registry.undelete("dir-1").is_err());
    }

    #[test]
    fn garbage_collect_removes_only_directories_past_the_grace_period() {
        let registry = DirectoryRegistry::new();
        registry.create(params("dir-1")).unwrap();
        registry.delete("dir-1").unwrap();
        let removed = registry.garbage_collect(Duration::from_secs(3600));
        assert!(removed.is_empty(), "freshly deleted directory is still within the grace period");
        assert!(registry.get("dir-1").is_ok());

        let removed = registry.garbage_collect(Duration::from_secs(0));
        assert_eq!(removed, vec!["dir-1".to_string()]);
        assert!(matches!(registry.get("dir-1").unwrap_err(), DirectoryError::NotFound(_)));
    }
}
