//! Local vs. remote key classification
//!
//! Keys are identified by `(namespace, name)`; the source-text hash decides whether
//! a matched key is unchanged or needs its cached hash refreshed. A plain set
//! difference would report every edited key as an add plus a delete, so a second
//! pass pairs those up into updates, keeping the remote id.

use crate::model::{LocalizationKey, RemoteKey};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Outcome of comparing the local key set with the remote one.
///
/// Every local key ends up in exactly one of `to_add` / `to_update`; every remote key
/// in exactly one of `to_delete` / `to_update` or in none when it is unchanged.
/// Each list keeps the order of its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Local keys unknown to the backend
    pub to_add: Vec<LocalizationKey>,
    /// Keys whose source text changed, paired with their remote counterpart
    pub to_update: Vec<(LocalizationKey, RemoteKey)>,
    /// Remote keys no longer present locally
    pub to_delete: Vec<RemoteKey>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// `(add, update, delete)` counts
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.to_add.len(), self.to_update.len(), self.to_delete.len())
    }
}

type KeyId<'a> = (&'a str, &'a str);

fn local_id(key: &LocalizationKey) -> KeyId<'_> {
    (key.namespace.as_str(), key.name.as_str())
}

fn remote_id(key: &RemoteKey) -> KeyId<'_> {
    (key.namespace.as_str(), key.name.as_str())
}

/// Classify `local` against `remote` into keys to add, update and delete
pub fn reconcile(local: &[LocalizationKey], remote: &[RemoteKey]) -> Reconciliation {
    let local_hashes: Vec<u32> = local.iter().map(LocalizationKey::hash).collect();

    // sameKeyUnchanged lookups in both directions
    let remote_unchanged: HashSet<(KeyId<'_>, u32)> = remote
        .iter()
        .map(|key| (remote_id(key), key.content_hash))
        .collect();
    let local_unchanged: HashSet<(KeyId<'_>, u32)> = local
        .iter()
        .zip(&local_hashes)
        .map(|(key, &hash)| (local_id(key), hash))
        .collect();

    let add_candidates: Vec<(&LocalizationKey, u32)> = local
        .iter()
        .zip(local_hashes.iter().copied())
        .filter(|&(key, hash)| !remote_unchanged.contains(&(local_id(key), hash)))
        .collect();

    let delete_candidates: Vec<&RemoteKey> = remote
        .iter()
        .filter(|key| !local_unchanged.contains(&(remote_id(key), key.content_hash)))
        .collect();

    // Delete candidates by identity, in remote order
    let mut by_identity: HashMap<KeyId<'_>, VecDeque<usize>> = HashMap::new();
    for (index, key) in delete_candidates.iter().enumerate() {
        by_identity.entry(remote_id(key)).or_default().push_back(index);
    }

    let mut result = Reconciliation::default();
    let mut claimed = vec![false; delete_candidates.len()];

    for (local_key, hash) in add_candidates {
        let counterpart = by_identity.get_mut(&local_id(local_key)).and_then(|queue| {
            let position = queue
                .iter()
                .position(|&index| delete_candidates[index].content_hash != hash)?;
            queue.remove(position)
        });

        match counterpart {
            Some(index) => {
                claimed[index] = true;
                result
                    .to_update
                    .push((local_key.clone(), delete_candidates[index].clone()));
            }
            None => result.to_add.push(local_key.clone()),
        }
    }

    result.to_delete = delete_candidates
        .into_iter()
        .zip(claimed)
        .filter(|&(_, claimed)| !claimed)
        .map(|(key, _)| key.clone())
        .collect();

    let (add, update, delete) = result.counts();
    debug!(
        local = local.len(),
        remote = remote.len(),
        add,
        update,
        delete,
        "reconciled keys"
    );

    result
}
