//! # Resource Applier
//!
//! The single write path to the cluster.
//!
//! `apply` fetches the live object, creates it when missing, otherwise merges
//! the desired object into it (see [`crate::controller::merge`]) and replaces
//! it only when something changed. Ownership is stamped on the way in and
//! checked against the live object before any mutation, so an object that
//! belongs to another installation is never modified.

use crate::constants::LABEL_INSTANCE;
use crate::controller::cluster::{ClusterApi, DeleteOutcome};
use crate::controller::error::ReconcileError;
use crate::controller::merge::merge;
use crate::controller::resources::{ManagedObject, ObjectKey};
use crate::instance::Instance;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::{debug, info, warn, Span};

/// Result of an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Applied object together with what happened to it
#[derive(Debug, Clone)]
pub struct Applied {
    pub outcome: ApplyOutcome,
    pub object: ManagedObject,
}

/// How a child object is tied to its installation
#[derive(Debug, Clone)]
pub enum Ownership {
    /// Same namespace as the installation; garbage collected via the owner reference
    Controller(OwnerReference),
    /// Other namespace or cluster-scoped; identified by the instance label
    Labelled(String),
}

impl Ownership {
    /// Ownership for children in the install namespace
    pub fn controller_of(instance: &Instance) -> Result<Self, ReconcileError> {
        instance
            .owner_reference()
            .map(Ownership::Controller)
            .ok_or_else(|| {
                ReconcileError::InvalidSpec(format!("{} has no uid yet", instance.display_name()))
            })
    }

    /// Ownership for children outside the install namespace
    pub fn labelled_for(instance: &Instance) -> Self {
        Ownership::Labelled(instance.id())
    }

    fn stamp(&self, meta: &mut ObjectMeta) {
        match self {
            Ownership::Controller(owner) => {
                meta.owner_references = Some(vec![owner.clone()]);
            }
            Ownership::Labelled(id) => {
                meta.labels
                    .get_or_insert_with(Default::default)
                    .insert(LABEL_INSTANCE.to_string(), id.clone());
            }
        }
    }

    /// Like `stamp`, but keeps owner references that are already present
    fn stamp_merged(&self, meta: &mut ObjectMeta) {
        match self {
            Ownership::Controller(owner) => {
                let refs = meta.owner_references.get_or_insert_with(Vec::new);
                if !refs.iter().any(|r| r.uid == owner.uid) {
                    // at most one controller reference is allowed
                    let mut owner = owner.clone();
                    if refs.iter().any(|r| r.controller == Some(true)) {
                        owner.controller = Some(false);
                    }
                    refs.push(owner);
                }
            }
            Ownership::Labelled(_) => self.stamp(meta),
        }
    }

    /// Describes the owner of `live` when it is not this installation
    ///
    /// Only controller references of the same API group count; cert-manager
    /// may own the secrets it issues.
    pub fn foreign_owner(&self, live: &ObjectMeta) -> Option<String> {
        let label = live.labels.as_ref().and_then(|l| l.get(LABEL_INSTANCE));
        match self {
            Ownership::Controller(owner) => {
                let other_controller = live.owner_references.iter().flatten().find(|r| {
                    r.controller == Some(true)
                        && r.uid != owner.uid
                        && r.api_version == owner.api_version
                });
                if let Some(other) = other_controller {
                    return Some(match &live.namespace {
                        Some(ns) => format!("{} {}/{}", other.kind, ns, other.name),
                        None => format!("{} {}", other.kind, other.name),
                    });
                }
                None
            }
            Ownership::Labelled(id) => label
                .filter(|other| *other != id)
                .map(|other| format!("installation instance {other}")),
        }
    }
}

/// Fetch-or-create, merge and write
pub struct ResourceApplier<'a> {
    api: &'a dyn ClusterApi,
    log: &'a Span,
}

impl std::fmt::Debug for ResourceApplier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceApplier").finish_non_exhaustive()
    }
}

impl<'a> ResourceApplier<'a> {
    pub fn new(api: &'a dyn ClusterApi, log: &'a Span) -> Self {
        Self { api, log }
    }

    pub fn api(&self) -> &'a dyn ClusterApi {
        self.api
    }

    pub fn log(&self) -> &'a Span {
        self.log
    }

    /// Converge one object towards `desired`
    pub async fn apply(
        &self,
        mut desired: ManagedObject,
        ownership: &Ownership,
    ) -> Result<Applied, ReconcileError> {
        ownership.stamp(desired.meta_mut());
        let key = desired.key();

        let live = self
            .api
            .get(&key)
            .await
            .map_err(|e| ReconcileError::api("get", &key, e))?;

        let Some(live) = live else {
            let object = self
                .api
                .create(&desired)
                .await
                .map_err(|e| ReconcileError::api("create", &key, e))?;
            info!(parent: self.log, object = %key, "created");
            return Ok(Applied {
                outcome: ApplyOutcome::Created,
                object,
            });
        };

        if let Some(owner) = ownership.foreign_owner(live.meta()) {
            return Err(ReconcileError::OwnershipConflict { key, owner });
        }

        let merged = merge(&live, &desired).map_err(|source| ReconcileError::Merge {
            key: key.clone(),
            source,
        })?;

        if merged == live {
            debug!(parent: self.log, object = %key, "unchanged");
            return Ok(Applied {
                outcome: ApplyOutcome::Unchanged,
                object: live,
            });
        }

        let object = self
            .api
            .replace(&merged)
            .await
            .map_err(|e| ReconcileError::api("update", &key, e))?;
        info!(parent: self.log, object = %key, "updated");
        Ok(Applied {
            outcome: ApplyOutcome::Updated,
            object,
        })
    }

    /// Attach ownership to an object created by someone else
    ///
    /// Used for secrets cert-manager creates without an owner. Returns `None`
    /// while the object does not exist yet.
    pub async fn adopt(
        &self,
        key: &ObjectKey,
        ownership: &Ownership,
        labels: &std::collections::BTreeMap<String, String>,
    ) -> Result<Option<Applied>, ReconcileError> {
        let live = self
            .api
            .get(key)
            .await
            .map_err(|e| ReconcileError::api("get", key, e))?;
        let Some(live) = live else {
            return Ok(None);
        };

        if let Some(owner) = ownership.foreign_owner(live.meta()) {
            return Err(ReconcileError::OwnershipConflict {
                key: key.clone(),
                owner,
            });
        }

        let mut adopted = live.clone();
        let meta = adopted.meta_mut();
        ownership.stamp_merged(meta);
        let target = meta.labels.get_or_insert_with(Default::default);
        for (k, v) in labels {
            target.insert(k.clone(), v.clone());
        }

        if adopted == live {
            return Ok(Some(Applied {
                outcome: ApplyOutcome::Unchanged,
                object: live,
            }));
        }

        let object = self
            .api
            .replace(&adopted)
            .await
            .map_err(|e| ReconcileError::api("adopt", key, e))?;
        info!(parent: self.log, object = %key, "adopted");
        Ok(Some(Applied {
            outcome: ApplyOutcome::Updated,
            object,
        }))
    }

    /// Delete an object unless it belongs to another installation
    pub async fn delete(
        &self,
        key: &ObjectKey,
        ownership: &Ownership,
    ) -> Result<DeleteOutcome, ReconcileError> {
        let live = self
            .api
            .get(key)
            .await
            .map_err(|e| ReconcileError::api("get", key, e))?;
        let Some(live) = live else {
            return Ok(DeleteOutcome::AlreadyGone);
        };

        if let Some(owner) = ownership.foreign_owner(live.meta()) {
            warn!(parent: self.log, object = %key, owner = %owner, "not deleting object owned by another installation");
            return Ok(DeleteOutcome::Retained);
        }

        let outcome = self
            .api
            .delete(key)
            .await
            .map_err(|e| ReconcileError::api("delete", key, e))?;
        match outcome {
            DeleteOutcome::Deleted => info!(parent: self.log, object = %key, "deleted"),
            DeleteOutcome::AlreadyGone | DeleteOutcome::Retained => {
                debug!(parent: self.log, object = %key, "already gone");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "installation.microscaler.io/v1".to_string(),
            kind: "Installation".to_string(),
            name: format!("inst-{uid}"),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_foreign_controller_detected() {
        let live = ObjectMeta {
            namespace: Some("shared".to_string()),
            owner_references: Some(vec![owner("a")]),
            ..Default::default()
        };
        assert_eq!(
            Ownership::Controller(owner("b")).foreign_owner(&live).as_deref(),
            Some("Installation shared/inst-a")
        );
        assert!(Ownership::Controller(owner("a")).foreign_owner(&live).is_none());
    }

    #[test]
    fn test_unowned_object_is_not_foreign() {
        let live = ObjectMeta::default();
        assert!(Ownership::Controller(owner("a")).foreign_owner(&live).is_none());
        assert!(Ownership::Labelled("abc".to_string()).foreign_owner(&live).is_none());
    }

    #[test]
    fn test_foreign_instance_label_detected() {
        let live = ObjectMeta {
            labels: Some(BTreeMap::from([(
                LABEL_INSTANCE.to_string(),
                "other".to_string(),
            )])),
            ..Default::default()
        };
        assert!(Ownership::Labelled("mine".to_string())
            .foreign_owner(&live)
            .is_some());
        assert!(Ownership::Labelled("other".to_string())
            .foreign_owner(&live)
            .is_none());
    }

    #[test]
    fn test_stamp_sets_owner_or_label() {
        let mut meta = ObjectMeta::default();
        Ownership::Controller(owner("a")).stamp(&mut meta);
        assert_eq!(meta.owner_references.as_ref().map(Vec::len), Some(1));

        let mut meta = ObjectMeta::default();
        Ownership::Labelled("id".to_string()).stamp(&mut meta);
        assert_eq!(
            meta.labels.unwrap().get(LABEL_INSTANCE).map(String::as_str),
            Some("id")
        );
    }
}
