//! Bidirectional relation edges and their synchronization.
//!
//! # Responsibility
//! - Catalogue every denormalized edge (which field on which kind mirrors which).
//! - Compute membership diffs and apply them to both endpoints.
//! - Detach an entity from every edge and find inbound references.
//!
//! # Invariants
//! - Relation fields are mutated only through this module.
//! - After the enclosing transaction commits, `a ∈ B.field ⇔ b ∈ A.field` for
//!   every pair touched by `apply`.
//! - `diff` is idempotent: applying a diff and diffing again yields no change.

use crate::model::{EntityId, EntityKind};
use crate::repo::document_store::{DocumentStore, RepoError, RepoResult};
use log::debug;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// How many peers an endpoint field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Nullable single ref (`RoutineSlot.subject`).
    One,
    /// Set-valued array.
    Many,
}

/// One side of an edge: the field on `kind` that lists the other side's ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: EntityKind,
    pub field: &'static str,
    pub cardinality: Cardinality,
}

const fn many(kind: EntityKind, field: &'static str) -> Endpoint {
    Endpoint {
        kind,
        field,
        cardinality: Cardinality::Many,
    }
}

/// A denormalized association stored on both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub name: &'static str,
    pub left: Endpoint,
    pub right: Endpoint,
}

impl Edge {
    /// Returns `(own, peer)` endpoints as seen from `kind`.
    pub fn oriented_from(&self, kind: EntityKind) -> Option<(Endpoint, Endpoint)> {
        if self.left.kind == kind {
            Some((self.left, self.right))
        } else if self.right.kind == kind {
            Some((self.right, self.left))
        } else {
            None
        }
    }
}

pub const SUBJECT_BATCHES: Edge = Edge {
    name: "subject-batches",
    left: many(EntityKind::Subject, "batches"),
    right: many(EntityKind::Batch, "subjects"),
};

pub const SUBJECT_TEACHERS: Edge = Edge {
    name: "subject-teachers",
    left: many(EntityKind::Subject, "teachers"),
    right: many(EntityKind::Teacher, "subjects"),
};

pub const BATCH_MENTORS: Edge = Edge {
    name: "batch-mentors",
    left: many(EntityKind::Batch, "mentors"),
    right: many(EntityKind::Teacher, "batches"),
};

pub const SLOT_SUBJECT: Edge = Edge {
    name: "slot-subject",
    left: Endpoint {
        kind: EntityKind::RoutineSlot,
        field: "subject",
        cardinality: Cardinality::One,
    },
    right: many(EntityKind::Subject, "routines"),
};

pub const SLOT_BATCHES: Edge = Edge {
    name: "slot-batches",
    left: many(EntityKind::RoutineSlot, "batches"),
    right: many(EntityKind::Batch, "routineSlots"),
};

pub const SLOT_TEACHERS: Edge = Edge {
    name: "slot-teachers",
    left: many(EntityKind::RoutineSlot, "teachers"),
    right: many(EntityKind::Teacher, "routineSlots"),
};

pub const BATCH_ASSIGNMENTS: Edge = Edge {
    name: "batch-assignments",
    left: many(EntityKind::Batch, "assignments"),
    right: many(EntityKind::Assignment, "batches"),
};

pub const BATCH_TESTS: Edge = Edge {
    name: "batch-tests",
    left: many(EntityKind::Batch, "tests"),
    right: many(EntityKind::Test, "batches"),
};

pub const EDGES: [Edge; 8] = [
    SUBJECT_BATCHES,
    SUBJECT_TEACHERS,
    BATCH_MENTORS,
    SLOT_SUBJECT,
    SLOT_BATCHES,
    SLOT_TEACHERS,
    BATCH_ASSIGNMENTS,
    BATCH_TESTS,
];

/// Minimal change turning one membership into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDiff {
    pub to_add: Vec<EntityId>,
    pub to_remove: Vec<EntityId>,
}

impl MemberDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference between `old` and `new` membership.
///
/// Duplicates are ignored; `to_add` follows `new` order, `to_remove` follows
/// `old` order.
pub fn diff(old: &[EntityId], new: &[EntityId]) -> MemberDiff {
    let old_set: HashSet<_> = old.iter().copied().collect();
    let new_set: HashSet<_> = new.iter().copied().collect();

    let mut seen = HashSet::new();
    let to_add = new
        .iter()
        .copied()
        .filter(|id| !old_set.contains(id) && seen.insert(*id))
        .collect();
    let mut seen = HashSet::new();
    let to_remove = old
        .iter()
        .copied()
        .filter(|id| !new_set.contains(id) && seen.insert(*id))
        .collect();

    MemberDiff { to_add, to_remove }
}

/// Diff for a single-valued ref.
pub fn diff_ref(old: Option<EntityId>, new: Option<EntityId>) -> MemberDiff {
    diff(old.as_slice(), new.as_slice())
}

/// Applies `delta` to the `owner_kind` side of `edge` and mirrors it on peers.
///
/// Owner and added peers must exist; removed peers that no longer exist are
/// skipped. Single-ref endpoints can only be assigned from their own side.
pub fn apply<S: DocumentStore>(
    store: &S,
    edge: &Edge,
    owner_kind: EntityKind,
    owner_id: EntityId,
    delta: &MemberDiff,
) -> RepoResult<()> {
    if delta.is_empty() {
        return Ok(());
    }
    let Some((own, peer)) = edge.oriented_from(owner_kind) else {
        return Err(RepoError::InvalidData(format!(
            "edge `{}` has no `{owner_kind}` endpoint",
            edge.name
        )));
    };
    // Overwriting a peer's single ref would orphan its previous back-reference.
    if peer.cardinality == Cardinality::One && !delta.to_add.is_empty() {
        return Err(RepoError::InvalidData(format!(
            "edge `{}` can only be assigned from the `{}` side",
            edge.name, peer.kind
        )));
    }

    for removed in &delta.to_remove {
        remove_member(store, own, owner_id, *removed)?;
        remove_member(store, peer, *removed, owner_id)?;
    }
    for added in &delta.to_add {
        insert_member(store, own, owner_id, *added)?;
        insert_member(store, peer, *added, owner_id)?;
    }

    debug!(
        "event=edge_apply module=schedule status=ok edge={} owner_kind={} owner_id={} added={} removed={}",
        edge.name,
        owner_kind,
        owner_id,
        delta.to_add.len(),
        delta.to_remove.len()
    );
    Ok(())
}

/// Diffs `old` against `new` and applies the result. Returns the diff.
pub fn reconcile<S: DocumentStore>(
    store: &S,
    edge: &Edge,
    owner_kind: EntityKind,
    owner_id: EntityId,
    old: &[EntityId],
    new: &[EntityId],
) -> RepoResult<MemberDiff> {
    let delta = diff(old, new);
    apply(store, edge, owner_kind, owner_id, &delta)?;
    Ok(delta)
}

/// Removes `id` from every peer field that can reference a `kind` entity and
/// empties the entity's own relation fields. Returns the number of peer
/// documents changed.
///
/// Peers are located by query rather than by the entity's own arrays, so
/// back-references that drifted out of sync are removed too.
pub fn detach_all<S: DocumentStore>(store: &S, kind: EntityKind, id: EntityId) -> RepoResult<usize> {
    let mut changed_peers = 0;
    let mut cleared = Map::new();

    for edge in EDGES.iter() {
        let Some((own, peer)) = edge.oriented_from(kind) else {
            continue;
        };
        for peer_id in store.referencing(peer.kind, peer.field, id, false)? {
            if store.pull(peer.kind, peer_id, peer.field, id)? {
                changed_peers += 1;
            }
        }
        let empty = match own.cardinality {
            Cardinality::One => Value::Null,
            Cardinality::Many => Value::Array(Vec::new()),
        };
        cleared.insert(own.field.to_string(), empty);
    }

    if !cleared.is_empty() {
        store.set_fields(kind, id, &cleared)?;
    }

    debug!(
        "event=edge_detach module=schedule status=ok kind={} id={} peers_changed={}",
        kind, id, changed_peers
    );
    Ok(changed_peers)
}

/// Active documents that still reference `id` through any edge.
pub fn inbound_references<S: DocumentStore>(
    store: &S,
    kind: EntityKind,
    id: EntityId,
) -> RepoResult<Vec<(EntityKind, EntityId)>> {
    let mut references = Vec::new();
    for edge in EDGES.iter() {
        let Some((_, peer)) = edge.oriented_from(kind) else {
            continue;
        };
        for peer_id in store.referencing(peer.kind, peer.field, id, true)? {
            references.push((peer.kind, peer_id));
        }
    }
    Ok(references)
}

fn insert_member<S: DocumentStore>(
    store: &S,
    endpoint: Endpoint,
    id: EntityId,
    member: EntityId,
) -> RepoResult<()> {
    match endpoint.cardinality {
        Cardinality::Many => {
            store.add_to_set(endpoint.kind, id, endpoint.field, member)?;
        }
        Cardinality::One => {
            let mut patch = Map::new();
            patch.insert(endpoint.field.to_string(), Value::String(member.to_string()));
            store.set_fields(endpoint.kind, id, &patch)?;
        }
    }
    Ok(())
}

fn remove_member<S: DocumentStore>(
    store: &S,
    endpoint: Endpoint,
    id: EntityId,
    member: EntityId,
) -> RepoResult<()> {
    store.pull(endpoint.kind, id, endpoint.field, member)?;
    Ok(())
}
