// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Sequencer / revision builder (§4.D). Runs as a per-directory
//! control loop; [`tick_once`] is the pure-ish core (all I/O goes through
//! the three backend traits) so it can be driven directly in tests
//! without waiting on real wall-clock gates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kt_core::{Entry, EntryUpdate, Index, MutationProof, Revision, SignedEntry, SignedMapRoot};
use kt_crypto::VrfSecretKey;
use kt_log::LogBackend;
use kt_map::{MapBackend, MapLeafInclusion};
use kt_queue::QueueStore;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::error::DirectoryError;
use crate::mutation_log::{MutationLog, RevisionMutations};

/// Per-revision cap on how many queued mutations a single tick will
/// absorb (§4.D step 2: "cap the batch at an implementation-defined
/// per-revision limit").
pub const DEFAULT_BATCH_LIMIT: usize = 1000;

/// A mutation the sequencer read off the queue but could not apply,
/// recorded for audit rather than aborting the revision (§4.D step 3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DroppedMutation {
    pub seq: u64,
    pub index: Index,
    pub reason: String,
}

/// Shared, cloneable handle to a directory's backends plus its VRF key —
/// what the sequencer and the read path both need (§4.D, §4.E).
#[derive(Clone)]
pub struct DirectoryDeps {
    pub map: Arc<dyn MapBackend>,
    pub log: Arc<dyn LogBackend>,
    pub queue: Arc<dyn QueueStore>,
    pub mutation_log: Arc<MutationLog>,
    pub vrf_secret_key: VrfSecretKey,
    pub map_id: String,
    pub log_id: String,
    pub batch_limit: usize,
}

/// Mutable per-directory sequencer bookkeeping, cheap to keep in memory
/// and rebuildable from the map/log backends on restart.
pub struct SequencerState {
    pub last_revision_ts: SystemTime,
    pub last_signed_map_root: Option<SignedMapRoot>,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self { last_revision_ts: UNIX_EPOCH, last_signed_map_root: None }
    }
}

/// Outcome of one sequencer tick.
pub struct TickOutcome {
    pub revision: Revision,
    pub dropped: Vec<DroppedMutation>,
}

/// Runs one iteration of the control loop body (§4.D steps 2-6), without
/// the gating in step 1 — callers decide when to invoke this (the real
/// loop via wall-clock + queue depth, tests by calling it directly).
///
/// Returns `Ok(None)` if there was nothing to do and the caller did not
/// force an empty revision.
pub async fn tick_once(
    directory_id: &str,
    deps: &DirectoryDeps,
    state: &mut SequencerState,
    force_empty: bool,
) -> Result<Option<TickOutcome>, DirectoryError> {
    let prev_hwc = state.last_signed_map_root.as_ref().map(|r| r.highest_fully_completed_seq).unwrap_or(0);
    let queue_hwm = deps.queue.high_water_mark(directory_id).await;
    let new_hwc = queue_hwm.min(prev_hwc + deps.batch_limit as u64);

    if new_hwc == prev_hwc && !force_empty {
        return Ok(None);
    }

    let batch = if new_hwc > prev_hwc {
        deps.queue.read_range(directory_id, prev_hwc + 1, (new_hwc - prev_hwc) as usize).await?
    } else {
        Vec::new()
    };

    let (writes, applied, dropped) = apply_batch(directory_id, deps, batch).await?;

    let map_root = deps.map.set_leaves(&deps.map_id, writes).await?;
    let signed_map_root = SignedMapRoot {
        root_hash: map_root.root_hash,
        signature: map_root.signature,
        revision_number: map_root.revision_number,
        highest_fully_completed_seq: new_hwc,
    };

    // Recorded before anchoring so a crash between steps 5 and 6 leaves
    // `recover` able to look up this revision's `highest_fully_completed_seq`
    // (not otherwise derivable from the map backend alone) and re-anchor it
    // with the correct watermark. Idempotent: `record` just overwrites the
    // entry for this revision number.
    deps.mutation_log.record(
        directory_id,
        signed_map_root.revision_number,
        RevisionMutations { signed_map_root: signed_map_root.clone(), applied: applied.clone(), dropped: dropped.clone() },
    );

    let log_root = anchor(deps, &signed_map_root).await?;
    let log_inclusion = deps
        .log
        .inclusion_proof(&deps.log_id, signed_map_root.revision_number, log_root.tree_size)
        .await?;

    state.last_revision_ts = SystemTime::now();
    state.last_signed_map_root = Some(signed_map_root.clone());

    let revision = Revision {
        revision_number: signed_map_root.revision_number,
        signed_map_root,
        log_inclusion: encode_proof(&log_inclusion),
    };

    info!(directory_id, revision = revision.revision_number, dropped = dropped.len(), "revision published");
    Ok(Some(TickOutcome { revision, dropped }))
}

/// Anchors `signed_map_root` to the log at the index matching its
/// revision number (§4.D step 6), enforcing the index invariant.
async fn anchor(deps: &DirectoryDeps, signed_map_root: &SignedMapRoot) -> Result<kt_log::LogRoot, DirectoryError> {
    let bytes = encode_map_root(signed_map_root);
    let log_root = deps.log.append(&deps.log_id, bytes).await?;
    let assigned_index = log_root.tree_size - 1;
    if assigned_index != signed_map_root.revision_number {
        return Err(DirectoryError::LogAnchorMismatch {
            expected: signed_map_root.revision_number,
            actual: assigned_index,
        });
    }
    Ok(log_root)
}

/// §4.D step 3-4: group the batch by index, fold mutations for the same
/// index in queue order through the validator, stage one write per index
/// that ends up accepted. Also builds the `MutationProof`s the prover
/// exposes via `ListMutations` (§4.E): the first accepted mutation for an
/// index carries the pre-image leaf's inclusion proof at revision `r-1`;
/// subsequent accepted mutations for the same index within this batch
/// chain from the in-batch predecessor instead, so they carry none (a
/// verifier replays the page in order, §9 supplemented `verify_revision_chain`).
async fn apply_batch(
    directory_id: &str,
    deps: &DirectoryDeps,
    batch: Vec<(u64, EntryUpdate)>,
) -> Result<(Vec<(Index, Vec<u8>)>, Vec<MutationProof>, Vec<DroppedMutation>), DirectoryError> {
    let mut current: BTreeMap<Index, SignedEntry> = BTreeMap::new();
    let mut preimages: BTreeMap<Index, Option<Vec<u8>>> = BTreeMap::new();
    let mut touched_order: Vec<Index> = Vec::new();
    let mut dropped = Vec::new();
    let mut applied = Vec::new();

    for (seq, update) in batch {
        let index = update.mutation.entry.index;
        if !current.contains_key(&index) && !preimages.contains_key(&index) {
            let (leaf, preimage_proof) = read_current_leaf(deps, &index).await?;
            if let Some(leaf) = leaf {
                current.insert(index, leaf);
            }
            preimages.insert(index, preimage_proof);
            touched_order.push(index);
        }
        let candidate = current.get(&index);
        let had_prior_entry = candidate.is_some();
        let is_first_for_index = !applied.iter().any(|m: &MutationProof| m.mutation.entry.index == index);
        match kt_core::validate(&update, candidate, &deps.vrf_secret_key, directory_id) {
            Ok(accepted) => {
                // Absent for the first-ever entry at an index, even if the
                // map already has other revisions (§3 `Mutation`); present
                // only when this is the batch's first touch of an index
                // that already had a leaf at `r-1`.
                let preimage_inclusion =
                    if is_first_for_index && had_prior_entry { preimages.get(&index).cloned().flatten() } else { None };
                applied.push(MutationProof { mutation: accepted.clone(), preimage_inclusion });
                current.insert(index, accepted);
            },
            Err(e) => {
                warn!(directory_id, seq, ?index, error = %e, "mutation dropped");
                dropped.push(DroppedMutation { seq, index, reason: e.to_string() });
            },
        }
    }

    let writes = touched_order
        .into_iter()
        .filter_map(|index| current.remove(&index).map(|signed| (index, signed.entry.encode())))
        .collect();
    Ok((writes, applied, dropped))
}

/// Public wrapper around [`read_current_leaf`] for callers that only need
/// the candidate leaf, not its inclusion proof — namely `kt-node`'s write
/// path, which validates a submitted update against a *candidate* view of
/// the current leaf before enqueuing it (§4.C: "Enqueue is only permitted
/// after the Mutation Validator has approved the update with a candidate
/// view of the current leaf"). The sequencer re-validates at apply time
/// regardless, since the leaf may have changed by then.
pub async fn current_leaf(deps: &DirectoryDeps, index: &Index) -> Result<Option<SignedEntry>, DirectoryError> {
    read_current_leaf(deps, index).await.map(|(leaf, _proof)| leaf)
}

/// Reads the leaf currently stored at `index` in the map's latest
/// revision (revision `r-1` from the sequencer's point of view, since the
/// new revision has not been committed yet), decoding it back into a
/// [`SignedEntry`] and returning its encoded inclusion proof for
/// `MutationProof.preimage_inclusion`. `None` for the leaf means the index
/// has never been written (§4.B `current = None` branch); `None` for the
/// proof means there is no revision `r-1` to prove against yet.
async fn read_current_leaf(
    deps: &DirectoryDeps,
    index: &Index,
) -> Result<(Option<SignedEntry>, Option<Vec<u8>>), DirectoryError> {
    let latest = match deps.map.latest_root(&deps.map_id).await {
        Ok(root) => root,
        Err(kt_map::MapError::UnknownMap(_)) => return Ok((None, None)),
        Err(e) => return Err(e.into()),
    };
    let leaves = deps.map.get_leaves(&deps.map_id, latest.revision_number, std::slice::from_ref(index)).await?;
    let MapLeafInclusion { value, proof, .. } = leaves.into_iter().next().expect("requested exactly one index");
    let proof_bytes = encode_map_proof(&proof);
    match value {
        Some(bytes) => {
            let entry = Entry::decode(&bytes).map_err(|e| DirectoryError::InvalidArgument(e.to_string()))?;
            // The stored leaf is the raw `Entry`; signatures are not part of
            // the authenticated map leaf (§3 `Entry` vs `SignedEntry`), so
            // the validator's "current" view carries no signatures of its
            // own — it only needs `Entry` to check `previous`-chaining.
            Ok((Some(SignedEntry::new(entry, Vec::new())), Some(proof_bytes)))
        },
        None => Ok((None, Some(proof_bytes))),
    }
}

fn encode_map_proof(proof: &kt_map::MapProof) -> Vec<u8> {
    minicbor::to_vec(
        proof
            .steps
            .iter()
            .map(|step| step.map(|d| d.to_vec()).unwrap_or_default())
            .collect::<Vec<Vec<u8>>>(),
    )
    .expect("MapProof encoding is infallible")
}

fn encode_map_root(root: &SignedMapRoot) -> Vec<u8> {
    minicbor::to_vec(RevisionWire {
        root_hash: root.root_hash.to_vec(),
        signature: root.signature.clone(),
        revision_number: root.revision_number,
        highest_fully_completed_seq: root.highest_fully_completed_seq,
    })
    .expect("SignedMapRoot encoding is infallible")
}

/// Flattens a list of fixed-width digests into the wire form `Revision`
/// carries proofs in — no length prefixes, since every digest is a
/// constant 32 bytes (shared with [`crate::prover`]).
pub(crate) fn encode_proof(digests: &[kt_crypto::hash::Digest]) -> Vec<u8> {
    digests.iter().flatten().copied().collect()
}

#[derive(minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
struct RevisionWire {
    #[n(0)]
    root_hash: Vec<u8>,
    #[n(1)]
    signature: Vec<u8>,
    #[n(2)]
    revision_number: u64,
    #[n(3)]
    highest_fully_completed_seq: u64,
}

/// Runs the per-directory control loop until `shutdown` fires (§4.D, §5:
/// "the Sequencer is a single logical worker per directory"). Grounded on
/// the node's top-level `select_all` shutdown pattern, scaled down to one
/// subroutine per directory.
pub async fn routine(
    directory_id: String,
    deps: DirectoryDeps,
    min_interval: Duration,
    max_interval: Duration,
    skip_empty_revisions: bool,
    publish: broadcast::Sender<Revision>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut state = SequencerState::default();
    recover(&directory_id, &deps, &mut state).await;

    let mut ticker = kt_async::interval(min_interval, Duration::from_millis(0));
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(directory_id, "sequencer shutting down");
                    return;
                }
            }
            _ = futures::StreamExt::next(&mut ticker) => {
                let elapsed = state.last_revision_ts.elapsed().unwrap_or(Duration::MAX);
                let queue_has_new = deps.queue.high_water_mark(&directory_id).await
                    > state.last_signed_map_root.as_ref().map(|r| r.highest_fully_completed_seq).unwrap_or(0);
                let gate_a = queue_has_new && elapsed >= min_interval;
                let gate_b = elapsed >= max_interval && !skip_empty_revisions;
                if !(gate_a || gate_b) {
                    continue;
                }
                match tick_once(&directory_id, &deps, &mut state, gate_b && !gate_a).await {
                    Ok(Some(outcome)) => {
                        let _ = publish.send(outcome.revision);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(directory_id, error = %e, "sequencer tick failed, backing off"),
                }
            }
        }
    }
}

/// §4.D failure handling: if the latest map revision has not yet been
/// anchored to the log, anchor it now before accepting new work. Map
/// roots are idempotent by revision number, so replaying this on every
/// restart is safe. Also exercised outside of process restart by
/// `undelete_directory`, which restarts the sequencer routine over the
/// same backends.
async fn recover(directory_id: &str, deps: &DirectoryDeps, state: &mut SequencerState) {
    let map_root = match deps.map.latest_root(&deps.map_id).await {
        Ok(root) => root,
        Err(e) => {
            warn!(directory_id, error = %e, "recover: could not read latest map root, skipping");
            return;
        },
    };
    if map_root.revision_number == 0 {
        return;
    }

    // `highest_fully_completed_seq` is sequencer-level bookkeeping the map
    // backend never sees, so the only durable source for it is the
    // mutation log entry `tick_once` records before anchoring.
    let signed_map_root = match deps.mutation_log.signed_map_root(directory_id, map_root.revision_number) {
        Some(root) => root,
        None => {
            warn!(
                directory_id,
                revision = map_root.revision_number,
                "recover: no mutation log record for latest map revision, leaving it to the next tick"
            );
            return;
        },
    };

    let log_root = match deps.log.latest_root(&deps.log_id).await {
        Ok(root) => root,
        Err(_) => kt_log::LogRoot { tree_size: 0, root_hash: kt_crypto::hash::ZERO_DIGEST, signature: Vec::new() },
    };

    if log_root.tree_size > map_root.revision_number {
        // Already anchored; just restore the bookkeeping a normal tick
        // would have left behind.
        state.last_signed_map_root = Some(signed_map_root);
        state.last_revision_ts = SystemTime::now();
        return;
    }

    warn!(directory_id, revision = map_root.revision_number, "re-anchoring unanchored map revision after restart");
    match anchor_with_backoff(deps, &signed_map_root).await {
        Ok(_) => {
            state.last_signed_map_root = Some(signed_map_root);
            state.last_revision_ts = SystemTime::now();
        },
        Err(e) => {
            // Left for the next tick to pick up again; `tick_once` itself
            // does not re-anchor a revision it did not just write, so this
            // revision stays unanchored until `recover` (or an operator)
            // retries, but no work is lost in the meantime.
            warn!(
                directory_id,
                revision = map_root.revision_number,
                error = %e,
                "recover: failed to re-anchor map revision after exhausting retries"
            );
        },
    }
}

/// Retries [`anchor`] with exponential backoff, per §4.D's failure-handling
/// guidance for transient `MapBackend`/`LogBackend` errors ("no work is
/// lost; no work is double-applied"). `LogAnchorMismatch` is not retried:
/// it signals the log already holds a different entry at this index, which
/// more backoff cannot fix.
async fn anchor_with_backoff(
    deps: &DirectoryDeps,
    signed_map_root: &SignedMapRoot,
) -> Result<kt_log::LogRoot, DirectoryError> {
    const MAX_ATTEMPTS: u32 = 5;
    const BASE_DELAY: Duration = Duration::from_millis(100);
    const MAX_DELAY: Duration = Duration::from_secs(5);

    let mut attempt: u32 = 0;
    loop {
        match anchor(deps, signed_map_root).await {
            Ok(root) => return Ok(root),
            Err(DirectoryError::LogAnchorMismatch { expected, actual }) => {
                return Err(DirectoryError::LogAnchorMismatch { expected, actual });
            },
            Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                let delay = BASE_DELAY.saturating_mul(1 << attempt).min(MAX_DELAY);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "anchor attempt failed, retrying");
                kt_async::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
