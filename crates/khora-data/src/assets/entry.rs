// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-asset state record and its escalation state machine.

use crate::sync::AtomicStack;
use arc_swap::ArcSwapOption;
use bytes::Bytes;
use khora_core::asset::{
    AssetError, AssetName, AssetState, CategoryId, ResourceHandle, ResourceMetadata, Stage,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::oneshot;

/// High bit of the reference count word: the entry is being reset.
const RESETTING: usize = 1 << (usize::BITS - 1);

/// What a parked request is eventually resumed with.
pub type StageOutcome = Result<Bytes, AssetError>;

/// The role a caller was elected to by [`Entry::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Election {
    /// First to ask: must run the escalation and resume everyone else.
    Producer,
    /// An escalation is already pending: wait for its result.
    Follower,
}

/// The output a producer hands back to an entry.
#[derive(Debug, Clone)]
pub struct Produced {
    reached: Stage,
    bytes: Bytes,
    consumed: Option<Stage>,
}

impl Produced {
    /// Bytes representing the entry once it reached `reached`.
    pub fn new(reached: Stage, bytes: Bytes) -> Self {
        Self {
            reached,
            bytes,
            consumed: None,
        }
    }

    /// Marks the buffer of `stage` as moved into this result.
    ///
    /// Pass-through escalations use this so the lower buffer is released
    /// instead of being aliased by two states.
    pub fn consuming(mut self, stage: Stage) -> Self {
        self.consumed = Some(stage);
        self
    }

    /// The stage the entry reaches once the result is stored.
    pub fn reached(&self) -> Stage {
        self.reached
    }
}

struct Waiter {
    stage: Stage,
    sender: oneshot::Sender<StageOutcome>,
}

/// One bound asset name.
///
/// An entry is shared by every handle bound to the same name. All of its
/// fields are atomics or lock-free slots so any worker thread can elect a
/// producer, store a result or resume waiters without a lock.
///
/// Buffers are owned per stage. `data_for_state(Raw)` is only available while
/// the entry is exactly `Raw`; the higher stages are available at or above
/// their state, backed by the first populated buffer from that stage up.
pub struct Entry {
    name: AssetName,
    category: CategoryId,
    resource: ResourceHandle,
    ref_count: AtomicUsize,
    generation: AtomicU64,
    current_state: AtomicU8,
    resource_state: AtomicU8,
    awaiting: [AtomicUsize; 4],
    waiters: AtomicStack<Waiter>,
    buffers: [ArcSwapOption<Bytes>; 4],
    failures: [ArcSwapOption<AssetError>; 4],
    metadata: ArcSwapOption<ResourceMetadata>,
    dependencies: ArcSwapOption<Vec<AssetName>>,
}

impl Entry {
    /// Creates an `Unknown`, unreferenced entry.
    pub fn new(name: AssetName, category: CategoryId, resource: ResourceHandle) -> Self {
        Self {
            name,
            category,
            resource,
            ref_count: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            current_state: AtomicU8::new(AssetState::Unknown as u8),
            resource_state: AtomicU8::new(AssetState::Unknown as u8),
            awaiting: std::array::from_fn(|_| AtomicUsize::new(0)),
            waiters: AtomicStack::new(),
            buffers: std::array::from_fn(|_| ArcSwapOption::empty()),
            failures: std::array::from_fn(|_| ArcSwapOption::empty()),
            metadata: ArcSwapOption::empty(),
            dependencies: ArcSwapOption::empty(),
        }
    }

    /// The name the entry is bound by.
    pub fn name(&self) -> &AssetName {
        &self.name
    }

    /// The category whose registry owns the entry.
    pub fn category(&self) -> &CategoryId {
        &self.category
    }

    /// The backing resource.
    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }

    /// How many times the entry was reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // --- Reference counting ---

    /// The number of live references.
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire) & !RESETTING
    }

    /// Whether a release is currently resetting the entry.
    pub fn is_resetting(&self) -> bool {
        self.ref_count.load(Ordering::Acquire) & RESETTING != 0
    }

    /// Takes a reference, waiting out a reset in progress.
    ///
    /// Spins up to `spin_limit` times, then yields the thread between checks.
    /// Returns the new reference count.
    pub fn acquire(&self, spin_limit: u32) -> usize {
        let mut spins = 0u32;
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            if current & RESETTING != 0 {
                if spins < spin_limit {
                    spins += 1;
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
                current = self.ref_count.load(Ordering::Acquire);
                continue;
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current + 1,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drops a reference.
    ///
    /// Returns `true` when this was the last one: the entry is then marked as
    /// resetting and the caller must finish with [`finish_reset`](Self::finish_reset).
    pub fn release(&self) -> bool {
        let mut current = self.ref_count.load(Ordering::Acquire);
        loop {
            let count = current & !RESETTING;
            if count == 0 || current & RESETTING != 0 {
                log::error!("'{}' was released more often than acquired", self.name);
                return false;
            }
            let next = if count == 1 { RESETTING } else { current - 1 };
            match self.ref_count.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return count == 1,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases every derived buffer, returns the entry to `Unknown` and
    /// reopens the slot for binding.
    pub fn finish_reset(&self) {
        for slot in &self.buffers {
            slot.store(None);
        }
        for slot in &self.failures {
            slot.store(None);
        }
        self.metadata.store(None);
        self.dependencies.store(None);
        self.resource_state
            .store(AssetState::Unknown as u8, Ordering::Release);
        self.current_state
            .store(AssetState::Unknown as u8, Ordering::Release);
        for counter in &self.awaiting {
            counter.store(0, Ordering::Release);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        for waiter in self.waiters.take_all().reverse() {
            let _ = waiter
                .sender
                .send(Err(AssetError::Released(self.name.clone())));
        }

        log::debug!("'{}' reset to Unknown", self.name);
        self.ref_count.store(0, Ordering::Release);
    }

    // --- States ---

    /// The state the entry currently holds.
    pub fn current_state(&self) -> AssetState {
        AssetState::from_u8(self.current_state.load(Ordering::Acquire))
    }

    /// The inherent state of the backing resource, once the Raw stage ran.
    pub fn resource_state(&self) -> AssetState {
        AssetState::from_u8(self.resource_state.load(Ordering::Acquire))
    }

    /// Records the inherent state discovered by the Raw stage.
    pub fn set_resource_state(&self, state: AssetState) {
        self.resource_state.store(state as u8, Ordering::Release);
    }

    /// Records that the backing resource was confirmed to exist.
    pub fn mark_exists(&self) {
        self.advance(AssetState::Exists);
    }

    fn advance(&self, state: AssetState) {
        self.current_state.fetch_max(state as u8, Ordering::AcqRel);
    }

    /// Whether [`data_for_state`](Self::data_for_state) would currently
    /// return data for `stage`.
    pub fn satisfies(&self, stage: Stage) -> bool {
        stage.is_satisfied_by(self.current_state())
    }

    /// Whether the entry went through `stage`, possibly by skipping it.
    pub fn reached(&self, stage: Stage) -> bool {
        stage.is_reached_by(self.current_state())
    }

    /// The failure of `stage`, if its producer failed or was abandoned.
    pub fn failure(&self, stage: Stage) -> Option<AssetError> {
        self.failures[stage.index()]
            .load()
            .as_deref()
            .cloned()
    }

    /// Whether a request for `stage` can be answered without waiting.
    pub fn is_settled(&self, stage: Stage) -> bool {
        self.reached(stage) || self.failures[stage.index()].load().is_some()
    }

    /// The answer for a request on `stage`, if it is settled.
    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        if self.reached(stage) {
            return Some(
                self.payload_for(stage)
                    .ok_or_else(|| AssetError::Released(self.name.clone())),
            );
        }
        self.failure(stage).map(Err)
    }

    /// Reopens `stage` if its last producer was abandoned rather than failed.
    ///
    /// Returns whether the stage can be elected again. Real failures stay.
    pub fn clear_abandoned(&self, stage: Stage) -> bool {
        let slot = &self.failures[stage.index()];
        let current = slot.load_full();
        match current.as_deref() {
            None => true,
            Some(AssetError::Abandoned { .. }) => {
                let _ = slot.compare_and_swap(&current, None::<Arc<AssetError>>);
                true
            }
            Some(_) => false,
        }
    }

    // --- Election and waiting ---

    /// Registers interest in `stage` and elects the caller's role.
    ///
    /// The first caller since the last completion of `stage` becomes the
    /// producer; everybody else follows.
    pub fn request(&self, stage: Stage) -> Election {
        if self.awaiting[stage.index()].fetch_add(1, Ordering::AcqRel) == 0 {
            Election::Producer
        } else {
            Election::Follower
        }
    }

    /// How many callers registered interest in `stage` since it last completed.
    pub fn awaiting(&self, stage: Stage) -> usize {
        self.awaiting[stage.index()].load(Ordering::Acquire)
    }

    /// Suspends a caller until `stage` is settled.
    ///
    /// The caller must check [`outcome`](Self::outcome) after parking: a
    /// completion that raced with the registration is only visible there.
    pub fn park(&self, stage: Stage) -> oneshot::Receiver<StageOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.push(Waiter { stage, sender });
        receiver
    }

    // --- Producer write-back ---

    /// Stores a producer's result for `stage` and resumes the waiters it settles.
    ///
    /// On success the produced buffer moves into the entry, superseded buffers
    /// are released and the state advances. On failure the failure becomes
    /// sticky for `stage` until the entry resets, except for
    /// [`AssetError::Abandoned`], which [`clear_abandoned`](Self::clear_abandoned)
    /// lifts. Either way, every waiter of the stage is resumed.
    pub fn complete(&self, stage: Stage, result: Result<Produced, AssetError>) {
        match result {
            Ok(produced) => {
                let reached = produced.reached;
                self.buffers[reached.index()].store(Some(Arc::new(produced.bytes)));
                self.advance(reached.state());
                if let Some(consumed) = produced.consumed.filter(|c| *c != reached) {
                    self.buffers[consumed.index()].store(None);
                }
                if reached > Stage::Raw {
                    self.buffers[Stage::Raw.index()].store(None);
                }
                log::debug!("'{}' {} stage reached {}", self.name, stage, reached);
            }
            Err(error) => {
                log::warn!("'{}' {} stage failed: {}", self.name, stage, error);
                self.failures[stage.index()].store(Some(Arc::new(error)));
            }
        }
        self.settle(stage);
    }

    /// Closes the pending election of `stage` and resumes settled waiters.
    pub fn settle(&self, stage: Stage) {
        self.awaiting[stage.index()].store(0, Ordering::Release);
        self.wake();
    }

    /// Resumes settled waiters and drops those whose caller went away.
    pub fn prune_waiters(&self) {
        self.wake();
    }

    /// Whether any caller is parked on the entry.
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    /// Resumes every parked waiter whose stage is settled, in registration order.
    fn wake(&self) {
        loop {
            let mut pending = Vec::new();
            for waiter in self.waiters.take_all().reverse() {
                match self.outcome(waiter.stage) {
                    Some(outcome) => {
                        let _ = waiter.sender.send(outcome);
                    }
                    None if waiter.sender.is_closed() => {}
                    None => pending.push(waiter),
                }
            }
            if pending.is_empty() {
                return;
            }

            let stages: Vec<Stage> = pending.iter().map(|w| w.stage).collect();
            for waiter in pending {
                self.waiters.push(waiter);
            }
            // A completion may have drained the list while we held these.
            if !stages.iter().any(|stage| self.is_settled(*stage)) {
                return;
            }
        }
    }

    // --- Data ---

    /// The buffer backing `state`, if the entry currently satisfies it.
    pub fn data_for_state(&self, state: AssetState) -> Option<Bytes> {
        let stage = state.stage()?;
        loop {
            let current = self.current_state();
            let data = self.read_backing(stage, current);
            if self.current_state() == current {
                return data;
            }
        }
    }

    /// What a request for `stage` returns.
    ///
    /// Identical to [`data_for_state`](Self::data_for_state) except for `Raw`
    /// on an entry whose resource started above it, where the lowest buffer
    /// held (the pre-baked bytes) is returned.
    pub fn payload_for(&self, stage: Stage) -> Option<Bytes> {
        if stage == Stage::Raw && self.current_state() > AssetState::Raw {
            return self.data_for_state(AssetState::Baked);
        }
        self.data_for_state(stage.state())
    }

    fn read_backing(&self, stage: Stage, current: AssetState) -> Option<Bytes> {
        if !stage.is_satisfied_by(current) {
            return None;
        }
        Stage::ALL[stage.index()..]
            .iter()
            .take_while(|s| s.state() <= current)
            .find_map(|s| self.buffers[s.index()].load().as_deref().cloned())
    }

    // --- Metadata ---

    /// The metadata decoded by the Raw stage.
    pub fn metadata(&self) -> Option<Arc<ResourceMetadata>> {
        self.metadata.load_full()
    }

    /// Stores the metadata decoded by the Raw stage.
    pub fn set_metadata(&self, metadata: ResourceMetadata) {
        self.metadata.store(Some(Arc::new(metadata)));
    }

    /// The dependencies collected by the compiler.
    pub fn dependencies(&self) -> Vec<AssetName> {
        self.dependencies
            .load()
            .as_deref()
            .cloned()
            .unwrap_or_default()
    }

    /// Stores the dependencies collected by the compiler.
    pub fn set_dependencies(&self, dependencies: Vec<AssetName>) {
        self.dependencies.store(Some(Arc::new(dependencies)));
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("resource", &self.resource)
            .field("ref_count", &self.ref_count())
            .field("resetting", &self.is_resetting())
            .field("current_state", &self.current_state())
            .field("resource_state", &self.resource_state())
            .finish_non_exhaustive()
    }
}
