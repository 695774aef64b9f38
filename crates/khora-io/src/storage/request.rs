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

//! The bridge between suspended requests and producer invocations.
//!
//! The first request for an unmet stage of an entry is elected head: it
//! queues a [`Transaction`] on the category's shelve and parks on the entry.
//! Later requests for the same stage park on the same entry without queueing
//! anything; they are the head's followers. Whoever pops the transaction
//! claims it, runs the stage's collaborator once, and writes the result back
//! into the entry, which resumes the head and every follower with it.

use super::{CategoryShelve, DispatchMode, StorageShared};
use crate::handle::Asset;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use khora_core::asset::{
    AssetCompiler, AssetError, AssetName, AssetResult, AssetState, ProducerContext,
    ResourceMetadata, Stage,
};
use khora_data::assets::{Election, Entry, Produced, StageOutcome};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// One pending escalation of one entry to one stage.
pub(crate) struct Transaction {
    /// Keeps the entry referenced, so it cannot reset under the producer.
    _pin: Asset,
    entry: Arc<Entry>,
    stage: Stage,
    shelve: Arc<CategoryShelve>,
    storage: Weak<StorageShared>,
    claimed: AtomicBool,
    resolved: AtomicBool,
}

impl Transaction {
    fn new(
        asset: Asset,
        entry: Arc<Entry>,
        stage: Stage,
        shelve: Arc<CategoryShelve>,
        storage: Weak<StorageShared>,
    ) -> Self {
        Self {
            _pin: asset,
            entry,
            stage,
            shelve,
            storage,
            claimed: AtomicBool::new(false),
            resolved: AtomicBool::new(false),
        }
    }

    /// Takes the right to run the transaction. Succeeds exactly once.
    pub(crate) fn try_claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Runs the stage's producer and resolves every waiter with its result.
    ///
    /// Must only be called after a successful [`try_claim`](Self::try_claim).
    pub(crate) async fn run(&self) {
        let _guard = AbandonGuard(self);
        let result = self.produce().await;
        self.resolve(result);
    }

    fn resolve(&self, result: AssetResult<Produced>) {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        if result.is_err() {
            if let Some(storage) = self.storage.upgrade() {
                storage.metrics.record_failure(self.stage);
            }
        }
        self.entry.complete(self.stage, result);
    }

    /// Resumes the waiters with [`AssetError::Abandoned`]. The stage stays
    /// open: the next request for it elects a new producer.
    fn abandon(&self) {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!(
            "{} escalation of '{}' abandoned before it resolved",
            self.stage,
            self.entry.name()
        );
        self.entry.complete(
            self.stage,
            Err(AssetError::Abandoned {
                name: self.entry.name().clone(),
                stage: self.stage,
            }),
        );
    }

    async fn produce(&self) -> AssetResult<Produced> {
        let storage = self.storage.upgrade().ok_or(AssetError::StorageDropped)?;
        storage.metrics.record_run(self.stage);
        log::trace!("Running {} escalation of '{}'", self.stage, self.entry.name());

        match self.stage {
            Stage::Raw => self.fetch(&storage).await,
            Stage::Baked => self.bake(),
            Stage::Loaded => self.load(),
            Stage::Runtime => self.materialize(),
        }
    }

    /// Raw: fetch bytes and metadata, then classify how far the resource already is.
    async fn fetch(&self, storage: &StorageShared) -> AssetResult<Produced> {
        let entry = &self.entry;
        let loaded = storage
            .provider
            .load(entry.resource())
            .await
            .map_err(|error| AssetError::provider(entry.name(), &error))?;

        let metadata = match &loaded.metadata {
            Some(bytes) => ResourceMetadata::decode(bytes).map_err(|error| {
                AssetError::provider(
                    entry.name(),
                    &anyhow!("malformed resource metadata: {error}"),
                )
            })?,
            None => ResourceMetadata::default(),
        };

        let inherent = self
            .shelve
            .definition()
            .classifier()
            .classify(&metadata, entry.resource())
            .clamp(AssetState::Raw, AssetState::Loaded);
        let reached = Stage::try_from(inherent)?;
        if reached > Stage::Raw {
            log::debug!("'{}' is already {} at its source", entry.name(), inherent);
        }

        entry.set_resource_state(inherent);
        if !metadata.dependencies.is_empty() {
            // Declared dependencies hold until a compiler reports its own.
            entry.set_dependencies(metadata.dependencies.iter().map(AssetName::new).collect());
        }
        entry.set_metadata(metadata);
        Ok(Produced::new(reached, loaded.bytes))
    }

    /// Baked: run the compiler pipeline, or pass the raw bytes through.
    fn bake(&self) -> AssetResult<Produced> {
        let input = self.input()?;
        let Some(compiler) = self.shelve.definition().compiler() else {
            return Ok(Produced::new(Stage::Baked, input).consuming(Stage::Raw));
        };

        let metadata = self.entry.metadata().unwrap_or_default();
        let ctx = self.context(&input, &metadata);
        let baked = self
            .compile(compiler, &ctx)
            .map_err(|error| AssetError::producer(self.entry.name(), Stage::Baked, &error))?;
        Ok(Produced::new(Stage::Baked, baked))
    }

    fn compile(&self, compiler: &dyn AssetCompiler, ctx: &ProducerContext<'_>) -> Result<Bytes> {
        compiler.validate_source(ctx)?;
        let sources = compiler.collect_sources(ctx)?;
        let dependencies = compiler.collect_dependencies(ctx)?;
        let compiled = sources
            .iter()
            .map(|source| compiler.compile_source(ctx, source))
            .collect::<Result<Vec<_>>>()?;
        let baked = compiler.finalize(ctx, compiled)?;

        if !dependencies.is_empty() {
            log::debug!(
                "'{}' depends on {} other asset(s)",
                self.entry.name(),
                dependencies.len()
            );
        }
        self.entry.set_dependencies(dependencies);
        Ok(baked)
    }

    /// Loaded: the category loader is mandatory.
    fn load(&self) -> AssetResult<Produced> {
        let input = self.input()?;
        let metadata = self.entry.metadata().unwrap_or_default();
        let ctx = self.context(&input, &metadata);
        let loaded = self
            .shelve
            .definition()
            .loader()
            .load(&ctx)
            .map_err(|error| AssetError::producer(self.entry.name(), Stage::Loaded, &error))?;
        Ok(Produced::new(Stage::Loaded, loaded))
    }

    /// Runtime: run the hook, or pass the loaded bytes through.
    fn materialize(&self) -> AssetResult<Produced> {
        let input = self.input()?;
        let Some(hook) = self.shelve.definition().runtime_hook() else {
            return Ok(Produced::new(Stage::Runtime, input).consuming(Stage::Loaded));
        };

        let metadata = self.entry.metadata().unwrap_or_default();
        let ctx = self.context(&input, &metadata);
        let runtime = hook
            .materialize(&ctx)
            .map_err(|error| AssetError::producer(self.entry.name(), Stage::Runtime, &error))?;
        Ok(Produced::new(Stage::Runtime, runtime))
    }

    /// The data of the stage below this one.
    fn input(&self) -> AssetResult<Bytes> {
        self.stage
            .below()
            .and_then(|below| self.entry.data_for_state(below.state()))
            .ok_or_else(|| AssetError::Released(self.entry.name().clone()))
    }

    fn context<'a>(&'a self, data: &'a Bytes, metadata: &'a ResourceMetadata) -> ProducerContext<'a> {
        ProducerContext::new(
            self.entry.name(),
            self.entry.category(),
            self.stage.state(),
            data,
            metadata,
            self.shelve.allocator(),
        )
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// Resolves the transaction as abandoned if the producing future is dropped.
struct AbandonGuard<'a>(&'a Transaction);

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.0.abandon();
    }
}

enum Role {
    Head(Arc<Transaction>),
    Follower,
    /// The stage settled before the election; nothing to wait for.
    Settled,
}

/// One caller's suspended request for one stage of one entry.
pub(crate) struct Request {
    entry: Arc<Entry>,
    stage: Stage,
    role: Role,
    receiver: Option<oneshot::Receiver<StageOutcome>>,
    shelve: Arc<CategoryShelve>,
    dispatch: DispatchMode,
}

impl Request {
    /// Registers the caller for `stage` and elects its role.
    pub(crate) fn new(
        storage: &Arc<StorageShared>,
        asset: &Asset,
        entry: &Arc<Entry>,
        shelve: &Arc<CategoryShelve>,
        stage: Stage,
    ) -> Self {
        let mut request = Self {
            entry: entry.clone(),
            stage,
            role: Role::Settled,
            receiver: None,
            shelve: shelve.clone(),
            dispatch: storage.config.dispatch,
        };

        match entry.request(stage) {
            Election::Producer if entry.is_settled(stage) => {
                entry.settle(stage);
            }
            Election::Producer => {
                // Parked before the transaction exists, so the head is resumed first.
                request.receiver = Some(entry.park(stage));
                let transaction = Arc::new(Transaction::new(
                    asset.pin(),
                    entry.clone(),
                    stage,
                    shelve.clone(),
                    Arc::downgrade(storage),
                ));
                log::debug!("'{}' elected producer of {}", entry.name(), stage);
                shelve.append_request(stage, transaction.clone());
                request.role = Role::Head(transaction);
            }
            Election::Follower if entry.is_settled(stage) => {}
            Election::Follower => {
                log::trace!("'{}' joins the pending {} escalation", entry.name(), stage);
                storage.metrics.record_follower(stage);
                request.receiver = Some(entry.park(stage));
                request.role = Role::Follower;
            }
        }
        request
    }

    /// Suspends until the stage is settled and returns its outcome.
    pub(crate) async fn wait(mut self) -> StageOutcome {
        if self.dispatch == DispatchMode::Inline {
            drain_stage(&self.shelve, self.stage).await;
            if let Role::Head(transaction) = &self.role {
                // Another consumer may hold our transaction in a detached batch.
                if transaction.try_claim() {
                    transaction.run().await;
                }
            }
        }

        if let Some(outcome) = self.entry.outcome(self.stage) {
            if let Some(mut receiver) = self.receiver.take() {
                // Parked after the wake pass: our waiter is still listed.
                if matches!(receiver.try_recv(), Err(TryRecvError::Empty)) {
                    drop(receiver);
                    self.entry.prune_waiters();
                }
            }
            return outcome;
        }
        let Some(receiver) = self.receiver.take() else {
            // Settled by an abandonment another caller has since cleared.
            return Err(AssetError::Abandoned {
                name: self.entry.name().clone(),
                stage: self.stage,
            });
        };
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => self.entry.outcome(self.stage).unwrap_or_else(|| {
                Err(AssetError::Abandoned {
                    name: self.entry.name().clone(),
                    stage: self.stage,
                })
            }),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        // Inline, nobody else is bound to run a head's work; leaving it queued
        // could strand the followers.
        if self.dispatch != DispatchMode::Inline {
            return;
        }
        if let Role::Head(transaction) = &self.role {
            if transaction.try_claim() {
                transaction.abandon();
            }
        }
    }
}

/// Pops, claims and runs every visible transaction of `stage`.
///
/// Returns how many transactions this call ran.
pub(crate) async fn drain_stage(shelve: &CategoryShelve, stage: Stage) -> usize {
    let mut ran = 0;
    while let Some(transaction) = shelve.acquire_request(stage) {
        if transaction.try_claim() {
            transaction.run().await;
            ran += 1;
        }
    }
    ran
}
