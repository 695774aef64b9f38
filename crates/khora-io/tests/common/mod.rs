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

#![allow(dead_code)]

use anyhow::{bail, Result};
use bytes::{BufMut, Bytes};
use khora_core::asset::{
    AssetCompiler, AssetLoader, AssetName, CategoryDefinition, CompiledSource, ProducerContext,
    RuntimeHook, SourceUnit,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Invocation counters shared between a test and its category collaborators.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub compiles: Arc<AtomicUsize>,
    pub loads: Arc<AtomicUsize>,
    pub materializations: Arc<AtomicUsize>,
}

impl Counters {
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }
}

/// A toy shader compiler: prefixes its input with `compiled:` and reports
/// `#include` lines as dependencies.
pub struct ShaderCompiler {
    pub counters: Counters,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl AssetCompiler for ShaderCompiler {
    fn validate_source(&self, ctx: &ProducerContext<'_>) -> Result<()> {
        self.counters.compiles.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if ctx.data().is_empty() {
            bail!("empty shader");
        }
        Ok(())
    }

    fn collect_dependencies(&self, ctx: &ProducerContext<'_>) -> Result<Vec<AssetName>> {
        let source = std::str::from_utf8(ctx.data())?;
        Ok(source
            .lines()
            .filter_map(|line| line.strip_prefix("#include "))
            .map(|include| AssetName::new(include.trim()))
            .collect())
    }

    fn compile_source(
        &self,
        ctx: &ProducerContext<'_>,
        source: &SourceUnit,
    ) -> Result<CompiledSource> {
        if self.fail {
            bail!("failed to compile shader: unexpected token");
        }
        let mut out = ctx.allocate(source.bytes.len() + 9);
        out.put_slice(b"compiled:");
        out.put_slice(&source.bytes);
        Ok(CompiledSource {
            name: source.name.clone(),
            bytes: out.freeze(),
        })
    }

    fn finalize(&self, _ctx: &ProducerContext<'_>, compiled: Vec<CompiledSource>) -> Result<Bytes> {
        Ok(compiled
            .into_iter()
            .next()
            .map(|unit| unit.bytes)
            .unwrap_or_default())
    }
}

/// Prefixes its input with `loaded:`.
pub struct PrefixLoader {
    pub counters: Counters,
}

impl AssetLoader for PrefixLoader {
    fn load(&self, ctx: &ProducerContext<'_>) -> Result<Bytes> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        let mut out = ctx.allocate(ctx.data().len() + 7);
        out.put_slice(b"loaded:");
        out.put_slice(ctx.data());
        Ok(out.freeze())
    }
}

/// Prefixes its input with `runtime:`.
pub struct PrefixHook {
    pub counters: Counters,
}

impl RuntimeHook for PrefixHook {
    fn materialize(&self, ctx: &ProducerContext<'_>) -> Result<Bytes> {
        self.counters.materializations.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from([b"runtime:".as_slice(), ctx.data()].concat()))
    }
}

/// The `shader` category: compiler, loader and runtime hook.
pub fn shader_category(counters: &Counters) -> CategoryDefinition {
    compiled_category("shader", counters, false, None).with_runtime_hook(PrefixHook {
        counters: counters.clone(),
    })
}

/// A category with a compiler and a loader, and no runtime hook.
pub fn compiled_category(
    id: &str,
    counters: &Counters,
    fail: bool,
    delay: Option<Duration>,
) -> CategoryDefinition {
    CategoryDefinition::new(
        id,
        PrefixLoader {
            counters: counters.clone(),
        },
    )
    .with_compiler(ShaderCompiler {
        counters: counters.clone(),
        fail,
        delay,
    })
}

/// A category with only a loader: Baked and Runtime pass through.
pub fn loader_only_category(id: &str, counters: &Counters) -> CategoryDefinition {
    CategoryDefinition::new(
        id,
        PrefixLoader {
            counters: counters.clone(),
        },
    )
}
