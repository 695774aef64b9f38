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

use super::stack::AtomicStack;

/// A lock-free multi-producer, multi-consumer queue built from two stacks.
///
/// Producers push onto `incoming`. Consumers pop from `reversed`; when it is
/// empty they detach the whole of `incoming`, reverse it so the oldest
/// submission comes first, and splice it onto `reversed`. Putting the rest
/// of a batch back is a single CAS unless another consumer spliced first.
///
/// Ordering is amortized FIFO only: items from a later drain can be served
/// before leftovers of an earlier one when consumers race, and a consumer may
/// briefly see the queue as empty while another one holds a detached batch.
#[derive(Debug)]
pub struct WorkQueue<T> {
    incoming: AtomicStack<T>,
    reversed: AtomicStack<T>,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            incoming: AtomicStack::new(),
            reversed: AtomicStack::new(),
        }
    }

    /// Enqueues an item. Never blocks.
    pub fn push(&self, item: T) {
        self.incoming.push(item);
    }

    /// Dequeues an item, or returns `None` when no work is visible. Never blocks.
    pub fn pop(&self) -> Option<T> {
        let mut batch = self.reversed.take_all();
        if batch.is_empty() {
            batch = self.incoming.take_all().reverse();
        }
        let item = batch.pop_front()?;
        self.reversed.push_chain(batch);
        Some(item)
    }

    /// Whether both stacks were empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.reversed.is_empty() && self.incoming.is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
