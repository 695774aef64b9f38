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

//! A Treiber stack whose consumers only ever detach the whole list.
//!
//! Popping a single node from a shared Treiber stack needs a memory
//! reclamation scheme, because a concurrent popper may still be reading the
//! node being freed. This stack sidesteps the problem: producers push with a
//! CAS loop, and consumers `take_all` with a single `swap`, after which the
//! detached [`Chain`] is exclusively owned and can be walked, reversed and
//! split without synchronization. Unconsumed nodes go back with
//! [`AtomicStack::push_chain`].

use std::{
    fmt,
    marker::PhantomData,
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

struct Node<T> {
    value: T,
    next: *mut Node<T>,
}

/// A lock-free multi-producer stack with whole-list detachment.
pub struct AtomicStack<T> {
    head: AtomicPtr<Node<T>>,
    _owns: PhantomData<Box<Node<T>>>,
}

// SAFETY: the stack owns its nodes; values only cross threads by being moved
// in through `push` and out through a detached `Chain`.
unsafe impl<T: Send> Send for AtomicStack<T> {}
unsafe impl<T: Send> Sync for AtomicStack<T> {}

impl<T> AtomicStack<T> {
    /// Creates an empty stack.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            _owns: PhantomData,
        }
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let node = Box::into_raw(Box::new(Node {
            value,
            next: ptr::null_mut(),
        }));
        // SAFETY: `node` is a fresh allocation that is linked as its own
        // one-element chain.
        unsafe { self.link(node, node) };
    }

    /// Splices an owned chain on top of the stack, keeping its order.
    ///
    /// Constant time when the stack is empty or the chain knows its tail.
    pub fn push_chain(&self, mut chain: Chain<T>) {
        let first = std::mem::replace(&mut chain.head, ptr::null_mut());
        let tail = std::mem::replace(&mut chain.tail, ptr::null_mut());
        if first.is_null() {
            return;
        }
        // The chain's last node already ends in null.
        if self
            .head
            .compare_exchange(ptr::null_mut(), first, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return;
        }
        let mut last = if tail.is_null() { first } else { tail };
        // SAFETY: every node reachable from `first` belongs to the chain we
        // just took ownership of.
        unsafe {
            while !(*last).next.is_null() {
                last = (*last).next;
            }
            self.link(first, last);
        }
    }

    /// Detaches every node, most recently pushed first.
    pub fn take_all(&self) -> Chain<T> {
        Chain {
            head: self.head.swap(ptr::null_mut(), Ordering::AcqRel),
            tail: ptr::null_mut(),
            _owns: PhantomData,
        }
    }

    /// Whether the stack was empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Publishes the private run `first..=last` as the new top.
    ///
    /// # Safety
    /// `first` must reach `last` through `next`, and no other thread may
    /// access any node of the run.
    unsafe fn link(&self, first: *mut Node<T>, last: *mut Node<T>) {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            (*last).next = head;
            match self
                .head
                .compare_exchange_weak(head, first, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => head = current,
            }
        }
    }
}

impl<T> Default for AtomicStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AtomicStack<T> {
    fn drop(&mut self) {
        drop(self.take_all());
    }
}

impl<T> fmt::Debug for AtomicStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicStack")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// An exclusively owned singly linked list detached from an [`AtomicStack`].
pub struct Chain<T> {
    head: *mut Node<T>,
    /// The last node, when known. Null for a chain fresh from `take_all`.
    tail: *mut Node<T>,
    _owns: PhantomData<Box<Node<T>>>,
}

// SAFETY: a chain is never shared; it owns its nodes like a `Vec<T>` would.
unsafe impl<T: Send> Send for Chain<T> {}

impl<T> Chain<T> {
    /// An empty chain.
    pub const fn empty() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
            _owns: PhantomData,
        }
    }

    /// Whether the chain holds no node.
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Removes the first node.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.head.is_null() {
            return None;
        }
        // SAFETY: the node is owned by this chain and unlinked before the box
        // is reclaimed.
        let node = unsafe { Box::from_raw(self.head) };
        self.head = node.next;
        if self.head.is_null() {
            self.tail = ptr::null_mut();
        }
        Some(node.value)
    }

    /// Reverses the chain in place, turning push order into pop order.
    pub fn reverse(mut self) -> Self {
        let mut reversed: *mut Node<T> = ptr::null_mut();
        let mut current = std::mem::replace(&mut self.head, ptr::null_mut());
        self.tail = current;
        while !current.is_null() {
            // SAFETY: `current` is owned by this chain.
            unsafe {
                let next = (*current).next;
                (*current).next = reversed;
                reversed = current;
                current = next;
            }
        }
        self.head = reversed;
        self
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Iterator for Chain<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop_front()
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        while self.pop_front().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_take_all_is_lifo_and_reverse_is_fifo() {
        let stack = AtomicStack::new();
        for i in 0..5 {
            stack.push(i);
        }
        let lifo: Vec<_> = stack.take_all().collect();
        assert_eq!(lifo, vec![4, 3, 2, 1, 0]);
        assert!(stack.is_empty());

        for i in 0..5 {
            stack.push(i);
        }
        let fifo: Vec<_> = stack.take_all().reverse().collect();
        assert_eq!(fifo, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_push_chain_keeps_order_on_top() {
        let stack = AtomicStack::new();
        stack.push(10);

        let source = AtomicStack::new();
        source.push(2);
        source.push(1);
        stack.push_chain(source.take_all());

        let all: Vec<_> = stack.take_all().collect();
        assert_eq!(all, vec![1, 2, 10]);

        stack.push_chain(Chain::empty());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_reversed_chain_splices_onto_a_busy_stack() {
        let stack = AtomicStack::new();
        stack.push(100);

        let source = AtomicStack::new();
        for i in 0..4 {
            source.push(i);
        }
        let mut fifo = source.take_all().reverse();
        assert_eq!(fifo.pop_front(), Some(0));
        stack.push_chain(fifo);

        let all: Vec<_> = stack.take_all().collect();
        assert_eq!(all, vec![1, 2, 3, 100]);

        // Popping the last node forgets the tail.
        source.push(7);
        let mut single = source.take_all().reverse();
        assert_eq!(single.pop_front(), Some(7));
        assert!(single.is_empty());
        stack.push(1);
        stack.push_chain(single);
        assert_eq!(stack.take_all().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_dropping_frees_remaining_values() {
        let marker = Arc::new(());
        let stack = AtomicStack::new();
        for _ in 0..8 {
            stack.push(marker.clone());
        }
        let mut chain = stack.take_all();
        chain.pop_front();
        stack.push(marker.clone());
        drop(chain);
        drop(stack);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_concurrent_pushes_are_all_observed() {
        let stack = Arc::new(AtomicStack::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let stack = stack.clone();
                thread::spawn(move || {
                    for i in 0..1_000 {
                        stack.push(t * 1_000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("pusher thread panicked");
        }

        let mut values: Vec<_> = stack.take_all().collect();
        values.sort_unstable();
        assert_eq!(values, (0..8_000).collect::<Vec<_>>());
    }
}
