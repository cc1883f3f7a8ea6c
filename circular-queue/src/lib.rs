// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded FIFO with a beginning and ending that wrap around a fixed size
//! array.
//!
//! Pushing to a full queue hands the item back to the caller; popping an
//! empty queue returns None. Nothing is allocated after construction so a
//! queue may live in a static and be used from interrupt context.

#![cfg_attr(not(test), no_std)]

#[derive(Debug)]
pub struct Queue<T, const N: usize> {
    begin: usize,
    end: usize,
    size: usize,
    data: [Option<T>; N],
}

impl<T, const N: usize> Queue<T, N> {
    const NONE: Option<T> = None;

    pub const fn new() -> Self {
        Self {
            begin: 0,
            end: 0,
            size: 0,
            data: [Self::NONE; N],
        }
    }

    /// Returns true if the queue is empty, false otherwise.
    pub fn is_empty(&self) -> bool { self.size == 0 }

    pub fn is_full(&self) -> bool { self.size == N }

    pub fn len(&self) -> usize { self.size }

    pub const fn capacity(&self) -> usize { N }

    /// Adds an item to the back of the queue.
    ///
    /// Returns the item if the queue is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.data[self.end] = Some(item);
        self.end = Self::advance(self.end);
        self.size += 1;
        Ok(())
    }

    /// Removes the item at the front of the queue.
    #[must_use]
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let result = self.data[self.begin].take();
        self.begin = Self::advance(self.begin);
        self.size -= 1;
        result
    }

    /// Returns the item at the front of the queue without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.data[self.begin].as_ref()
    }

    /// Iterates front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        (0..self.size).filter_map(move |i| self.data[(self.begin + i) % N].as_ref())
    }

    /// Increments the begin or end marker and wrap around if necessary.
    fn advance(position: usize) -> usize { (position + 1) % N }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self { Self::new() }
}
