// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Generation-scoped scratch arena.
//!
//! The arena holds at most one generation of buffers. A generation is
//! created, reused and released as a unit, so the engine can never observe
//! a mix of buffers sized for different problems.

use crate::{AlignedBuffer, ArenaError, ArenaStats, ScratchBudget};
use std::fmt::Debug;
use std::hash::Hash;
use std::mem;

/// What [`ScratchArena::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaOutcome {
    /// The live generation already matched; nothing was allocated.
    Reused,
    /// A new generation was allocated, after releasing the previous one.
    Rebuilt {
        released_bytes: usize,
        allocated_bytes: usize,
    },
}

struct Generation<R, T> {
    fingerprint: u64,
    buffers: Vec<(R, AlignedBuffer<T>)>,
    bytes: usize,
}

impl<R: PartialEq, T: Copy + Default> Generation<R, T> {
    fn matches(&self, requests: &[(R, usize)]) -> bool {
        self.buffers.len() == requests.len()
            && self
                .buffers
                .iter()
                .zip(requests)
                .all(|((role, buf), (want, len))| role == want && buf.len() == *len)
    }
}

/// Role-keyed scratch buffers for one (shape, strategy) generation.
pub struct ScratchArena<R, T> {
    generation: Option<Generation<R, T>>,
    budget: Option<ScratchBudget>,
    stats: ArenaStats,
}

impl<R, T> ScratchArena<R, T>
where
    R: Copy + Eq + Hash + Debug,
    T: Copy + Default,
{
    /// Creates an empty arena. `None` means no byte ceiling.
    pub fn new(budget: Option<ScratchBudget>) -> Self {
        Self {
            generation: None,
            budget,
            stats: ArenaStats::default(),
        }
    }

    /// Makes the live generation match `fingerprint` and `requests`.
    ///
    /// Returns [`ArenaOutcome::Reused`] without touching memory when the
    /// fingerprint and every `(role, elements)` pair are unchanged. Otherwise
    /// the previous generation is released before the new buffers are
    /// allocated. A request over budget leaves the live generation intact.
    pub fn ensure(
        &mut self,
        fingerprint: u64,
        requests: &[(R, usize)],
    ) -> Result<ArenaOutcome, ArenaError> {
        if let Some(live) = &self.generation {
            if live.fingerprint == fingerprint && live.matches(requests) {
                self.stats.record_reuse();
                tracing::debug!(fingerprint, "scratch generation reused");
                return Ok(ArenaOutcome::Reused);
            }
        }

        let bytes = self.request_bytes(requests)?;
        if let Some(budget) = self.budget {
            if !budget.admits(bytes) {
                self.stats.record_budget_rejection();
                return Err(ArenaError::OverBudget {
                    requested_bytes: bytes,
                    budget_bytes: budget.as_bytes(),
                });
            }
        }

        let released_bytes = self.release();
        let buffers: Vec<(R, AlignedBuffer<T>)> = requests
            .iter()
            .map(|&(role, len)| (role, AlignedBuffer::zeroed(len)))
            .collect();
        self.stats.record_generation(buffers.len(), bytes);
        self.generation = Some(Generation {
            fingerprint,
            buffers,
            bytes,
        });

        tracing::info!(
            fingerprint,
            buffers = requests.len(),
            allocated_bytes = bytes,
            released_bytes,
            "scratch generation rebuilt"
        );
        Ok(ArenaOutcome::Rebuilt {
            released_bytes,
            allocated_bytes: bytes,
        })
    }

    fn request_bytes(&self, requests: &[(R, usize)]) -> Result<usize, ArenaError> {
        let elem = mem::size_of::<T>();
        let mut total = 0usize;
        for (i, (role, len)) in requests.iter().enumerate() {
            if requests[..i].iter().any(|(seen, _)| seen == role) {
                return Err(ArenaError::DuplicateRole(format!("{role:?}")));
            }
            total = len
                .checked_mul(elem)
                .and_then(|b| total.checked_add(b))
                .ok_or_else(|| ArenaError::SizeOverflow {
                    role: format!("{role:?}"),
                    elements: *len,
                })?;
        }
        Ok(total)
    }

    /// Drops the live generation. Returns the bytes it held.
    pub fn release(&mut self) -> usize {
        match self.generation.take() {
            Some(old) => {
                self.stats.record_release(old.buffers.len());
                old.bytes
            }
            None => 0,
        }
    }

    /// Fingerprint of the live generation, if any.
    pub fn fingerprint(&self) -> Option<u64> {
        self.generation.as_ref().map(|g| g.fingerprint)
    }

    /// Bytes held by the live generation.
    pub fn live_bytes(&self) -> usize {
        self.generation.as_ref().map_or(0, |g| g.bytes)
    }

    pub fn budget(&self) -> Option<ScratchBudget> {
        self.budget
    }

    pub fn stats(&self) -> &ArenaStats {
        &self.stats
    }

    pub fn get(&self, role: R) -> Option<&[T]> {
        self.generation
            .as_ref()?
            .buffers
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, b)| b.as_slice())
    }

    pub fn get_mut(&mut self, role: R) -> Option<&mut [T]> {
        self.generation
            .as_mut()?
            .buffers
            .iter_mut()
            .find(|(r, _)| *r == role)
            .map(|(_, b)| b.as_mut_slice())
    }

    /// Borrows every buffer of the live generation at once, so disjoint
    /// roles can be handed to different pipeline stages.
    pub fn split_mut(&mut self) -> ArenaSlices<'_, R, T> {
        let slices = match self.generation.as_mut() {
            Some(g) => g
                .buffers
                .iter_mut()
                .map(|(r, b)| (*r, b.as_mut_slice()))
                .collect(),
            None => Vec::new(),
        };
        ArenaSlices { slices }
    }
}

impl<R, T> Debug for ScratchArena<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("fingerprint", &self.generation.as_ref().map(|g| g.fingerprint))
            .field("live_bytes", &self.generation.as_ref().map_or(0, |g| g.bytes))
            .field("budget", &self.budget)
            .finish()
    }
}

/// Simultaneous mutable views of every buffer in a generation.
pub struct ArenaSlices<'a, R, T> {
    slices: Vec<(R, &'a mut [T])>,
}

impl<'a, R: Copy + Eq, T> ArenaSlices<'a, R, T> {
    /// Takes the buffer for `role`. An absent role yields an empty slice.
    pub fn take(&mut self, role: R) -> &'a mut [T] {
        match self.slices.iter().position(|(r, _)| *r == role) {
            Some(i) => self.slices.swap_remove(i).1,
            None => Default::default(),
        }
    }

    /// Returns `true` if `role` has not been taken and exists in the generation.
    pub fn contains(&self, role: R) -> bool {
        self.slices.iter().any(|(r, _)| *r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Role {
        Input,
        Output,
    }

    #[test]
    fn test_reuse_is_idempotent() {
        let mut arena: ScratchArena<Role, f32> = ScratchArena::new(None);
        let req = [(Role::Input, 100), (Role::Output, 50)];
        assert_eq!(
            arena.ensure(1, &req).unwrap(),
            ArenaOutcome::Rebuilt {
                released_bytes: 0,
                allocated_bytes: 600
            }
        );
        for _ in 0..3 {
            assert_eq!(arena.ensure(1, &req).unwrap(), ArenaOutcome::Reused);
        }
        let s = arena.stats();
        assert_eq!(s.generations, 1);
        assert_eq!(s.allocations, 2);
        assert_eq!(s.reuses, 3);
    }

    #[test]
    fn test_rebuild_releases_first() {
        let mut arena: ScratchArena<Role, f64> = ScratchArena::new(None);
        arena.ensure(1, &[(Role::Input, 10)]).unwrap();
        let outcome = arena.ensure(2, &[(Role::Input, 20)]).unwrap();
        assert_eq!(
            outcome,
            ArenaOutcome::Rebuilt {
                released_bytes: 80,
                allocated_bytes: 160
            }
        );
        assert_eq!(arena.stats().releases, 1);
        assert_eq!(arena.get(Role::Input).map(|s| s.len()), Some(20));
        assert_eq!(arena.fingerprint(), Some(2));
    }

    #[test]
    fn test_size_change_with_same_fingerprint_rebuilds() {
        let mut arena: ScratchArena<Role, f32> = ScratchArena::new(None);
        arena.ensure(9, &[(Role::Input, 10)]).unwrap();
        let outcome = arena.ensure(9, &[(Role::Input, 11)]).unwrap();
        assert!(matches!(outcome, ArenaOutcome::Rebuilt { .. }));
    }

    #[test]
    fn test_over_budget_keeps_live_generation() {
        let mut arena: ScratchArena<Role, f32> =
            ScratchArena::new(Some(ScratchBudget::from_bytes(256)));
        arena.ensure(1, &[(Role::Input, 64)]).unwrap();
        let err = arena.ensure(2, &[(Role::Input, 65)]).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::OverBudget {
                requested_bytes: 260,
                budget_bytes: 256
            }
        ));
        assert_eq!(arena.fingerprint(), Some(1));
        assert_eq!(arena.stats().budget_rejections, 1);
    }

    #[test]
    fn test_duplicate_role() {
        let mut arena: ScratchArena<Role, f32> = ScratchArena::new(None);
        assert!(matches!(
            arena.ensure(1, &[(Role::Input, 1), (Role::Input, 2)]),
            Err(ArenaError::DuplicateRole(_))
        ));
    }

    #[test]
    fn test_split_mut_disjoint() {
        let mut arena: ScratchArena<Role, f32> = ScratchArena::new(None);
        arena.ensure(1, &[(Role::Input, 4), (Role::Output, 4)]).unwrap();
        let mut parts = arena.split_mut();
        let input = parts.take(Role::Input);
        let output = parts.take(Role::Output);
        assert!(!parts.contains(Role::Input));
        input.fill(1.0);
        output.copy_from_slice(input);
        assert_eq!(arena.get(Role::Output), Some(&[1.0f32; 4][..]));
    }

    #[test]
    fn test_release() {
        let mut arena: ScratchArena<Role, f32> = ScratchArena::new(None);
        arena.ensure(1, &[(Role::Input, 16)]).unwrap();
        assert_eq!(arena.live_bytes(), 64);
        assert_eq!(arena.release(), 64);
        assert_eq!(arena.live_bytes(), 0);
        assert!(arena.get(Role::Input).is_none());
        assert_eq!(arena.release(), 0);
    }
}
