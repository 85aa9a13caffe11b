//! Shared ownership of the live array with a grow/dump barrier.
//!
//! Worker threads add through a read lock; a thread that sees `Full` takes
//! the write lock, which drains every in-flight reader and is therefore the
//! growth barrier of the design: one thread re-hashes into a doubled table
//! (or spills the table to disk) while the others block on their next add.
//! A generation counter keeps late arrivals from growing twice for the same
//! full signal.

use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::hash::array::{AddOutcome, HashArray, HashConfig};
use crate::mer::Mer;
use crate::notify;

/// What the barrier did about a full table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullAction {
    Grew { lsize: u32 },
    Dumped,
}

/// Growth knobs: growth can be disabled outright, and is always bounded.
#[derive(Debug, Clone, Copy)]
pub struct GrowthPolicy {
    pub enabled: bool,
    pub max_grows: u32,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy {
            enabled: true,
            max_grows: 4,
        }
    }
}

struct Inner {
    ary: HashArray,
    grows_done: u32,
    generation: u64,
}

/// A spill handler dumps the (quiesced) array somewhere and zeroes it.
pub type SpillFn<'a> = dyn Fn(&HashArray) -> Result<()> + Sync + 'a;

pub struct CountingHash {
    state: RwLock<Inner>,
    policy: GrowthPolicy,
}

impl CountingHash {
    pub fn new(cfg: HashConfig, seed: u64, policy: GrowthPolicy) -> Result<CountingHash> {
        Ok(CountingHash {
            state: RwLock::new(Inner {
                ary: HashArray::new(cfg, seed)?,
                grows_done: 0,
                generation: 0,
            }),
            policy,
        })
    }

    /// Record `v` occurrences of `mer`, growing or spilling when the table
    /// fills. `spill` runs under the barrier with all writers drained.
    pub fn add(&self, mer: &Mer, v: u64, spill: &SpillFn<'_>) -> Result<()> {
        let mut pending = v;
        loop {
            let (outcome, generation) = {
                let g = self.state.read().unwrap();
                (g.ary.add(mer, pending)?, g.generation)
            };
            match outcome {
                AddOutcome::Added => return Ok(()),
                AddOutcome::Full { pending: p } => {
                    pending = p;
                    self.handle_full(generation, spill)?;
                }
            }
        }
    }

    /// Aggregated count of `mer` in the live table.
    pub fn get(&self, mer: &Mer) -> Option<u64> {
        self.state.read().unwrap().ary.get(mer)
    }

    /// Run `f` against the live array with writers drained.
    pub fn with_quiesced<R>(&self, f: impl FnOnce(&HashArray) -> R) -> R {
        let g = self.state.write().unwrap();
        f(&g.ary)
    }

    /// Tear down the wrapper and keep the array (for the final dump).
    pub fn into_array(self) -> HashArray {
        self.state.into_inner().unwrap().ary
    }

    fn handle_full(&self, seen_generation: u64, spill: &SpillFn<'_>) -> Result<FullAction> {
        let mut g = self.state.write().unwrap();
        if g.generation != seen_generation {
            // Another thread already grew or dumped for this full signal.
            return Ok(FullAction::Dumped);
        }
        g.generation += 1;

        let max_lsize = (2 * g.ary.k()).min(63);
        let can_grow = self.policy.enabled
            && g.grows_done < self.policy.max_grows
            && g.ary.lsize() < max_lsize;

        if can_grow {
            let mut lsize = g.ary.lsize() + 1;
            loop {
                let next = HashArray::with_matrix(
                    HashConfig {
                        k: g.ary.k(),
                        lsize,
                        counter_len: g.ary.counter_len(),
                        max_reprobe: g.ary.max_reprobe(),
                    },
                    g.ary.matrix().clone(),
                    g.ary
                        .matrix()
                        .inverse()
                        .ok_or_else(|| Error::Invariant("hash matrix lost its inverse".into()))?,
                )?;
                match g.ary.reinsert_into(&next)? {
                    AddOutcome::Added => {
                        notify!(3, "hash full: grown to 2^{} slots", lsize);
                        g.ary = next;
                        g.grows_done += 1;
                        return Ok(FullAction::Grew { lsize });
                    }
                    AddOutcome::Full { .. } if lsize < max_lsize => lsize += 1,
                    AddOutcome::Full { .. } => break,
                }
            }
        }

        notify!(3, "hash full: spilling 2^{} slots to disk", g.ary.lsize());
        spill(&g.ary)?;
        Ok(FullAction::Dumped)
    }
}
