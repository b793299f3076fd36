//! Delta generation for agent transactions

use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the signed amounts an agent applies to the ledger
pub trait DeltaSource: Send + Sync {
    /// Next nonzero delta
    fn next_delta(&mut self) -> Result<i64>;
}

/// Uniform random deltas in `[-max, -1] ∪ [1, max]`
#[derive(Debug)]
pub struct RandomDeltas {
    rng: StdRng,
    max_delta: i64,
}

impl RandomDeltas {
    /// Generator with an explicit seed
    pub fn seeded(seed: u64, max_delta: i64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max_delta: max_delta.max(1),
        }
    }

    /// Generator for the agent at `index`, so agents never share a sequence
    pub fn for_agent(base_seed: Option<u64>, index: usize, max_delta: i64) -> Self {
        let base = base_seed.unwrap_or_else(wall_clock_seed);
        Self::seeded(mix_seed(base, index), max_delta)
    }
}

impl DeltaSource for RandomDeltas {
    fn next_delta(&mut self) -> Result<i64> {
        let magnitude = self.rng.gen_range(1..=self.max_delta);
        Ok(if self.rng.gen_bool(0.5) {
            magnitude
        } else {
            -magnitude
        })
    }
}

/// Fixed sequence of deltas, for deterministic runs
#[derive(Debug, Clone)]
pub struct ScriptedDeltas {
    deltas: VecDeque<i64>,
    served: usize,
}

impl ScriptedDeltas {
    /// Replay `deltas` in order
    pub fn new(deltas: impl IntoIterator<Item = i64>) -> Self {
        Self {
            deltas: deltas.into_iter().collect(),
            served: 0,
        }
    }
}

impl DeltaSource for ScriptedDeltas {
    fn next_delta(&mut self) -> Result<i64> {
        let delta = self
            .deltas
            .pop_front()
            .ok_or(Error::DeltaSourceExhausted(self.served))?;
        self.served += 1;
        Ok(delta)
    }
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ u64::from(std::process::id())
}

// splitmix64 finalizer over base + index
fn mix_seed(base: u64, index: usize) -> u64 {
    let mut z = base.wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
