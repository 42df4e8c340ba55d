//! Block-range bookkeeping for event log extraction.
//!
//! A stride set is the sorted, non-overlapping list of `[from, to]` block
//! ranges already scanned for one `(chain, address)`. Every function here is
//! pure; persistence lives in the repo.

use serde::{Deserialize, Serialize};

use crate::serde_utils::u64_string;

pub const DEFAULT_LOG_STRIDE: u64 = 10_000;

/// An inclusive block range
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stride {
    #[serde(with = "u64_string")]
    pub from: u64,
    #[serde(with = "u64_string")]
    pub to: u64,
}

impl Stride {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }
}

/// Splits `[from, to]` into consecutive chunks of at most `size` blocks, the
/// last one ending exactly at `to`.
pub fn chunk(from: u64, to: u64, size: u64) -> Vec<Stride> {
    let size = size.max(1);
    let mut chunks = vec![];

    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        chunks.push(Stride::new(start, end));

        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }

    chunks
}

/// Sorts and coalesces overlapping or adjacent strides
pub fn merge(mut strides: Vec<Stride>) -> Vec<Stride> {
    strides.sort();

    let mut merged: Vec<Stride> = Vec::with_capacity(strides.len());
    for stride in strides {
        match merged.last_mut() {
            Some(last) if stride.from <= last.to.saturating_add(1) => {
                last.to = last.to.max(stride.to);
            }
            _ => merged.push(stride),
        }
    }

    merged
}

pub fn extend(strides: &[Stride], stride: Stride) -> Vec<Stride> {
    let mut strides = strides.to_vec();
    strides.push(stride);

    merge(strides)
}

/// Forgets every block above `target`. Strides wholly at or below the target
/// are untouched, straddlers are truncated and the rest dropped.
pub fn rollback(strides: &[Stride], target: u64) -> Vec<Stride> {
    strides
        .iter()
        .filter(|stride| stride.from <= target)
        .map(|stride| Stride::new(stride.from, stride.to.min(target)))
        .collect()
}

/// Parts of `[from, to]` not covered by `strides`
pub fn gaps(strides: &[Stride], from: u64, to: u64) -> Vec<Stride> {
    if from > to {
        return vec![];
    }

    let mut gaps = vec![];
    let mut cursor = Some(from);

    for stride in merge(strides.to_vec()) {
        let Some(start) = cursor else { break };
        if stride.to < start {
            continue;
        }
        if stride.from > to {
            break;
        }

        if stride.from > start {
            gaps.push(Stride::new(start, stride.from - 1));
        }
        cursor = stride.to.checked_add(1);
    }

    if let Some(start) = cursor {
        if start <= to {
            gaps.push(Stride::new(start, to));
        }
    }

    gaps
}

/// Chunks covering only the gaps of `[from, to]`
pub fn plan(from: u64, to: u64, strides: &[Stride], size: u64) -> Vec<Stride> {
    gaps(strides, from, to)
        .into_iter()
        .flat_map(|gap| chunk(gap.from, gap.to, size))
        .collect()
}

pub fn parse(json: &str) -> Result<Vec<Stride>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(vec![]);
    }

    serde_json::from_str(json)
}

pub fn to_json(strides: &[Stride]) -> Result<String, serde_json::Error> {
    serde_json::to_string(strides)
}
