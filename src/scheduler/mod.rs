//! Region scheduling — spreads probe load across network neighbourhoods.
//!
//! Servers are bucketed by region key (the leading host prefix) and
//! interleaved round-robin so consecutive probes target distinct
//! regions. A small recency window tells the poll loop when a region is
//! coming back too soon and a pacing delay is due before the probe.

use std::collections::VecDeque;

use crate::registry::Endpoint;

/// Round-robin interleave across region buckets.
///
/// Buckets keep their first-seen order and each bucket keeps its
/// original relative order; one server per non-empty bucket is emitted
/// per round until every bucket is drained. The output is a permutation
/// of the input.
pub fn interleave(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut buckets: Vec<(String, VecDeque<Endpoint>)> = Vec::new();
    for endpoint in endpoints {
        let key = endpoint.region_key().to_string();
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, bucket)) => bucket.push_back(endpoint),
            None => buckets.push((key, VecDeque::from(vec![endpoint]))),
        }
    }

    let total = buckets.iter().map(|(_, b)| b.len()).sum();
    let mut ordered = Vec::with_capacity(total);
    while !buckets.is_empty() {
        for (_, bucket) in &mut buckets {
            if let Some(endpoint) = bucket.pop_front() {
                ordered.push(endpoint);
            }
        }
        buckets.retain(|(_, bucket)| !bucket.is_empty());
    }

    ordered
}

/// Bounded FIFO of the last few region keys probed.
///
/// Fresh for every provider pass; never shared across providers.
pub struct RecencyWindow {
    recent: VecDeque<String>,
    capacity: usize,
}

impl RecencyWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// True when this key was probed within the last `capacity` probes,
    /// meaning the caller should pace before querying it again.
    pub fn observed(&self, key: &str) -> bool {
        self.recent.iter().any(|k| k == key)
    }

    /// Record a probe against `key`, evicting the oldest entry once the
    /// window is full.
    pub fn push(&mut self, key: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(key.to_string());
    }
}
