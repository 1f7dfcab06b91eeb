//! Bounded LRU cache of query encodings with a time-to-live.
//!
//! Interactive retrieval repeats the same query text often (paging,
//! re-ranking with a different object filter); the text tower is the most
//! expensive step of a similarity search.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ndarray::Array1;
use parking_lot::Mutex;

/// Default capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    vector: Array1<f32>,
    stored_at: Instant,
}

struct State {
    entries: HashMap<String, Entry>,
    /// Keys from least to most recently used.
    recency: VecDeque<String>,
}

impl State {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }
}

/// Thread-safe encoding cache keyed by query text.
pub struct EncodingCache {
    state: Mutex<State>,
    capacity: usize,
    ttl: Duration,
}

impl EncodingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
            }),
            capacity,
            ttl,
        }
    }

    /// Cached encoding of `text`, if present and not expired.
    pub fn get(&self, text: &str) -> Option<Array1<f32>> {
        let mut state = self.state.lock();
        let fresh = state
            .entries
            .get(text)
            .map(|e| e.stored_at.elapsed() < self.ttl)?;

        if !fresh {
            state.remove(text);
            return None;
        }
        state.touch(text);
        state.entries.get(text).map(|e| e.vector.clone())
    }

    /// Store an encoding, evicting the least recently used entries when full.
    pub fn insert(&self, text: &str, vector: Array1<f32>) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock();
        let entry = Entry {
            vector,
            stored_at: Instant::now(),
        };

        if state.entries.insert(text.to_string(), entry).is_some() {
            state.touch(text);
            return;
        }
        state.recency.push_back(text.to_string());

        while state.entries.len() > self.capacity {
            match state.recency.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }
}

impl Default for EncodingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
