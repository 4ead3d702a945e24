//! Shared metrics surface for the heartbeat core: namespace-qualified
//! counters and gauges safe to touch from concurrently running send tasks.

use serde::Serialize;
use std::collections::{hash_map::DefaultHasher, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

const METRICS_SHARD_COUNT: usize = 8;

#[derive(Debug, Clone)]
pub struct SharedMetricsRegistry {
    prefix: Arc<String>,
    shards: Arc<Vec<Mutex<MetricsShard>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct MetricsShard {
    counters: HashMap<String, Arc<CounterCell>>,
    gauges: HashMap<String, Arc<GaugeCell>>,
}

#[derive(Debug)]
struct CounterCell {
    value: AtomicU64,
}

impl CounterCell {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    fn add(&self, delta: u64) -> u64 {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(delta);
            match self
                .value
                .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    fn snapshot(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct GaugeCell {
    value: AtomicU64,
}

impl GaugeCell {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    fn snapshot(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl SharedMetricsRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_shards(namespace, METRICS_SHARD_COUNT)
    }

    pub fn with_shards(namespace: impl Into<String>, shards: usize) -> Self {
        assert!(shards > 0, "shared metrics registry requires shards");
        let raw = namespace.into();
        let prefix = if raw.ends_with('.') {
            raw
        } else {
            format!("{}.", raw)
        };
        let shard_vec: Vec<Mutex<MetricsShard>> = (0..shards)
            .map(|_| Mutex::new(MetricsShard::default()))
            .collect();
        Self {
            prefix: Arc::new(prefix),
            shards: Arc::new(shard_vec),
        }
    }

    pub fn inc_counter(&self, name: impl Into<String>, delta: u64) -> Result<u64, TelemetryError> {
        let key = self.qualify(name.into());
        let cell = {
            let mut guard = self.lock_shard(&key)?;
            guard
                .counters
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CounterCell::new()))
                .clone()
        };
        Ok(cell.add(delta))
    }

    pub fn set_gauge(&self, name: impl Into<String>, value: u64) -> Result<(), TelemetryError> {
        let key = self.qualify(name.into());
        let cell = {
            let mut guard = self.lock_shard(&key)?;
            guard
                .gauges
                .entry(key.clone())
                .or_insert_with(|| Arc::new(GaugeCell::new()))
                .clone()
        };
        cell.set(value);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<MetricsSnapshot, TelemetryError> {
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();
        for shard in self.shards.iter() {
            let guard = shard.lock().map_err(|_| TelemetryError::ShardPoisoned)?;
            for (name, cell) in guard.counters.iter() {
                counters.insert(name.clone(), cell.snapshot());
            }
            for (name, cell) in guard.gauges.iter() {
                gauges.insert(name.clone(), cell.snapshot());
            }
        }
        Ok(MetricsSnapshot { counters, gauges })
    }

    fn shard_for(&self, key: &str) -> &Mutex<MetricsShard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn lock_shard(&self, key: &str) -> Result<MutexGuard<'_, MetricsShard>, TelemetryError> {
        self.shard_for(key)
            .lock()
            .map_err(|_| TelemetryError::ShardPoisoned)
    }

    fn qualify(&self, name: String) -> String {
        if name.starts_with(self.prefix.as_str()) {
            name
        } else {
            format!("{}{}", self.prefix, name)
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("metrics shard mutex poisoned")]
    ShardPoisoned,
}
