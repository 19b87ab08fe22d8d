//! Schedulable resource amounts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CPU, memory and extended (scalar) resource amounts.
///
/// CPU is in millicores, memory in bytes, scalars in whole units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub milli_cpu: i64,
    #[serde(default)]
    pub memory_bytes: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalar: BTreeMap<String, i64>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_milli_cpu(mut self, milli_cpu: i64) -> Self {
        self.milli_cpu = milli_cpu;
        self
    }

    pub fn with_memory(mut self, bytes: i64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>, amount: i64) -> Self {
        self.add_scalar(name, amount);
        self
    }

    /// Amount of a scalar resource, zero if absent.
    pub fn scalar(&self, name: &str) -> i64 {
        self.scalar.get(name).copied().unwrap_or(0)
    }

    pub fn add_scalar(&mut self, name: impl Into<String>, amount: i64) {
        if amount != 0 {
            *self.scalar.entry(name.into()).or_insert(0) += amount;
        }
    }

    pub fn add(&mut self, other: &Resources) {
        self.milli_cpu += other.milli_cpu;
        self.memory_bytes += other.memory_bytes;
        for (name, amount) in &other.scalar {
            self.add_scalar(name.clone(), *amount);
        }
    }

    /// Component-wise maximum, used for init-container requests.
    pub fn max(&mut self, other: &Resources) {
        self.milli_cpu = self.milli_cpu.max(other.milli_cpu);
        self.memory_bytes = self.memory_bytes.max(other.memory_bytes);
        for (name, amount) in &other.scalar {
            let entry = self.scalar.entry(name.clone()).or_insert(0);
            *entry = (*entry).max(*amount);
        }
    }

    /// `self - other`, floored at zero per resource.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        let mut out = Resources {
            milli_cpu: (self.milli_cpu - other.milli_cpu).max(0),
            memory_bytes: (self.memory_bytes - other.memory_bytes).max(0),
            scalar: BTreeMap::new(),
        };
        for (name, amount) in &self.scalar {
            out.add_scalar(name.clone(), (amount - other.scalar(name)).max(0));
        }
        out
    }

    /// Names of resources in `request` that exceed what `self` offers.
    pub fn insufficient_for(&self, request: &Resources) -> Vec<String> {
        let mut missing = Vec::new();
        if request.milli_cpu > self.milli_cpu {
            missing.push("cpu".to_string());
        }
        if request.memory_bytes > self.memory_bytes {
            missing.push("memory".to_string());
        }
        for (name, amount) in &request.scalar {
            if *amount > self.scalar(name) {
                missing.push(name.clone());
            }
        }
        missing
    }

    pub fn is_zero(&self) -> bool {
        self.milli_cpu == 0 && self.memory_bytes == 0 && self.scalar.values().all(|v| *v == 0)
    }
}
