use serde::{Deserialize, Serialize};

/// Token and cost counters accumulated over a task's lifetime.
///
/// Fields only ever grow; partial updates arrive as [`UsageDelta`]s parsed
/// from the agent event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: f64,
    pub context_tokens: u64,
    pub turns: u32,
}

/// A partial usage update. Absent fields leave the target unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub input: Option<u64>,
    pub output: Option<u64>,
    pub cache_read: Option<u64>,
    pub cache_write: Option<u64>,
    pub cost: Option<f64>,
    pub context_tokens: Option<u64>,
    pub turns: Option<u32>,
}

impl UsageStats {
    pub fn add(&mut self, delta: &UsageDelta) {
        if let Some(v) = delta.input {
            self.input += v;
        }
        if let Some(v) = delta.output {
            self.output += v;
        }
        if let Some(v) = delta.cache_read {
            self.cache_read += v;
        }
        if let Some(v) = delta.cache_write {
            self.cache_write += v;
        }
        if let Some(v) = delta.cost {
            self.cost += v;
        }
        if let Some(v) = delta.context_tokens {
            self.context_tokens += v;
        }
        if let Some(v) = delta.turns {
            self.turns += v;
        }
    }

    /// Fold another task's totals into this one (team-level aggregation).
    pub fn merge(&mut self, other: &UsageStats) {
        self.input += other.input;
        self.output += other.output;
        self.cache_read += other.cache_read;
        self.cache_write += other.cache_write;
        self.cost += other.cost;
        self.context_tokens += other.context_tokens;
        self.turns += other.turns;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input + self.output + self.cache_read + self.cache_write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_applies_present_fields_only() {
        let mut usage = UsageStats::default();
        usage.add(&UsageDelta {
            input: Some(100),
            output: Some(20),
            cost: Some(0.05),
            ..Default::default()
        });
        usage.add(&UsageDelta {
            output: Some(30),
            turns: Some(1),
            ..Default::default()
        });

        assert_eq!(usage.input, 100);
        assert_eq!(usage.output, 50);
        assert_eq!(usage.turns, 1);
        assert!((usage.cost - 0.05).abs() < f64::EPSILON);
        assert_eq!(usage.cache_read, 0);
    }

    #[test]
    fn merge_sums_all_fields() {
        let mut a = UsageStats {
            input: 10,
            output: 5,
            turns: 2,
            ..Default::default()
        };
        let b = UsageStats {
            input: 1,
            cache_read: 7,
            turns: 1,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.input, 11);
        assert_eq!(a.cache_read, 7);
        assert_eq!(a.turns, 3);
        assert_eq!(a.total_tokens(), 23);
    }
}
