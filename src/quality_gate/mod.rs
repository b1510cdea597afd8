//! Quality-gate evaluator and aggregators: `percentile`, `median`, and
//! `evaluate_gate` primitives composed into a named-gate abstraction the
//! R1/R2/R3 aggregators and the in-process PoC gate build on.

pub mod poc;
pub mod r1;
pub mod r2;
pub mod r3;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Ge,
    Le,
}

impl Operator {
    fn holds(self, measured: f64, threshold: f64) -> bool {
        match self {
            Operator::Ge => measured >= threshold,
            Operator::Le => measured <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl Gate {
    pub fn new(name: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            name: name.into(),
            operator,
            threshold,
        }
    }

    pub fn ge(name: impl Into<String>, threshold: f64) -> Self {
        Self::new(name, Operator::Ge, threshold)
    }

    pub fn le(name: impl Into<String>, threshold: f64) -> Self {
        Self::new(name, Operator::Le, threshold)
    }

    pub fn evaluate(&self, measured: f64) -> GateResult {
        let status = if self.operator.holds(measured, self.threshold) {
            GateStatus::Pass
        } else {
            GateStatus::Fail
        };
        GateResult {
            name: self.name.clone(),
            measured,
            threshold: self.threshold,
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub measured: f64,
    pub threshold: f64,
    pub status: GateStatus,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

/// Recommended default thresholds.
pub fn compatibility_pass_rate_gate() -> Gate {
    Gate::ge("compatibility-pass-rate", 0.95)
}

pub fn flake_rate_gate() -> Gate {
    Gate::le("flake-rate", 0.005)
}

pub fn p95_latency_gate() -> Gate {
    Gate::le("p95-latency-ms", 5.0)
}

pub fn repro_time_p50_gate() -> Gate {
    Gate::le("repro-time-p50-min", 5.0)
}

/// A bundle of gate results plus an overall pass/fail roll-up, the shape
/// every aggregator (R1/R2/R3/PoC) reports through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateReport {
    pub name: String,
    pub gates: Vec<GateResult>,
    pub notes: String,
}

impl QualityGateReport {
    pub fn new(name: impl Into<String>, gates: Vec<GateResult>, notes: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gates,
            notes: notes.into(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.gates.iter().all(GateResult::passed)
    }
}

/// Percentile of a sample set: sort ascending, take index
/// `ceil(n·p) - 1` clamped to `[0, n-1]`. Empty samples → 0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((sorted.len() as f64 * p).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    sorted[rank]
}

/// `ops / (max(1 ns, durationNanos) / 1e9)`.
pub fn throughput(ops: u64, duration_nanos: u64) -> f64 {
    let seconds = duration_nanos.max(1) as f64 / 1e9;
    ops as f64 / seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_twenty_samples_is_nineteenth_element() {
        let values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        assert_eq!(percentile(&values, 0.95), 19.0);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn gate_evaluates_operator_direction() {
        let result = Gate::ge("rate", 0.95).evaluate(0.94);
        assert_eq!(result.status, GateStatus::Fail);
        let result = Gate::le("latency", 5.0).evaluate(4.9);
        assert_eq!(result.status, GateStatus::Pass);
    }

    #[test]
    fn throughput_floors_duration_at_one_nanosecond() {
        assert_eq!(throughput(10, 0), 10.0 / (1.0 / 1e9));
    }
}
