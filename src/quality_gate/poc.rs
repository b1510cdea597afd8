//! In-process PoC gate: compares a TCP-framed
//! benchmark summary against an in-process one plus a trace-analysis
//! verdict, deciding GO/NO_GO from the latency and throughput deltas
//! between the two.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BenchmarkPoint {
    pub p95_ms: f64,
    pub throughput_ops_sec: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TraceAnalysisSummary {
    pub useful: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PocDecision {
    Go,
    NoGo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PocGateReport {
    pub p95_improvement_ratio: f64,
    pub throughput_improvement_ratio: f64,
    pub decision: PocDecision,
    pub notes: String,
}

/// `p95ImprovementRatio = (tcpP95 - inP95) / tcpP95`,
/// `throughputImprovementRatio = (inTp - tcpTp) / tcpTp`. Decision = GO
/// iff the trace is useful and at least one ratio meets its threshold.
pub fn evaluate(
    tcp: &BenchmarkPoint,
    in_process: &BenchmarkPoint,
    trace: &TraceAnalysisSummary,
    p95_improvement_threshold: f64,
    throughput_improvement_threshold: f64,
) -> PocGateReport {
    let p95_improvement_ratio = if tcp.p95_ms == 0.0 {
        0.0
    } else {
        (tcp.p95_ms - in_process.p95_ms) / tcp.p95_ms
    };
    let throughput_improvement_ratio = if tcp.throughput_ops_sec == 0.0 {
        0.0
    } else {
        (in_process.throughput_ops_sec - tcp.throughput_ops_sec) / tcp.throughput_ops_sec
    };

    let meets_threshold = p95_improvement_ratio >= p95_improvement_threshold
        || throughput_improvement_ratio >= throughput_improvement_threshold;

    let decision = if trace.useful && meets_threshold {
        PocDecision::Go
    } else {
        PocDecision::NoGo
    };

    let notes = if !trace.useful {
        "trace analysis was not useful".to_string()
    } else if !meets_threshold {
        format!(
            "neither ratio met its threshold (p95={p95_improvement_ratio:.3}, throughput={throughput_improvement_ratio:.3})"
        )
    } else {
        format!(
            "p95_improvement={p95_improvement_ratio:.3}, throughput_improvement={throughput_improvement_ratio:.3}"
        )
    };

    PocGateReport {
        p95_improvement_ratio,
        throughput_improvement_ratio,
        decision,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_when_trace_useful_and_p95_improves() {
        let tcp = BenchmarkPoint {
            p95_ms: 10.0,
            throughput_ops_sec: 1000.0,
        };
        let in_process = BenchmarkPoint {
            p95_ms: 5.0,
            throughput_ops_sec: 1000.0,
        };
        let trace = TraceAnalysisSummary { useful: true };
        let report = evaluate(&tcp, &in_process, &trace, 0.3, 0.3);
        assert_eq!(report.decision, PocDecision::Go);
        assert!((report.p95_improvement_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_go_when_trace_not_useful_even_if_ratios_improve() {
        let tcp = BenchmarkPoint {
            p95_ms: 10.0,
            throughput_ops_sec: 1000.0,
        };
        let in_process = BenchmarkPoint {
            p95_ms: 1.0,
            throughput_ops_sec: 5000.0,
        };
        let trace = TraceAnalysisSummary { useful: false };
        let report = evaluate(&tcp, &in_process, &trace, 0.3, 0.3);
        assert_eq!(report.decision, PocDecision::NoGo);
    }

    #[test]
    fn no_go_when_neither_ratio_meets_threshold() {
        let tcp = BenchmarkPoint {
            p95_ms: 10.0,
            throughput_ops_sec: 1000.0,
        };
        let in_process = BenchmarkPoint {
            p95_ms: 9.5,
            throughput_ops_sec: 1010.0,
        };
        let trace = TraceAnalysisSummary { useful: true };
        let report = evaluate(&tcp, &in_process, &trace, 0.3, 0.3);
        assert_eq!(report.decision, PocDecision::NoGo);
    }
}
