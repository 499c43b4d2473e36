//! Prometheus text exposition of engine statistics.

use boost_core::stats::BoostStats;
use std::fmt::Write as _;
use std::time::Duration;

fn metric(out: &mut String, name: &str, kind: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

#[allow(clippy::cast_precision_loss)]
fn seconds(ns: u64) -> f64 {
    ns as f64 / 1e9
}

/// Render `stats` in the Prometheus text format.
pub fn format_prometheus_metrics(stats: &BoostStats, uptime: Duration) -> String {
    let mut out = String::with_capacity(2048);

    metric(&mut out, "input_boost_active", "gauge", "Boost window active (1) or idle (0)", u8::from(stats.phase.is_active()));
    metric(&mut out, "input_boost_generation", "counter", "Boost cycles started", stats.generation);

    let counters = [
        ("input_boost_triggers_accepted_total", "Triggers that opened a boost window", stats.triggers_accepted),
        ("input_boost_triggers_debounced_total", "Triggers dropped inside the window", stats.triggers_debounced),
        ("input_boost_triggers_disabled_total", "Triggers dropped while boosting is disabled", stats.triggers_disabled),
        ("input_boost_wakes_sent_total", "Worker wakes delivered", stats.wakes_sent),
        ("input_boost_wakes_coalesced_total", "Worker wakes merged into a pending one", stats.wakes_coalesced),
        ("input_boost_worker_runs_total", "Worker passes", stats.worker_runs),
        ("input_boost_stale_wakes_total", "Worker passes after their window expired", stats.stale_wakes),
        ("input_boost_policy_fetch_failures_total", "CPUs skipped for lack of a policy", stats.policy_fetch_failures),
        ("input_boost_reevaluation_failures_total", "Rejected policy re-evaluations", stats.reevaluation_failures),
        ("input_boost_sched_boost_failures_total", "Rejected scheduler boost requests", stats.sched_boost_failures),
        ("input_boost_expiries_armed_total", "Expiry deadlines armed", stats.expiries_armed),
        ("input_boost_expiries_fired_total", "Expiries that reset the floors", stats.expiries_fired),
        ("input_boost_expiries_stale_total", "Expiries superseded by a newer cycle", stats.expiries_stale),
    ];
    for (name, help, value) in counters {
        metric(&mut out, name, "counter", help, value);
    }

    out.push_str("# HELP input_boost_wake_latency_seconds Wake-to-effect latency per cluster\n");
    out.push_str("# TYPE input_boost_wake_latency_seconds gauge\n");
    for (cluster, latency) in stats.wake_latency.iter().enumerate() {
        let Some(latency) = latency else { continue };
        for (stat, value) in [
            ("min", latency.min_ns),
            ("mean", latency.mean_ns),
            ("p99", latency.p99_ns),
            ("max", latency.max_ns),
        ] {
            if let Some(ns) = value {
                let _ = writeln!(
                    out,
                    "input_boost_wake_latency_seconds{{cluster=\"{cluster}\",stat=\"{stat}\"}} {:.9}",
                    seconds(ns)
                );
            }
        }
    }

    out.push_str("# HELP input_boost_slow_wakes_total Wakes slower than the slow threshold\n");
    out.push_str("# TYPE input_boost_slow_wakes_total counter\n");
    for (cluster, latency) in stats.wake_latency.iter().enumerate() {
        if let Some(latency) = latency {
            let _ = writeln!(out, "input_boost_slow_wakes_total{{cluster=\"{cluster}\"}} {}", latency.slow_count);
        }
    }

    metric(&mut out, "input_boost_uptime_seconds", "gauge", "Daemon uptime in seconds", uptime.as_secs());
    out
}
