//! Prometheus text exposition for gateway metrics
//!
//! Served at `/metrics` by the HTTP server in [`crate::io::http`].

use crate::infra::metrics::{Metrics, MetricsSummary, LATENCY_BUCKET_BOUNDS_MS, NUM_BUCKETS};
use std::fmt::Write;

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with service label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    service: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{service=\"{service}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    service: &str,
    buckets: &[u64; NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in LATENCY_BUCKET_BOUNDS_MS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{service=\"{service}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{service=\"{service}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{service=\"{service}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
pub fn format_prometheus_metrics(metrics: &Metrics, service: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_request_metrics(&mut output, service, &summary);
    write_outcome_metrics(&mut output, service, &summary);
    write_histogram(
        &mut output,
        "parking_request_latency_ms",
        "Request handling latency in milliseconds",
        service,
        &summary.latency_buckets,
        summary.latency_sum_ms,
    );
    write_metric(
        &mut output,
        "parking_uptime_seconds",
        "Seconds since the gateway started",
        MetricType::Gauge,
        service,
        summary.uptime_secs,
    );

    output
}

fn write_request_metrics(output: &mut String, service: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP parking_requests_total Requests received per channel");
    let _ = writeln!(output, "# TYPE parking_requests_total counter");
    for (channel, count) in [
        ("ussd", summary.ussd_requests_total),
        ("whatsapp", summary.whatsapp_messages_total),
        ("ivr", summary.ivr_requests_total),
    ] {
        let _ = writeln!(
            output,
            "parking_requests_total{{service=\"{service}\",channel=\"{channel}\"}} {count}"
        );
    }
    write_metric(
        output,
        "parking_invalid_inputs_total",
        "Inputs that matched no menu path or command",
        MetricType::Counter,
        service,
        summary.invalid_inputs_total,
    );
}

fn write_outcome_metrics(output: &mut String, service: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "parking_vehicle_not_found_total",
        "Lookups for plates with no transaction",
        MetricType::Counter,
        service,
        summary.not_found_total,
    );
    write_metric(
        output,
        "parking_cross_operator_refusals_total",
        "Requests refused because another operator owns the vehicle",
        MetricType::Counter,
        service,
        summary.cross_operator_refusals_total,
    );
    write_metric(
        output,
        "parking_upstream_failures_total",
        "Store or partner API failures surfaced as a retry message",
        MetricType::Counter,
        service,
        summary.upstream_failures_total,
    );
    write_metric(
        output,
        "parking_best_effort_failures_total",
        "Swallowed failures of phone links and notifications",
        MetricType::Counter,
        service,
        summary.best_effort_failures_total,
    );
    write_metric(
        output,
        "parking_fees_computed_total",
        "Fees computed by the tariff engine",
        MetricType::Counter,
        service,
        summary.fees_computed_total,
    );
    write_metric(
        output,
        "parking_payment_pushes_sent_total",
        "M-Pesa prompts accepted by the payment API",
        MetricType::Counter,
        service,
        summary.pushes_sent_total,
    );
    write_metric(
        output,
        "parking_payment_pushes_failed_total",
        "M-Pesa prompts not sent",
        MetricType::Counter,
        service,
        summary.pushes_failed_total,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Channel;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_request(Channel::Ussd);
        metrics.record_request(Channel::WhatsApp);
        metrics.record_latency(4);
        metrics.record_latency(700);
        metrics.record_push(true);

        let output = format_prometheus_metrics(&metrics, "SyfePark");

        assert!(output.contains("parking_requests_total{service=\"SyfePark\",channel=\"ussd\"} 1"));
        assert!(output.contains("parking_requests_total{service=\"SyfePark\",channel=\"ivr\"} 0"));
        assert!(output.contains("parking_payment_pushes_sent_total{service=\"SyfePark\"} 1"));
        assert!(output.contains("parking_request_latency_ms_bucket{service=\"SyfePark\",le=\"5\"} 1"));
        assert!(output.contains("parking_request_latency_ms_bucket{service=\"SyfePark\",le=\"+Inf\"} 2"));
        assert!(output.contains("parking_request_latency_ms_sum{service=\"SyfePark\"} 704"));
    }

    #[test]
    fn test_scrape_does_not_reset_window() {
        let metrics = Metrics::new();
        metrics.record_latency(30);
        let _ = format_prometheus_metrics(&metrics, "SyfePark");
        assert_eq!(metrics.report().window_max_ms, 30);
    }
}
