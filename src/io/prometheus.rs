//! Prometheus metrics HTTP endpoint
//!
//! Exposes poll metrics in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

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

/// Write a simple metric (counter or gauge) with site label
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, site: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write the cycle duration histogram
fn write_histogram(output: &mut String, name: &str, help: &str, site: &str, summary: &MetricsSummary) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let buckets = &summary.cycle_buckets;
    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {}", summary.cycle_duration_sum_ms);
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {cumulative}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_cycle_metrics(&mut output, site_id, &summary);
    write_row_metrics(&mut output, site_id, &summary);
    write_histogram(
        &mut output,
        "wallboard_cycle_duration_ms",
        "Poll cycle wall time in milliseconds",
        site_id,
        &summary,
    );

    output
}

fn write_cycle_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "wallboard_cycles_total",
        "Poll cycles started",
        MetricType::Counter,
        site,
        summary.cycles_total,
    );
    write_metric(
        output,
        "wallboard_cycles_completed_total",
        "Poll cycles that reached the write phase",
        MetricType::Counter,
        site,
        summary.cycles_completed,
    );

    let _ = writeln!(output, "# HELP wallboard_cycles_failed_total Poll cycles abandoned before writing");
    let _ = writeln!(output, "# TYPE wallboard_cycles_failed_total counter");
    for (reason, value) in [
        ("build", summary.cycles_failed_build),
        ("query", summary.cycles_failed_query),
        ("schema", summary.cycles_failed_schema),
    ] {
        let _ = writeln!(
            output,
            "wallboard_cycles_failed_total{{site=\"{site}\",reason=\"{reason}\"}} {value}"
        );
    }

    write_metric(
        output,
        "wallboard_ticks_skipped_total",
        "Poll ticks dropped while a cycle was running",
        MetricType::Counter,
        site,
        summary.ticks_skipped_total,
    );
    write_metric(
        output,
        "wallboard_last_success_timestamp_seconds",
        "Unix time of the last cycle that wrote every row",
        MetricType::Gauge,
        site,
        summary.last_success_unix_secs,
    );
}

fn write_row_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "wallboard_rows_written_total",
        "Stat rows written",
        MetricType::Counter,
        site,
        summary.rows_written_total,
    );
    write_metric(
        output,
        "wallboard_row_write_failures_total",
        "Stat row writes that failed",
        MetricType::Counter,
        site,
        summary.row_write_failures_total,
    );
    write_metric(
        output,
        "wallboard_tracked_keys",
        "Tracked queue and media type pairs",
        MetricType::Gauge,
        site,
        summary.tracked_keys,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
        }
        (&Method::GET, "/health") => {
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from("ok")))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found"))),
    };

    // Builders above only use static, valid parts
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.set_tracked_keys(6);
        metrics.record_cycle_started();
        metrics.record_cycle_completed(6, 0, 1_700_000_000);
        metrics.record_cycle_duration(75);

        let output = format_prometheus_metrics(&metrics, "hq");

        assert!(output.contains("wallboard_cycles_total{site=\"hq\"} 1"));
        assert!(output.contains("wallboard_rows_written_total{site=\"hq\"} 6"));
        assert!(output.contains("wallboard_tracked_keys{site=\"hq\"} 6"));
        assert!(output.contains("wallboard_cycles_failed_total{site=\"hq\",reason=\"schema\"} 0"));
        assert!(output.contains("wallboard_cycle_duration_ms_bucket{site=\"hq\",le=\"50\"} 0"));
        assert!(output.contains("wallboard_cycle_duration_ms_bucket{site=\"hq\",le=\"100\"} 1"));
        assert!(output.contains("wallboard_cycle_duration_ms_count{site=\"hq\"} 1"));
        assert!(output.contains("wallboard_last_success_timestamp_seconds{site=\"hq\"} 1700000000"));
    }

    #[test]
    fn test_scrape_does_not_reset_report() {
        let metrics = Metrics::new();
        metrics.record_cycle_started();
        metrics.record_cycle_duration(900);

        let _ = format_prometheus_metrics(&metrics, "hq");
        let _ = format_prometheus_metrics(&metrics, "hq");

        assert_eq!(metrics.report().max_cycle_ms, 900);
    }
}
