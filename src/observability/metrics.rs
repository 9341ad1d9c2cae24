use std::time::Instant;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::engine::Operation;
use crate::error::AppError;
use crate::models::delivery::{Delivery, DeliveryStatus};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub lifecycle_transitions_total: IntCounterVec,
    pub lifecycle_latency_seconds: HistogramVec,
    pub deliveries_by_status: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_transitions_total",
                "Lifecycle operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid lifecycle_transitions_total metric");

        let lifecycle_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lifecycle_latency_seconds",
                "Latency of lifecycle operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid lifecycle_latency_seconds metric");

        let deliveries_by_status = IntGaugeVec::new(
            Opts::new("deliveries_by_status", "Stored deliveries per status"),
            &["status"],
        )
        .expect("valid deliveries_by_status metric");

        registry
            .register(Box::new(lifecycle_transitions_total.clone()))
            .expect("register lifecycle_transitions_total");
        registry
            .register(Box::new(lifecycle_latency_seconds.clone()))
            .expect("register lifecycle_latency_seconds");
        registry
            .register(Box::new(deliveries_by_status.clone()))
            .expect("register deliveries_by_status");

        Self {
            registry,
            lifecycle_transitions_total,
            lifecycle_latency_seconds,
            deliveries_by_status,
        }
    }

    /// Records one lifecycle call that began at `started`.
    pub fn observe<T>(&self, operation: Operation, started: Instant, result: &Result<T, AppError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(AppError::Conflict(_)) => "conflict",
            Err(AppError::Forbidden(_)) => "forbidden",
            Err(_) => "error",
        };

        self.lifecycle_latency_seconds
            .with_label_values(&[operation.as_str()])
            .observe(started.elapsed().as_secs_f64());
        self.lifecycle_transitions_total
            .with_label_values(&[operation.as_str(), outcome])
            .inc();
    }

    pub fn record_statuses(&self, deliveries: &[Delivery]) {
        for status in DeliveryStatus::ALL {
            let count = deliveries.iter().filter(|d| d.status == status).count();
            self.deliveries_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use rust_decimal_macros::dec;

    use super::Metrics;
    use crate::engine::Operation;
    use crate::error::AppError;
    use crate::models::delivery::DeliveryStatus;
    use crate::models::delivery::fixtures::delivery;

    #[test]
    fn outcomes_are_labelled() {
        let metrics = Metrics::new();
        metrics.observe(Operation::Assign, Instant::now(), &Ok::<(), AppError>(()));
        metrics.observe::<()>(
            Operation::Assign,
            Instant::now(),
            &Err(AppError::Conflict("taken".to_string())),
        );

        let counter = &metrics.lifecycle_transitions_total;
        assert_eq!(counter.with_label_values(&["assign", "success"]).get(), 1);
        assert_eq!(counter.with_label_values(&["assign", "conflict"]).get(), 1);
    }

    #[test]
    fn status_gauge_covers_every_status() {
        let metrics = Metrics::new();
        metrics.record_statuses(&[
            delivery(1, DeliveryStatus::Available, None, dec!(1)),
            delivery(2, DeliveryStatus::Available, None, dec!(1)),
        ]);

        let body = metrics.encode().unwrap();
        assert!(body.contains("deliveries_by_status{status=\"available\"} 2"));
        assert!(body.contains("deliveries_by_status{status=\"cancelled\"} 0"));
    }
}
