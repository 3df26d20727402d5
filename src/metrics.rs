//! Prometheus metrics for view calls and full node requests

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, Encoder,
    HistogramVec, IntCounterVec, Registry, TextEncoder,
};

const LATENCY_SEC_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Clone, Debug)]
pub struct QueryMetrics {
    /// Labelled by Move function (`module::function`).
    pub view_calls: IntCounterVec,
    pub simulation_failures: IntCounterVec,
    pub decode_failures: IntCounterVec,
    pub simulate_latency: HistogramVec,
    /// Labelled by JSON-RPC method.
    pub rpc_requests: IntCounterVec,
    pub rpc_failures: IntCounterVec,
}

impl QueryMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            view_calls: register_int_counter_vec_with_registry!(
                "deepbook_query_view_calls",
                "Total number of view calls composed",
                &["function"],
                registry,
            )?,
            simulation_failures: register_int_counter_vec_with_registry!(
                "deepbook_query_simulation_failures",
                "Total number of view calls rejected by the simulator",
                &["function"],
                registry,
            )?,
            decode_failures: register_int_counter_vec_with_registry!(
                "deepbook_query_decode_failures",
                "Total number of view call results that failed to decode",
                &["function"],
                registry,
            )?,
            simulate_latency: register_histogram_vec_with_registry!(
                "deepbook_query_simulate_latency",
                "Time spent simulating a view call",
                &["function"],
                LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )?,
            rpc_requests: register_int_counter_vec_with_registry!(
                "deepbook_query_rpc_requests",
                "Total number of full node requests",
                &["method"],
                registry,
            )?,
            rpc_failures: register_int_counter_vec_with_registry!(
                "deepbook_query_rpc_failures",
                "Total number of full node requests that failed",
                &["method"],
                registry,
            )?,
        })
    }
}

/// Render every metric in `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let registry = Registry::new();
        let metrics = QueryMetrics::new(&registry).unwrap();

        metrics
            .view_calls
            .with_label_values(&["pool::mid_price"])
            .inc();
        metrics
            .simulate_latency
            .with_label_values(&["pool::mid_price"])
            .observe(0.02);

        let text = render(&registry).unwrap();
        assert!(text.contains("deepbook_query_view_calls{function=\"pool::mid_price\"} 1"));
        assert!(text.contains(
            "deepbook_query_simulate_latency_count{function=\"pool::mid_price\"} 1"
        ));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        QueryMetrics::new(&registry).unwrap();
        assert!(QueryMetrics::new(&registry).is_err());
    }
}
