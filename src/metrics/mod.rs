//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Query pipeline metrics
    pub queries: CounterVec,
    pub query_duration: Histogram,

    // LLM client metrics
    pub llm_requests: CounterVec,
    pub llm_failovers: Counter,

    // Parser metrics
    pub tool_calls_parsed: CounterVec,
    pub tool_calls_synthesized: CounterVec,

    // Validator metrics
    pub tool_calls_rejected: CounterVec,

    // Proactive metrics
    pub proactive_events: CounterVec,
    pub instruction_matches: CounterVec,

    // Executor metrics
    pub actions_executed: CounterVec,
    pub action_duration: HistogramVec,
    pub actions_deduplicated: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let queries = register_counter_vec_with_registry!(
            Opts::new("assistant_queries_total", "Total queries processed"),
            &["intent"],
            registry
        )?;

        let query_duration = register_histogram_with_registry!(
            "assistant_query_duration_seconds",
            "Query pipeline duration in seconds",
            registry
        )?;

        let llm_requests = register_counter_vec_with_registry!(
            Opts::new("llm_requests_total", "Total LLM provider requests"),
            &["provider", "status"],
            registry
        )?;

        let llm_failovers = register_counter_with_registry!(
            Opts::new("llm_failovers_total", "Total LLM provider failovers"),
            registry
        )?;

        let tool_calls_parsed = register_counter_vec_with_registry!(
            Opts::new("tool_calls_parsed_total", "Tool calls parsed by stage"),
            &["stage"],
            registry
        )?;

        let tool_calls_synthesized = register_counter_vec_with_registry!(
            Opts::new(
                "tool_calls_synthesized_total",
                "Tool calls synthesized by compensating heuristics"
            ),
            &["tool"],
            registry
        )?;

        let tool_calls_rejected = register_counter_vec_with_registry!(
            Opts::new("tool_calls_rejected_total", "Tool calls dropped by validation"),
            &["tool"],
            registry
        )?;

        let proactive_events = register_counter_vec_with_registry!(
            Opts::new("proactive_events_total", "Inbound proactive events"),
            &["event"],
            registry
        )?;

        let instruction_matches = register_counter_vec_with_registry!(
            Opts::new("instruction_matches_total", "Instruction matches by pattern"),
            &["pattern"],
            registry
        )?;

        let actions_executed = register_counter_vec_with_registry!(
            Opts::new("actions_executed_total", "Executed actions by tool and status"),
            &["tool", "status"],
            registry
        )?;

        let action_duration = register_histogram_vec_with_registry!(
            "action_duration_seconds",
            "Action execution duration in seconds",
            &["tool"],
            registry
        )?;

        let actions_deduplicated = register_counter_with_registry!(
            Opts::new(
                "actions_deduplicated_total",
                "Actions skipped by the redelivery dedup cache"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            queries,
            query_duration,
            llm_requests,
            llm_failovers,
            tool_calls_parsed,
            tool_calls_synthesized,
            tool_calls_rejected,
            proactive_events,
            instruction_matches,
            actions_executed,
            action_duration,
            actions_deduplicated,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a processed query
    pub fn record_query(&self, intent: &str) {
        self.queries.with_label_values(&[intent]).inc();
    }

    /// Record an LLM provider attempt
    pub fn record_llm_request(&self, provider: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.llm_requests.with_label_values(&[provider, status]).inc();
    }

    /// Record a provider failover
    pub fn record_llm_failover(&self) {
        self.llm_failovers.inc();
    }

    /// Record a parsed tool call by stage
    pub fn record_tool_call_parsed(&self, stage: &str) {
        self.tool_calls_parsed.with_label_values(&[stage]).inc();
    }

    /// Record a synthesized tool call
    pub fn record_tool_call_synthesized(&self, tool: &str) {
        self.tool_calls_synthesized.with_label_values(&[tool]).inc();
    }

    /// Record a validation rejection
    pub fn record_tool_call_rejected(&self, tool: &str) {
        self.tool_calls_rejected.with_label_values(&[tool]).inc();
    }

    /// Record an inbound proactive event
    pub fn record_proactive_event(&self, event: &str) {
        self.proactive_events.with_label_values(&[event]).inc();
    }

    /// Record an instruction match
    pub fn record_instruction_match(&self, pattern: &str) {
        self.instruction_matches.with_label_values(&[pattern]).inc();
    }

    /// Record an executed action outcome
    pub fn record_action(&self, tool: &str, success: bool) {
        let status = if success { "completed" } else { "failed" };
        self.actions_executed.with_label_values(&[tool, status]).inc();
    }

    /// Record a dedup-cache skip
    pub fn record_action_deduplicated(&self) {
        self.actions_deduplicated.inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
