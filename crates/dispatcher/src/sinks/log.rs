//! LogSink - logs a summary of each depth record via tracing

use contracts::{ContractError, DataSink, DepthEvent};
use tracing::{info, instrument};

/// Sink that logs record summaries for debugging
pub struct LogSink {
    name: String,
    written: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            written: 0,
        }
    }

    fn log_event_summary(&self, event: &DepthEvent) {
        let record = &event.record;
        let valid = record.valid_count();
        let (min, max) = record
            .samples
            .iter()
            .filter(|d| **d > 0.0)
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), d| (lo.min(*d), hi.max(*d)));

        info!(
            sink = %self.name,
            source_id = %event.source_id,
            timestamp_ms = event.timestamp_ms,
            columns = event.grid.columns,
            rows = event.grid.rows,
            samples = record.sample_count(),
            valid,
            min_m = if valid > 0 { min } else { 0.0 },
            max_m = max,
            "Depth record received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, timestamp_ms = event.timestamp_ms)
    )]
    async fn write(&mut self, event: &DepthEvent) -> Result<(), ContractError> {
        self.log_event_summary(event);
        self.written += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, records = self.written, "LogSink closed");
        Ok(())
    }
}
