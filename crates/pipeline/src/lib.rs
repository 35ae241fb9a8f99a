//! Ingestion pipeline: sensor registry, reading ingestor with liveness
//! sweep, and routing of resulting events onto the broker.

pub mod dispatch;
pub mod ingestor;
pub mod registry;

pub use ingestor::{BatchReport, IngestConfig, IngestOutcome, ReadingIngestor, SweepReport};
pub use registry::{CachedRegistry, InMemoryRegistry, SensorRegistry};
