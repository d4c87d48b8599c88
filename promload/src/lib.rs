//! promload - Copy historical series between Prometheus remote storage endpoints.
//!
//! promload reads series from a remote read endpoint in bounded time
//! segments and writes them to a remote write endpoint, one series per
//! request. Request and response bodies are protobuf messages compressed
//! with snappy, as defined by the Prometheus remote read/write protocol.
//!
//! # Key Concepts
//!
//! - **RemoteClient**: Talks to one endpoint. Reads walk a [`TimeRange`]
//!   segment by segment; writes send a single series.
//! - **Segment**: A `[start, end)` slice of the range, at most `step` long.
//! - **ReadOutcome**: A read yields a series, no data, or exhaustion of the
//!   range. Only genuine failures are errors.
//!
//! # Example
//!
//! ```ignore
//! use std::time::{Duration, SystemTime};
//! use promload::{RemoteClient, TimeRange, migrate};
//!
//! let end = SystemTime::now();
//! let range = TimeRange::new(end - Duration::from_secs(3600), end, Duration::from_secs(900))?;
//! let mut source = RemoteClient::new("http://prometheus:9090/api/v1/read", range)?;
//! let mut destination = RemoteClient::new("http://promhouse:7781/write", range)?;
//!
//! let stats = migrate(&mut source, &mut destination).await?;
//! println!("{}", stats);
//! ```

mod client;
mod codec;
pub mod config;
mod error;
mod migrate;
pub mod prompb;
mod transport;
mod window;

pub use client::{ReadOutcome, RemoteClient};
pub use codec::DEFAULT_BUFFER_CAPACITY;
pub use config::{ClientConfig, CliArgs, MigrationConfig, ResolvedConfig};
pub use error::{Error, Result, TransportError};
pub use migrate::{MigrationStats, SeriesReader, SeriesWriter, migrate};
pub use prompb::{Label, Sample, TimeSeries, TimeSeriesBuilder};
pub use transport::{CONTENT_ENCODING_SNAPPY, CONTENT_TYPE_PROTOBUF};
pub use window::{Segment, TimeRange, Window, from_millis, to_millis};
