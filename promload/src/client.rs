//! Remote read/write client.
//!
//! [`RemoteClient`] reads one series per time segment from a remote read
//! endpoint and writes one series per request to a remote write endpoint.
//! Each call is a single attempt; failures are returned unchanged and no
//! retries are made.

use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::prompb::{LabelMatcher, Query, ReadRequest, ReadResponse, TimeSeries, WriteRequest};
use crate::transport::{Endpoint, HttpTransport};
use crate::window::{Segment, TimeRange, Window};

/// Outcome of a successful [`RemoteClient::read_next`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The segment contained exactly one series.
    Series(TimeSeries),
    /// The segment contained no series. The caller should move on.
    NoData,
    /// Every segment of the range has been read.
    Exhausted,
}

/// Client for one Prometheus remote read or remote write endpoint.
///
/// The client owns a cursor over its [`TimeRange`] and the buffers used to
/// stage requests and responses, so calls take `&mut self`. Run several
/// clients to migrate several series or ranges concurrently.
///
/// # Example
///
/// ```ignore
/// use promload::{ReadOutcome, RemoteClient, TimeRange};
///
/// let mut source = RemoteClient::new("http://prometheus:9090/api/v1/read", range)?;
/// let mut destination = RemoteClient::new("http://promhouse:7781/write", range)?;
/// loop {
///     match source.read_next().await? {
///         ReadOutcome::Series(ts) => destination.write(ts).await?,
///         ReadOutcome::NoData => continue,
///         ReadOutcome::Exhausted => break,
///     }
/// }
/// ```
pub struct RemoteClient {
    transport: HttpTransport,
    window: Window,
    codec: Codec,
}

impl RemoteClient {
    /// Creates a client with default settings for `url`.
    pub fn new(url: impl Into<String>, range: TimeRange) -> Result<Self> {
        Self::with_config(ClientConfig::new(url), range)
    }

    /// Creates a client from explicit settings.
    pub fn with_config(config: ClientConfig, range: TimeRange) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(&config)?,
            window: Window::new(range),
            codec: Codec::new(config.initial_buffer_capacity),
        })
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// The read cursor.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Reads the series for the next time segment.
    ///
    /// The query matches every series with a non-empty metric name, so the
    /// source is expected to hold at most one series per segment.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the request failed or was not answered with 200.
    /// - [`Error::Decoding`] if the response body is not valid snappy/protobuf.
    /// - [`Error::ProtocolViolation`] if the response does not hold exactly one
    ///   query result, or the result holds more than one series.
    #[tracing::instrument(level = "trace", skip_all, fields(url = %self.transport.url()))]
    pub async fn read_next(&mut self) -> Result<ReadOutcome> {
        let Some(segment) = self.window.next_segment() else {
            return Ok(ReadOutcome::Exhausted);
        };

        let request = read_request(&segment);
        tracing::debug!("Request: {}", request.queries[0]);

        let body = self.codec.encode(&request)?;
        self.transport
            .post(Endpoint::Read, body, self.codec.response_buffer())
            .await?;
        let response: ReadResponse = self.codec.decode()?;

        let mut results = response.results;
        if results.len() != 1 {
            return Err(Error::ProtocolViolation(format!(
                "expected 1 query result, got {}",
                results.len()
            )));
        }
        let mut timeseries = results.swap_remove(0).timeseries;
        match timeseries.len() {
            0 => {
                tracing::warn!("Got nothing for request {}.", request.queries[0]);
                Ok(ReadOutcome::NoData)
            }
            1 => {
                let ts = timeseries.swap_remove(0);
                tracing::debug!(
                    "Got {} with {} samples.",
                    ts.display_labels(),
                    ts.samples.len()
                );
                Ok(ReadOutcome::Series(ts))
            }
            n => Err(Error::ProtocolViolation(format!(
                "expected 0 or 1 time series, got {}",
                n
            ))),
        }
    }

    /// Writes one series.
    ///
    /// # Errors
    ///
    /// - [`Error::Encoding`] if the request could not be serialized.
    /// - [`Error::Transport`] if the request failed or was not answered with
    ///   200. A rejection carries the endpoint's status code and body.
    #[tracing::instrument(level = "trace", skip_all, fields(url = %self.transport.url()))]
    pub async fn write(&mut self, series: TimeSeries) -> Result<()> {
        tracing::debug!(
            "Writing {} with {} samples.",
            series.display_labels(),
            series.samples.len()
        );
        let request = WriteRequest {
            timeseries: vec![series],
        };

        let body = self.codec.encode(&request)?;
        self.transport
            .post(Endpoint::Write, body, self.codec.response_buffer())
            .await?;
        Ok(())
    }
}

fn read_request(segment: &Segment) -> ReadRequest {
    ReadRequest {
        queries: vec![Query {
            start_timestamp_ms: segment.start_ms(),
            end_timestamp_ms: segment.end_ms(),
            matchers: vec![LabelMatcher::any_metric_name()],
        }],
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::prompb::MatcherType;
    use crate::window::from_millis;

    #[test]
    fn should_build_read_request_for_segment() {
        // given
        let segment = Segment {
            start: from_millis(1_700_000_000_000),
            end: from_millis(1_700_000_900_000),
        };

        // when
        let request = read_request(&segment);

        // then
        assert_eq!(request.queries.len(), 1);
        let query = &request.queries[0];
        assert_eq!(query.start_timestamp_ms, 1_700_000_000_000);
        assert_eq!(query.end_timestamp_ms, 1_700_000_900_000);
        assert_eq!(query.matchers.len(), 1);
        assert_eq!(query.matchers[0].r#type(), MatcherType::Re);
        assert_eq!(query.matchers[0].name, "__name__");
        assert_eq!(query.matchers[0].value, ".+");
    }

    #[tokio::test]
    async fn should_return_exhausted_without_network_for_empty_range() {
        // given - nothing listens on this port, so any request would fail
        let t = from_millis(1_700_000_000_000);
        let range = TimeRange::new(t, t, Duration::from_secs(60)).unwrap();
        let mut client = RemoteClient::new("http://127.0.0.1:9/api/v1/read", range).unwrap();

        // when
        let outcome = client.read_next().await.unwrap();

        // then
        assert_eq!(outcome, ReadOutcome::Exhausted);
    }

    #[tokio::test]
    async fn should_report_network_failure_as_transport_error() {
        // given
        let t = from_millis(1_700_000_000_000);
        let range = TimeRange::new(t, t + Duration::from_secs(60), Duration::from_secs(60)).unwrap();
        let mut client = RemoteClient::new("http://127.0.0.1:9/api/v1/read", range).unwrap();

        // when
        let result = client.read_next().await;

        // then
        match result {
            Err(Error::Transport(e)) => {
                assert!(matches!(e, crate::TransportError::Network(_)));
                assert_eq!(e.body(), None);
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }
}
