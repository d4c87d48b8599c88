//! Series readers, writers and the migration loop.

use std::fmt;

use async_trait::async_trait;

use crate::client::{ReadOutcome, RemoteClient};
use crate::error::Result;
use crate::prompb::TimeSeries;

/// Source of series, read one segment at a time.
#[async_trait]
pub trait SeriesReader: Send {
    /// Reads the next segment. See [`RemoteClient::read_next`].
    async fn read_next(&mut self) -> Result<ReadOutcome>;
}

/// Destination for series, written one at a time.
#[async_trait]
pub trait SeriesWriter: Send {
    /// Writes one series. See [`RemoteClient::write`].
    async fn write(&mut self, series: TimeSeries) -> Result<()>;
}

#[async_trait]
impl SeriesReader for RemoteClient {
    async fn read_next(&mut self) -> Result<ReadOutcome> {
        RemoteClient::read_next(self).await
    }
}

#[async_trait]
impl SeriesWriter for RemoteClient {
    async fn write(&mut self, series: TimeSeries) -> Result<()> {
        RemoteClient::write(self, series).await
    }
}

/// Counters collected by [`migrate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Segments read, including empty ones.
    pub segments: u64,
    /// Segments for which the source returned no series.
    pub empty_segments: u64,
    pub series_written: u64,
    pub samples_written: u64,
}

impl fmt::Display for MigrationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} segments read ({} empty), {} series with {} samples written",
            self.segments, self.empty_segments, self.series_written, self.samples_written
        )
    }
}

/// Copies every segment from `reader` to `writer` until the reader is
/// exhausted.
///
/// Empty segments are skipped. The first error from either side stops the
/// migration and is returned as is.
pub async fn migrate<R, W>(reader: &mut R, writer: &mut W) -> Result<MigrationStats>
where
    R: SeriesReader + ?Sized,
    W: SeriesWriter + ?Sized,
{
    let mut stats = MigrationStats::default();
    loop {
        match reader.read_next().await? {
            ReadOutcome::Series(series) => {
                stats.segments += 1;
                let samples = series.samples.len() as u64;
                writer.write(series).await?;
                stats.series_written += 1;
                stats.samples_written += samples;
            }
            ReadOutcome::NoData => {
                stats.segments += 1;
                stats.empty_segments += 1;
            }
            ReadOutcome::Exhausted => break,
        }
        if stats.segments % 100 == 0 {
            tracing::info!("Progress: {}", stats);
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::{Error, TransportError};

    struct ScriptedReader {
        outcomes: VecDeque<Result<ReadOutcome>>,
    }

    impl ScriptedReader {
        fn new(outcomes: Vec<Result<ReadOutcome>>) -> Self {
            Self {
                outcomes: outcomes.into(),
            }
        }
    }

    #[async_trait]
    impl SeriesReader for ScriptedReader {
        async fn read_next(&mut self) -> Result<ReadOutcome> {
            self.outcomes
                .pop_front()
                .unwrap_or(Ok(ReadOutcome::Exhausted))
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Vec<TimeSeries>,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl SeriesWriter for RecordingWriter {
        async fn write(&mut self, series: TimeSeries) -> Result<()> {
            if let Some(status) = self.fail_with {
                return Err(TransportError::Status {
                    status,
                    body: "rejected".to_string(),
                }
                .into());
            }
            self.written.push(series);
            Ok(())
        }
    }

    fn series(samples: usize) -> TimeSeries {
        let mut builder = TimeSeries::builder("up").label("job", "node");
        for i in 0..samples {
            builder = builder.sample(i as i64 * 1000, 1.0);
        }
        builder.build()
    }

    #[tokio::test]
    async fn should_write_series_and_skip_empty_segments() {
        // given
        let mut reader = ScriptedReader::new(vec![
            Ok(ReadOutcome::NoData),
            Ok(ReadOutcome::Series(series(10))),
            Ok(ReadOutcome::NoData),
            Ok(ReadOutcome::Series(series(3))),
        ]);
        let mut writer = RecordingWriter::default();

        // when
        let stats = migrate(&mut reader, &mut writer).await.unwrap();

        // then
        assert_eq!(
            stats,
            MigrationStats {
                segments: 4,
                empty_segments: 2,
                series_written: 2,
                samples_written: 13,
            }
        );
        assert_eq!(writer.written.len(), 2);
        assert_eq!(writer.written[0].samples.len(), 10);
    }

    #[tokio::test]
    async fn should_stop_on_first_read_error() {
        // given
        let mut reader = ScriptedReader::new(vec![
            Ok(ReadOutcome::Series(series(1))),
            Err(Error::ProtocolViolation(
                "expected 0 or 1 time series, got 2".to_string(),
            )),
            Ok(ReadOutcome::Series(series(1))),
        ]);
        let mut writer = RecordingWriter::default();

        // when
        let result = migrate(&mut reader, &mut writer).await;

        // then
        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
        assert_eq!(writer.written.len(), 1);
        assert_eq!(reader.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn should_surface_write_rejection_unchanged() {
        // given
        let mut reader = ScriptedReader::new(vec![Ok(ReadOutcome::Series(series(1)))]);
        let mut writer = RecordingWriter {
            fail_with: Some(400),
            ..Default::default()
        };

        // when
        let result = migrate(&mut reader, &mut writer).await;

        // then
        let err = result.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "Transport error: 400: rejected");
    }

    #[test]
    fn should_format_stats_summary() {
        // given
        let stats = MigrationStats {
            segments: 4,
            empty_segments: 3,
            series_written: 1,
            samples_written: 10,
        };

        // when/then
        assert_eq!(
            stats.to_string(),
            "4 segments read (3 empty), 1 series with 10 samples written"
        );
    }
}
