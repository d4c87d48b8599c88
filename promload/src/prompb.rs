//! Protobuf message definitions for the Prometheus remote read/write API.
//!
//! Field numbers follow `prompb/remote.proto` and `prompb/types.proto`, so
//! these messages interoperate with any remote storage endpoint speaking
//! remote read/write 1.0.

use std::fmt;

use prost::Message;

/// Label name that carries the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// WriteRequest is the body of a remote write POST.
#[derive(Clone, PartialEq, Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// ReadRequest is the body of a remote read POST.
#[derive(Clone, PartialEq, Message)]
pub struct ReadRequest {
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Query>,
}

/// ReadResponse holds one [`QueryResult`] per query of the request, in order.
#[derive(Clone, PartialEq, Message)]
pub struct ReadResponse {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<QueryResult>,
}

/// Query selects series by label matchers within a time range.
#[derive(Clone, PartialEq, Message)]
pub struct Query {
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    #[prost(message, repeated, tag = "3")]
    pub matchers: Vec<LabelMatcher>,
}

/// QueryResult holds the series matched by one query.
#[derive(Clone, PartialEq, Message)]
pub struct QueryResult {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// TimeSeries is a labeled stream of samples.
#[derive(Clone, PartialEq, Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

/// Label is a name/value pair identifying a series.
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

/// Sample is a single value at a millisecond timestamp.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// LabelMatcher filters series on one label.
#[derive(Clone, PartialEq, Message)]
pub struct LabelMatcher {
    #[prost(enumeration = "MatcherType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub value: String,
}

/// Matching operator of a [`LabelMatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    Eq = 0,
    Neq = 1,
    Re = 2,
    Nre = 3,
}

impl LabelMatcher {
    /// Matcher selecting every series with a non-empty metric name.
    pub fn any_metric_name() -> Self {
        Self {
            r#type: MatcherType::Re as i32,
            name: METRIC_NAME_LABEL.to_string(),
            value: ".+".to_string(),
        }
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match MatcherType::try_from(self.r#type) {
            Ok(MatcherType::Eq) => "=",
            Ok(MatcherType::Neq) => "!=",
            Ok(MatcherType::Re) => "=~",
            Ok(MatcherType::Nre) => "!~",
            Err(_) => "?",
        };
        write!(f, "{}{}{:?}", self.name, op, self.value)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, m) in self.matchers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", m)?;
        }
        write!(
            f,
            "}} [{}, {})",
            self.start_timestamp_ms, self.end_timestamp_ms
        )
    }
}

impl TimeSeries {
    /// Creates a builder for a series with the given metric name.
    pub fn builder(name: impl Into<String>) -> TimeSeriesBuilder {
        TimeSeriesBuilder::new(name)
    }

    /// Returns the value of the `__name__` label, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == METRIC_NAME_LABEL)
            .map(|l| l.value.as_str())
    }

    /// Formats the label set in selector notation, e.g. `{__name__="up", job="node"}`.
    pub fn display_labels(&self) -> LabelSet<'_> {
        LabelSet(&self.labels)
    }
}

/// Display adapter for a slice of labels.
pub struct LabelSet<'a>(&'a [Label]);

impl fmt::Display for LabelSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, l) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", l.name, l.value)?;
        }
        write!(f, "}}")
    }
}

/// Builder for [`TimeSeries`].
///
/// ```ignore
/// let series = TimeSeries::builder("cpu_usage")
///     .label("host", "server1")
///     .sample(1700000000000, 0.75)
///     .sample(1700000001000, 0.82)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TimeSeriesBuilder {
    labels: Vec<Label>,
    samples: Vec<Sample>,
}

impl TimeSeriesBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            labels: vec![Label {
                name: METRIC_NAME_LABEL.to_string(),
                value: name.into(),
            }],
            samples: Vec::new(),
        }
    }

    /// Adds a label.
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(Label {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a sample at a millisecond timestamp.
    pub fn sample(mut self, timestamp_ms: i64, value: f64) -> Self {
        self.samples.push(Sample {
            value,
            timestamp: timestamp_ms,
        });
        self
    }

    /// Builds the series. Labels are sorted by name, as remote storage expects.
    pub fn build(mut self) -> TimeSeries {
        self.labels.sort_by(|a, b| a.name.cmp(&b.name));
        TimeSeries {
            labels: self.labels,
            samples: self.samples,
        }
    }
}
