//! HTTP transport for remote read/write requests.

use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::codec::{DEFAULT_BUFFER_CAPACITY, ScratchBuffer};
use crate::config::ClientConfig;
use crate::error::{Result, TransportError};

/// Content type of protobuf request bodies.
pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

/// Content encoding of snappy block compressed bodies.
pub const CONTENT_ENCODING_SNAPPY: &str = "snappy";

const READ_VERSION_HEADER: &str = "x-prometheus-remote-read-version";
const WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";
const PROTOCOL_VERSION: &str = "0.1.0";

/// Most bytes reserved up front from a `Content-Length` header. Larger
/// bodies still grow the buffer as chunks arrive.
const MAX_PREALLOCATED_BODY: usize = DEFAULT_BUFFER_CAPACITY;

/// Which remote API a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Read,
    Write,
}

/// POSTs encoded bodies to a single remote URL over a pooled HTTP client.
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub(crate) fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PROTOBUF));
        headers.insert(
            CONTENT_ENCODING,
            HeaderValue::from_static(CONTENT_ENCODING_SNAPPY),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("promload/", env!("CARGO_PKG_VERSION"))),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(TransportError::from)?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Sends `body` and reads the whole response into `response`.
    ///
    /// Returns `Ok` only for HTTP 200. Any other status becomes
    /// [`TransportError::Status`] carrying the response body as text.
    pub(crate) async fn post(
        &self,
        endpoint: Endpoint,
        body: Bytes,
        response: &mut ScratchBuffer,
    ) -> std::result::Result<(), TransportError> {
        let version_header = match endpoint {
            Endpoint::Read => READ_VERSION_HEADER,
            Endpoint::Write => WRITE_VERSION_HEADER,
        };

        let mut resp = self
            .client
            .post(&self.url)
            .header(version_header, PROTOCOL_VERSION)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let hint = resp
            .content_length()
            .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX))
            .min(MAX_PREALLOCATED_BODY);
        response.ensure_capacity(hint);
        let read = read_body(&mut resp, response).await;

        // A rejection is reported with whatever body arrived, even if the
        // body was cut short.
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(response.as_slice()).into_owned(),
            });
        }
        read?;
        Ok(())
    }
}

async fn read_body(
    resp: &mut reqwest::Response,
    buf: &mut ScratchBuffer,
) -> std::result::Result<(), reqwest::Error> {
    while let Some(chunk) = resp.chunk().await? {
        buf.inner_mut().extend_from_slice(&chunk);
    }
    Ok(())
}
