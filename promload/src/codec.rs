//! Protobuf + snappy transcoding with reusable buffers.
//!
//! Requests go through [`Codec::encode`] (protobuf, then snappy block
//! compression); responses go through [`Codec::decode`] (snappy block
//! decompression, then protobuf). All four staging buffers belong to the
//! codec and keep their capacity between calls.

use bytes::{Bytes, BytesMut};
use prost::Message;

use crate::error::{Error, Result};

/// Default initial capacity of each staging buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

/// Upper bound on snappy expansion. A 3-byte copy element emits at most 64
/// bytes, so no valid block decompresses to more than ~22x its size.
const MAX_EXPANSION: usize = 32;

/// Fails if the encoder wrote a different number of bytes than it predicted.
fn check_encoded_len(expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::Encoding(format!(
            "unexpected size: expected {}, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Worst-case snappy output size for `len` input bytes.
fn compressed_capacity(len: usize) -> Result<usize> {
    match snap::raw::max_compress_len(len) {
        0 => Err(Error::Encoding(format!(
            "message of {} bytes is too large to compress",
            len
        ))),
        n => Ok(n),
    }
}

/// A growable byte buffer that is reused across calls and never shrinks.
#[derive(Debug)]
pub(crate) struct ScratchBuffer {
    buf: BytesMut,
}

impl ScratchBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Empties the buffer and makes room for at least `n` bytes.
    pub(crate) fn ensure_capacity(&mut self, n: usize) {
        self.buf.clear();
        self.buf.reserve(n);
    }

    /// Empties the buffer and makes it exactly `n` zeroed bytes long, for
    /// writers that need a `&mut [u8]` destination.
    fn reset_to_len(&mut self, n: usize) -> &mut [u8] {
        self.ensure_capacity(n);
        self.buf.resize(n, 0);
        &mut self.buf[..]
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub(crate) fn inner_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Hands the current contents out as an owned [`Bytes`]. The allocation is
    /// reclaimed by the next [`ensure_capacity`](Self::ensure_capacity) once
    /// the returned handle is dropped.
    fn take_frozen(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

/// Encoder/decoder for remote read/write bodies.
pub(crate) struct Codec {
    marshaled: ScratchBuffer,
    compressed: ScratchBuffer,
    raw_response: ScratchBuffer,
    decompressed: ScratchBuffer,
    encoder: snap::raw::Encoder,
    decoder: snap::raw::Decoder,
}

impl Codec {
    pub(crate) fn new(initial_capacity: usize) -> Self {
        Self {
            marshaled: ScratchBuffer::with_capacity(initial_capacity),
            compressed: ScratchBuffer::with_capacity(initial_capacity),
            raw_response: ScratchBuffer::with_capacity(initial_capacity),
            decompressed: ScratchBuffer::with_capacity(initial_capacity),
            encoder: snap::raw::Encoder::new(),
            decoder: snap::raw::Decoder::new(),
        }
    }

    /// Serializes and compresses `message`, returning the request body.
    pub(crate) fn encode<M: Message>(&mut self, message: &M) -> Result<Bytes> {
        let expected = message.encoded_len();
        self.marshaled.ensure_capacity(expected);
        message.encode(self.marshaled.inner_mut())?;
        check_encoded_len(expected, self.marshaled.as_slice().len())?;

        let max_len = compressed_capacity(expected)?;
        let dst = self.compressed.reset_to_len(max_len);
        let n = self
            .encoder
            .compress(self.marshaled.as_slice(), dst)
            .map_err(|e| Error::Encoding(format!("snappy compression failed: {}", e)))?;
        self.compressed.inner_mut().truncate(n);

        Ok(self.compressed.take_frozen())
    }

    /// Buffer the transport fills with the raw response body.
    pub(crate) fn response_buffer(&mut self) -> &mut ScratchBuffer {
        &mut self.raw_response
    }

    /// Decompresses and deserializes the body currently held in the response
    /// buffer.
    pub(crate) fn decode<M: Message + Default>(&mut self) -> Result<M> {
        let src = self.raw_response.as_slice();
        let len = snap::raw::decompress_len(src)?;
        if len > src.len().saturating_mul(MAX_EXPANSION) {
            return Err(Error::Decoding(format!(
                "declared length {} exceeds what {} compressed bytes can hold",
                len,
                src.len()
            )));
        }
        let dst = self.decompressed.reset_to_len(len);
        let n = self.decoder.decompress(src, dst)?;
        self.decompressed.inner_mut().truncate(n);

        Ok(M::decode(self.decompressed.as_slice())?)
    }

    /// Compresses and stores `message` as if it had been received, for
    /// exercising the response path without a transport.
    #[cfg(test)]
    pub(crate) fn stage_response<M: Message>(&mut self, message: &M) -> Result<()> {
        let body = self.encode(message)?;
        let raw = self.raw_response.inner_mut();
        raw.clear();
        raw.extend_from_slice(&body);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn capacities(&self) -> [usize; 4] {
        [
            self.marshaled.capacity(),
            self.compressed.capacity(),
            self.raw_response.capacity(),
            self.decompressed.capacity(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompb::{QueryResult, ReadResponse, TimeSeries, WriteRequest};

    fn series_with_samples(n: usize) -> TimeSeries {
        let mut builder = TimeSeries::builder("node_cpu_seconds_total").label("cpu", "0");
        for i in 0..n {
            builder = builder.sample(1_700_000_000_000 + i as i64 * 15_000, i as f64 * 0.5);
        }
        builder.build()
    }

    #[test]
    fn should_round_trip_write_request_through_codec() {
        // given
        let mut codec = Codec::new(64);
        let request = WriteRequest {
            timeseries: vec![series_with_samples(10)],
        };

        // when
        let body = codec.encode(&request).unwrap();
        let raw = codec.response_buffer().inner_mut();
        raw.clear();
        raw.extend_from_slice(&body);
        let decoded: WriteRequest = codec.decode().unwrap();

        // then
        assert_eq!(decoded, request);
    }

    #[test]
    fn should_produce_standard_snappy_block() {
        // given
        let mut codec = Codec::new(64);
        let request = WriteRequest {
            timeseries: vec![series_with_samples(3)],
        };

        // when
        let body = codec.encode(&request).unwrap();

        // then
        let decompressed = snap::raw::Decoder::new().decompress_vec(&body).unwrap();
        assert_eq!(decompressed, request.encode_to_vec());
    }

    #[test]
    fn should_grow_buffers_for_increasing_payloads() {
        // given - start small so every buffer has to grow
        let mut codec = Codec::new(16);

        for n in [1, 10, 100, 1_000, 10_000] {
            let response = ReadResponse {
                results: vec![QueryResult {
                    timeseries: vec![series_with_samples(n)],
                }],
            };

            // when
            codec.stage_response(&response).unwrap();
            let decoded: ReadResponse = codec.decode().unwrap();

            // then
            assert_eq!(decoded, response);
            assert_eq!(decoded.results[0].timeseries[0].samples.len(), n);
        }
    }

    #[test]
    fn should_keep_capacity_when_payload_shrinks() {
        // given
        let mut codec = Codec::new(16);
        let large = ReadResponse {
            results: vec![QueryResult {
                timeseries: vec![series_with_samples(5_000)],
            }],
        };
        codec.stage_response(&large).unwrap();
        let _: ReadResponse = codec.decode().unwrap();
        let grown = codec.capacities();

        // when
        let small = ReadResponse {
            results: vec![QueryResult {
                timeseries: vec![series_with_samples(1)],
            }],
        };
        codec.stage_response(&small).unwrap();
        let decoded: ReadResponse = codec.decode().unwrap();

        // then
        assert_eq!(decoded, small);
        let after = codec.capacities();
        assert!(after[0] >= grown[0]);
        assert!(after[2] >= grown[2]);
        assert!(after[3] >= grown[3]);
    }

    #[test]
    fn should_fail_decoding_malformed_snappy() {
        // given
        let mut codec = Codec::new(16);
        let raw = codec.response_buffer().inner_mut();
        raw.clear();
        raw.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x01, 0x02]);

        // when
        let result: Result<ReadResponse> = codec.decode();

        // then
        assert!(matches!(result, Err(Error::Decoding(_))));
    }

    #[test]
    fn should_reject_encoded_length_mismatch() {
        // when
        let result = check_encoded_len(128, 127);

        // then
        assert!(matches!(result, Err(Error::Encoding(msg)) if msg.contains("expected 128, got 127")));
        assert!(check_encoded_len(128, 128).is_ok());
    }

    #[test]
    fn should_reject_message_too_large_to_compress() {
        // when
        let result = compressed_capacity(usize::MAX);

        // then
        assert!(matches!(result, Err(Error::Encoding(_))));
        assert!(compressed_capacity(1024).unwrap() >= 1024);
    }

    #[test]
    fn should_reject_implausible_decompressed_length() {
        // given - header claims 1 GiB, followed by a few bytes
        let mut codec = Codec::new(16);
        let raw = codec.response_buffer().inner_mut();
        raw.clear();
        raw.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x04, 0x00, 0x01, 0x02]);

        // when
        let result: Result<ReadResponse> = codec.decode();

        // then
        assert!(matches!(result, Err(Error::Decoding(msg)) if msg.contains("exceeds")));
        assert!(codec.capacities()[3] < 1 << 20);
    }

    #[test]
    fn should_fail_decoding_malformed_protobuf() {
        // given - valid snappy wrapping bytes that are not a ReadResponse
        let mut codec = Codec::new(16);
        let garbage = snap::raw::Encoder::new()
            .compress_vec(&[0x0a, 0xff, 0xff, 0xff, 0xff, 0x0f])
            .unwrap();
        let raw = codec.response_buffer().inner_mut();
        raw.clear();
        raw.extend_from_slice(&garbage);

        // when
        let result: Result<ReadResponse> = codec.decode();

        // then
        assert!(matches!(result, Err(Error::Decoding(_))));
    }
}
