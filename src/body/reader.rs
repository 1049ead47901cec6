//! Bounded, decoding request body reader.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::body::BodyOptions;
use crate::context::{self, RequestContext, RequestHead};
use crate::error::{Error, Result};
use crate::http::header::parse_int;

/// Output side of a decoder. Refuses to grow past `limit` and drops what it
/// holds when that happens.
///
/// The overflow flag is shared with the reader: decoders buffer output and
/// may first hit the limit while finishing, after they have been consumed.
struct Sink {
    buf: Vec<u8>,
    limit: usize,
    overflowed: Arc<AtomicBool>,
}

impl Sink {
    fn new(limit: usize, overflowed: Arc<AtomicBool>) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            overflowed,
        }
    }
}

impl Write for Sink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.overflowed.load(Ordering::Relaxed) || self.buf.len() + data.len() > self.limit {
            self.overflowed.store(true, Ordering::Relaxed);
            self.buf = Vec::new();
            return Err(io::Error::other("body limit exceeded"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Decoder {
    Identity(Sink),
    Gzip(flate2::write::GzDecoder<Sink>),
    Deflate(flate2::write::ZlibDecoder<Sink>),
    Brotli(Box<brotli::DecompressorWriter<Sink>>),
}

impl Decoder {
    fn for_encoding(encoding: &str, limit: usize, overflowed: Arc<AtomicBool>) -> Result<Self> {
        let sink = Sink::new(limit, overflowed);
        Ok(match encoding {
            "identity" => Decoder::Identity(sink),
            "gzip" => Decoder::Gzip(flate2::write::GzDecoder::new(sink)),
            "deflate" => Decoder::Deflate(flate2::write::ZlibDecoder::new(sink)),
            "br" => Decoder::Brotli(Box::new(brotli::DecompressorWriter::new(sink, 4096))),
            other => return Err(Error::UnsupportedMediaEncoding(other.to_string())),
        })
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Decoder::Identity(sink) => sink.write_all(chunk),
            Decoder::Gzip(d) => d.write_all(chunk),
            Decoder::Deflate(d) => d.write_all(chunk),
            Decoder::Brotli(d) => d.write_all(chunk),
        }
    }

    fn finish(self) -> io::Result<Sink> {
        match self {
            Decoder::Identity(sink) => Ok(sink),
            Decoder::Gzip(d) => d.finish(),
            Decoder::Deflate(d) => d.finish(),
            Decoder::Brotli(d) => d
                .into_inner()
                .map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated brotli stream")),
        }
    }
}

fn decode_error(overflowed: &AtomicBool, limit: usize, err: io::Error) -> Error {
    if overflowed.load(Ordering::Relaxed) {
        return Error::EntityTooLarge { limit };
    }
    Error::InvalidBody(format!("could not decode body: {err}"))
}

/// Reads `body` into memory according to the headers in `request`.
///
/// `Ok(None)` means the request carries no body: neither `Transfer-Encoding`
/// nor a parseable `Content-Length` is present.
pub async fn read_body(request: &RequestHead, body: Body, limit: usize) -> Result<Option<Bytes>> {
    let declared = request.header_str(header::CONTENT_LENGTH).and_then(parse_int);
    if !request.headers.contains_key(header::TRANSFER_ENCODING) && declared.is_none() {
        return Ok(None);
    }

    let encoding = request
        .header_str(header::CONTENT_ENCODING)
        .unwrap_or("identity")
        .trim()
        .to_ascii_lowercase();
    // An encoded length says nothing about the decoded size.
    let expected = declared.filter(|_| encoding == "identity");

    if let Some(length) = expected {
        if length > limit as i64 {
            tracing::debug!(length, limit, "Declared body length over limit");
            return Err(Error::EntityTooLarge { limit });
        }
    }

    let overflowed = Arc::new(AtomicBool::new(false));
    let mut decoder = Decoder::for_encoding(&encoding, limit, Arc::clone(&overflowed))?;
    let mut received: u64 = 0;
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            tracing::debug!(error = %err, "Request body aborted");
            Error::Aborted
        })?;
        received += chunk.len() as u64;
        if let Err(err) = decoder.write(&chunk) {
            return Err(decode_error(&overflowed, limit, err));
        }
    }

    let sink = decoder
        .finish()
        .map_err(|err| decode_error(&overflowed, limit, err))?;

    if let Some(length) = expected {
        if received as i64 != length {
            return Err(Error::SizeMismatch {
                expected: length.max(0) as u64,
                received,
            });
        }
    }

    Ok(Some(Bytes::from(sink.buf)))
}

async fn read_memoized(ctx: &RequestContext, limit: usize) -> Result<Option<Bytes>> {
    ctx.body_cache()
        .get_or_init(|| async {
            match ctx.take_body() {
                Some(body) => read_body(ctx.request(), body, limit).await,
                // An earlier read took the body and was cancelled before finishing.
                None => {
                    tracing::debug!(uri = %ctx.request().uri, "Body read was cancelled earlier");
                    Err(Error::Aborted)
                }
            }
        })
        .await
        .clone()
}

/// The current request's body, read once with the server default limit.
pub async fn read_buffer() -> Result<Option<Bytes>> {
    let ctx = context::current()?;
    let limit = ctx.body_defaults().limit;
    read_memoized(&ctx, limit).await
}

/// Like [`read_buffer`] with an explicit limit. Only the first read of a
/// request applies its limit.
pub async fn read_buffer_with(options: &BodyOptions) -> Result<Option<Bytes>> {
    let ctx = context::current()?;
    read_memoized(&ctx, options.limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextDefaults;
    use axum::http::Request;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;

    fn head(headers: &[(&str, &str)]) -> RequestHead {
        let mut builder = Request::builder().method("POST").uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestHead {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_no_length_no_body() {
        let result = read_body(&head(&[]), Body::from("ignored"), 100).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_identity_body() {
        let result = read_body(&head(&[("content-length", "5")]), Body::from("hello"), 100)
            .await
            .unwrap();
        assert_eq!(result.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_fails_before_reading() {
        let err = read_body(&head(&[("content-length", "1000")]), Body::from("x"), 500)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { limit: 500 }));
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit() {
        let body = Body::from(vec![b'a'; 600]);
        let err = read_body(&head(&[("transfer-encoding", "chunked")]), body, 500)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_size_mismatch() {
        let err = read_body(&head(&[("content-length", "10")]), Body::from("short"), 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 10,
                received: 5
            }
        ));
    }

    #[tokio::test]
    async fn test_gzip_and_deflate() {
        let text = b"compressed body text".repeat(10);

        let encoded = gzip(&text);
        let headers = [("content-encoding", "gzip"), ("content-length", "1")];
        let decoded = read_body(&head(&headers), Body::from(encoded), 1000).await.unwrap();
        assert_eq!(decoded.unwrap(), Bytes::from(text.clone()));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&text).unwrap();
        let encoded = encoder.finish().unwrap();
        let headers = [("content-encoding", "deflate"), ("transfer-encoding", "chunked")];
        let decoded = read_body(&head(&headers), Body::from(encoded), 1000).await.unwrap();
        assert_eq!(decoded.unwrap(), Bytes::from(text));
    }

    #[tokio::test]
    async fn test_brotli() {
        let text = b"brotli body".repeat(20);
        let mut encoded = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut encoded, 4096, 5, 22);
            writer.write_all(&text).unwrap();
        }
        let headers = [("content-encoding", "br"), ("transfer-encoding", "chunked")];
        let decoded = read_body(&head(&headers), Body::from(encoded), 1000).await.unwrap();
        assert_eq!(decoded.unwrap(), Bytes::from(text));
    }

    #[tokio::test]
    async fn test_limit_applies_to_decoded_bytes() {
        let encoded = gzip(&vec![0u8; 10_000]);
        assert!(encoded.len() < 500);
        let headers = [("content-encoding", "gzip"), ("transfer-encoding", "chunked")];
        let err = read_body(&head(&headers), Body::from(encoded), 500).await.unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { limit: 500 }));
    }

    #[tokio::test]
    async fn test_unknown_encoding() {
        let headers = [("content-encoding", "zstd"), ("content-length", "3")];
        let err = read_body(&head(&headers), Body::from("abc"), 100).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMediaEncoding(ref e) if e == "zstd"));
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_invalid_body() {
        let headers = [("content-encoding", "gzip"), ("transfer-encoding", "chunked")];
        let err = read_body(&head(&headers), Body::from("not gzip at all"), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_read_buffer_is_memoized() {
        let request = Request::builder()
            .method("POST")
            .header("content-length", "3")
            .body(Body::from("abc"))
            .unwrap();
        let (ctx, _rx) = RequestContext::new(request, &ContextDefaults::default());

        let (first, second) = ctx
            .run(async {
                let first = read_buffer().await?;
                let second = read_buffer_with(&BodyOptions { limit: 1 }).await?;
                Ok((first, second))
            })
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_small_gzip_over_limit_is_entity_too_large() {
        let encoded = gzip(&[b'a'; 600]);
        let headers = [("content-encoding", "gzip"), ("content-length", "1")];
        let err = read_body(&head(&headers), Body::from(encoded), 500).await.unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { limit: 500 }));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[b'b'; 501]).unwrap();
        let encoded = encoder.finish().unwrap();
        let headers = [("content-encoding", "deflate"), ("transfer-encoding", "chunked")];
        let err = read_body(&head(&headers), Body::from(encoded), 500).await.unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { limit: 500 }));
    }

    #[tokio::test]
    async fn test_stream_error_is_aborted_and_memoized() {
        let chunks: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"par")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let request = Request::builder()
            .method("POST")
            .header("transfer-encoding", "chunked")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();
        let (ctx, _rx) = RequestContext::new(request, &ContextDefaults::default());

        let (first, second) = ctx
            .run(async { Ok((read_buffer().await, read_buffer().await)) })
            .await
            .unwrap();
        assert!(matches!(first, Err(Error::Aborted)));
        assert!(matches!(second, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn test_cancelled_read_does_not_look_like_an_empty_body() {
        let slow = futures_util::stream::once(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok::<_, io::Error>(Bytes::from_static(b"late"))
        });
        let request = Request::builder()
            .method("POST")
            .header("content-length", "4")
            .body(Body::from_stream(slow))
            .unwrap();
        let (ctx, _rx) = RequestContext::new(request, &ContextDefaults::default());

        let (first, second) = ctx
            .run(async {
                let first =
                    tokio::time::timeout(std::time::Duration::from_millis(10), read_buffer()).await;
                Ok((first, read_buffer().await))
            })
            .await
            .unwrap();
        assert!(first.is_err());
        assert!(matches!(second, Err(Error::Aborted)));
    }
}
