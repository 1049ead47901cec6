//! Typed views of the request body and URL.

use std::collections::HashMap;

use axum::http::header;
use bytes::Bytes;
use mime::Mime;
use serde::de::DeserializeOwned;

use crate::body::{read_buffer, read_buffer_with, BodyOptions};
use crate::context;
use crate::error::{Error, Result};

/// Text encodings a body may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Parameters of the request `Content-Type` when its media type is exactly `expected`.
fn media_type_params(expected: &str) -> Result<Option<Mime>> {
    let request = context::request()?;
    let Some(raw) = request.header_str(header::CONTENT_TYPE) else {
        return Ok(None);
    };
    let parsed: Mime = raw
        .parse()
        .map_err(|_| Error::BadRequest(format!("invalid media type {raw:?}")))?;
    Ok((parsed.essence_str() == expected).then_some(parsed))
}

/// Charset of a text-bearing body with media type `expected`, `utf-8` by default.
fn charset_for(expected: &str) -> Result<Option<Charset>> {
    let Some(mime) = media_type_params(expected)? else {
        return Ok(None);
    };
    let charset = mime
        .get_param(mime::CHARSET)
        .map(|c| c.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string());

    match charset.as_str() {
        "utf-8" | "utf8" => Ok(Some(Charset::Utf8)),
        "utf-16le" => Ok(Some(Charset::Utf16Le)),
        "utf-16be" => Ok(Some(Charset::Utf16Be)),
        other => Err(Error::UnsupportedCharset(other.to_ascii_uppercase())),
    }
}

fn decode(bytes: &[u8], charset: Charset) -> String {
    match charset {
        Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Charset::Utf16Le => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        Charset::Utf16Be => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
    }
}

fn form_pairs(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

/// Body readers with an explicit size limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reader {
    limit: Option<usize>,
}

/// Readers that apply `limit` instead of the server default.
pub fn with_limit(limit: usize) -> Reader {
    Reader { limit: Some(limit) }
}

impl Reader {
    pub async fn buffer(self) -> Result<Option<Bytes>> {
        match self.limit {
            Some(limit) => read_buffer_with(&BodyOptions { limit }).await,
            None => read_buffer().await,
        }
    }

    async fn text_of(self, expected: &str) -> Result<Option<String>> {
        let Some(charset) = charset_for(expected)? else {
            return Ok(None);
        };
        Ok(self.buffer().await?.map(|bytes| decode(&bytes, charset)))
    }

    /// `application/json` body deserialized as `T`. An empty body is `None`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<Option<T>> {
        let Some(text) = self.text_of("application/json").await? else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::InvalidBody(format!("malformed json: {e}")))
    }

    /// `text/plain` body.
    pub async fn text(self) -> Result<Option<String>> {
        self.text_of("text/plain").await
    }

    /// `application/octet-stream` body, undecoded.
    pub async fn raw(self) -> Result<Option<Bytes>> {
        if media_type_params("application/octet-stream")?.is_none() {
            return Ok(None);
        }
        self.buffer().await
    }

    /// `application/x-www-form-urlencoded` body. A repeated key keeps its last value.
    pub async fn urlencoded(self) -> Result<Option<HashMap<String, String>>> {
        Ok(self
            .text_of("application/x-www-form-urlencoded")
            .await?
            .map(|text| form_pairs(text.as_bytes())))
    }
}

pub async fn json<T: DeserializeOwned>() -> Result<Option<T>> {
    Reader::default().json().await
}

pub async fn json_value() -> Result<Option<serde_json::Value>> {
    Reader::default().json().await
}

pub async fn text() -> Result<Option<String>> {
    Reader::default().text().await
}

pub async fn raw() -> Result<Option<Bytes>> {
    Reader::default().raw().await
}

pub async fn urlencoded() -> Result<Option<HashMap<String, String>>> {
    Reader::default().urlencoded().await
}

/// Query string parameters of the current request. A repeated key keeps its last value.
pub fn query() -> Result<HashMap<String, String>> {
    let request = context::request()?;
    Ok(request
        .uri
        .query()
        .map(|q| form_pairs(q.as_bytes()))
        .unwrap_or_default())
}

/// Absolute URL of the current request. The origin is a placeholder unless
/// the request target was absolute.
pub fn url() -> Result<url::Url> {
    let request = context::request()?;
    let base = url::Url::parse("https://example.com/").map_err(|e| Error::Internal(e.to_string()))?;
    base.join(&request.uri.to_string())
        .map_err(|e| Error::BadRequest(format!("invalid request target: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextDefaults, RequestContext};
    use axum::body::Body;
    use axum::http::Request;
    use serde::Deserialize;
    use std::future::Future;

    async fn with_request<F, Fut, T>(content_type: Option<&str>, body: &'static [u8], f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/submit?a=1&b=two&a=3")
            .header("content-length", body.len());
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let (ctx, _rx) = RequestContext::new(
            builder.body(Body::from(body)).unwrap(),
            &ContextDefaults::default(),
        );
        ctx.run(f()).await
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        user: String,
    }

    #[tokio::test]
    async fn test_json_body() {
        let login = with_request(Some("application/json; charset=UTF-8"), br#"{"user":"ann"}"#, json::<Login>)
            .await
            .unwrap();
        assert_eq!(login, Some(Login { user: "ann".into() }));
    }

    #[tokio::test]
    async fn test_media_type_mismatch_is_none() {
        let value = with_request(Some("text/plain"), b"{}", json_value).await.unwrap();
        assert!(value.is_none());
        let value = with_request(None, b"{}", json_value).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_charset() {
        let err = with_request(Some("text/plain; charset=latin1"), b"hi", text)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCharset(ref c) if c == "LATIN1"));
    }

    #[tokio::test]
    async fn test_utf16_text() {
        let decoded = with_request(Some("text/plain; charset=utf-16le"), b"h\0i\0", text)
            .await
            .unwrap();
        assert_eq!(decoded.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let err = with_request(Some("application/json"), b"{nope", json_value)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_json_is_none() {
        let value = with_request(Some("application/json"), b"", json_value).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_urlencoded_and_query() {
        let form = with_request(
            Some("application/x-www-form-urlencoded"),
            b"name=J%C3%B6rg&city=New+York",
            urlencoded,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(form["name"], "Jörg");
        assert_eq!(form["city"], "New York");

        let params = with_request(None, b"", || async { query() }).await.unwrap();
        assert_eq!(params["a"], "3");
        assert_eq!(params["b"], "two");
    }

    #[tokio::test]
    async fn test_raw_and_limit() {
        let bytes = with_request(Some("application/octet-stream"), b"\x00\x01", raw)
            .await
            .unwrap();
        assert_eq!(bytes.unwrap(), Bytes::from_static(b"\x00\x01"));

        let err = with_request(Some("application/octet-stream"), b"0123456789", || {
            with_limit(4).raw()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn test_url_helper() {
        let url = with_request(None, b"", || async { url() }).await.unwrap();
        assert_eq!(url.path(), "/submit");
        assert_eq!(url.query(), Some("a=1&b=two&a=3"));
    }
}
