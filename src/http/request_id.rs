//! Request identifiers.
//!
//! Every request gets an `x-request-id`: the client's, if it sent one, or a
//! fresh UUID v4. The same value is echoed on the response.

use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{self, MakeRequestId};

use crate::context::RequestHead;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<request_id::RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(request_id::RequestId::new)
    }
}

/// Access to the request ID of a request head.
pub trait RequestId {
    fn request_id(&self) -> Option<&str>;
}

impl RequestId for RequestHead {
    fn request_id(&self) -> Option<&str> {
        self.header_str(X_REQUEST_ID)
    }
}
