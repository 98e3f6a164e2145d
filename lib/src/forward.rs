use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use hyper::ext::ReasonPhrase;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::email::Email;
use crate::Error;

// Definition of future types for async use
pub type ForwardFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Delivers a parsed email to a remote endpoint.
pub trait Forwarder {
    /// Make a single delivery attempt and return the decoded response body.
    fn forward<'a>(&'a self, url: &'a str, email: &'a Email) -> ForwardFuture<'a, Value>;
}

pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Forwarder for HttpForwarder {
    /// POST the email as JSON.
    /// No retries: any failure is returned to the caller as-is.
    fn forward<'a>(&'a self, url: &'a str, email: &'a Email) -> ForwardFuture<'a, Value> {
        Box::pin(async move {
            let body = serde_json::to_vec(email)?;

            let req = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body);

            // Map response into an error if applicable
            let resp = map_status(req.send().await?)?;
            let bytes = resp.bytes().await?;

            serde_json::from_slice(&bytes).map_err(|e| e.into())
        })
    }
}

/// Convert a non-success response into a delivery error carrying the status text.
///
/// hyper only records the reason phrase when it differs from the canonical one.
fn map_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status.is_success() {
        return Ok(resp);
    }

    let reason = resp
        .extensions()
        .get::<ReasonPhrase>()
        .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
        .filter(|phrase| !phrase.trim().is_empty())
        .or_else(|| status.canonical_reason())
        .unwrap_or("Unknown");

    Err(Error::Delivery {
        status: status.as_u16(),
        reason: reason.to_string(),
    })
}
