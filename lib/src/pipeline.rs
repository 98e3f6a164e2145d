use std::fmt;

use futures::stream::Stream;
use serde_json::Value;

use crate::config::Config;
use crate::drain;
use crate::email::{MimeParser, Parser};
use crate::forward::{Forwarder, HttpForwarder};
use crate::Error;

/// One inbound message: the raw byte stream and its declared size.
pub struct InboundEvent<S> {
    pub raw: S,
    pub raw_size: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Draining,
    Parsing,
    Forwarding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Draining => write!(f, "draining"),
            Self::Parsing => write!(f, "parsing"),
            Self::Forwarding => write!(f, "forwarding"),
        }
    }
}

/// The first error raised by the pipeline, tagged with the stage it occurred in.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    pub stage: Stage,
    pub error: Error,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for Failure {}

/// Drain -> parse -> forward, once per inbound message.
pub struct Pipeline<P, F> {
    config: Config,
    parser: P,
    forwarder: F,
}

impl Pipeline<MimeParser, HttpForwarder> {
    /// Build a pipeline backed by `mailparse` and `reqwest`.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        let forwarder = HttpForwarder::new(config.request_timeout())?;
        Ok(Self::new(config, MimeParser, forwarder))
    }
}

impl<P: Parser, F: Forwarder> Pipeline<P, F> {
    pub fn new(config: Config, parser: P, forwarder: F) -> Self {
        Self {
            config,
            parser,
            forwarder,
        }
    }

    /// Process a single inbound message.
    ///
    /// Returns the endpoint's decoded response on success. The first failure
    /// ends the run; it is logged here and handed back to the caller.
    pub async fn run<S, B, E>(&self, event: InboundEvent<S>) -> Result<Value, Failure>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        Error: From<E>,
    {
        let result = self.process(event).await;

        if let Err(ref failure) = result {
            log::error!("Error in email pipeline: {}", failure);
        }

        result
    }

    async fn process<S, B, E>(&self, event: InboundEvent<S>) -> Result<Value, Failure>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        Error: From<E>,
    {
        let raw = drain::drain(event.raw, event.raw_size)
            .await
            .map_err(Failure::at(Stage::Draining))?;

        let email = self
            .parser
            .parse(&raw)
            .map_err(Failure::at(Stage::Parsing))?;

        log::info!("Parsed email: {}", email.summary());

        let url = self
            .config
            .api_url()
            .map_err(Failure::at(Stage::Forwarding))?;

        let resp = self
            .forwarder
            .forward(url, &email)
            .await
            .map_err(Failure::at(Stage::Forwarding))?;

        log::info!("Data posted successfully: {}", resp);

        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;
    use warp::http::StatusCode;

    use crate::email::Email;
    use crate::forward::ForwardFuture;
    use crate::testing::Endpoint;

    const HELLO: &[u8] = b"From: alice@example.com\r\nTo: bob@example.com\r\nSubject: Hello\r\n\r\nHi there";

    fn event(raw: &'static [u8]) -> InboundEvent<impl Stream<Item = io::Result<&'static [u8]>>> {
        // Split into uneven chunks like a socket would
        let (head, tail) = raw.split_at(raw.len() / 3);
        InboundEvent {
            raw: stream::iter(vec![io::Result::Ok(head), Ok(tail)]),
            raw_size: raw.len(),
        }
    }

    struct FailingParser;

    impl Parser for FailingParser {
        fn parse(&self, _raw: &[u8]) -> Result<Email, Error> {
            Err(Error::Parse("unexpected end of headers".to_string()))
        }
    }

    /// Counts calls instead of touching the network
    #[derive(Default)]
    struct CountingForwarder {
        calls: AtomicUsize,
    }

    impl Forwarder for CountingForwarder {
        fn forward<'a>(&'a self, _url: &'a str, _email: &'a Email) -> ForwardFuture<'a, Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Value::Null) })
        }
    }

    #[tokio::test]
    async fn forwards_parsed_email() {
        let endpoint = Endpoint::spawn(StatusCode::OK, r#"{"ok":true}"#);
        let pipeline = Pipeline::from_config(Config::new(format!(" {}\n", endpoint.url))).unwrap();

        let resp = pipeline.run(event(HELLO)).await.unwrap();

        assert_eq!(resp["ok"], true);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);

        let body = requests[0].body_str();
        assert!(body.contains(r#""subject":"Hello""#));
        assert!(body.contains(r#""text":"Hi there""#));
    }

    #[tokio::test]
    async fn parse_failure_skips_forwarding() {
        let pipeline = Pipeline::new(
            Config::new("http://127.0.0.1:9/inbound"),
            FailingParser,
            CountingForwarder::default(),
        );

        let failure = pipeline.run(event(HELLO)).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Parsing);
        assert!(matches!(failure.error, Error::Parse(_)));
        assert_eq!(pipeline.forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_message_skips_forwarding() {
        let pipeline = Pipeline::new(
            Config::new("http://127.0.0.1:9/inbound"),
            MimeParser,
            CountingForwarder::default(),
        );

        let failure = pipeline.run(event(b" Subject: Hello\r\n\r\nHi there")).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Parsing);
        assert!(matches!(failure.error, Error::Parse(_)));
        assert_eq!(pipeline.forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_declaration_fails_draining() {
        let pipeline = Pipeline::new(
            Config::new("http://127.0.0.1:9/inbound"),
            MimeParser,
            CountingForwarder::default(),
        );
        let event = InboundEvent {
            raw: stream::iter(vec![io::Result::Ok(HELLO)]),
            raw_size: usize::MAX,
        };

        let failure = pipeline.run(event).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Draining);
        assert_eq!(failure.error, Error::Allocation { size: usize::MAX });
        assert_eq!(pipeline.forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_url_skips_forwarding() {
        let pipeline = Pipeline::new(Config::new("   "), MimeParser, CountingForwarder::default());

        let failure = pipeline.run(event(HELLO)).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Forwarding);
        assert!(matches!(failure.error, Error::Config(_)));
        assert_eq!(pipeline.forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_stream_skips_parsing() {
        let pipeline = Pipeline::new(
            Config::new("http://127.0.0.1:9/inbound"),
            FailingParser,
            CountingForwarder::default(),
        );
        let event = InboundEvent {
            raw: stream::iter(vec![io::Result::Ok(&HELLO[..10])]),
            raw_size: HELLO.len(),
        };

        let failure = pipeline.run(event).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Draining);
        assert_eq!(
            failure.error,
            Error::DataIntegrity {
                expected: HELLO.len(),
                actual: 10
            }
        );
        assert_eq!(pipeline.forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_fails_after_one_attempt() {
        let endpoint = Endpoint::spawn(StatusCode::INTERNAL_SERVER_ERROR, "");
        let pipeline = Pipeline::from_config(Config::new(endpoint.url.clone())).unwrap();

        let failure = pipeline.run(event(HELLO)).await.unwrap_err();

        assert_eq!(failure.stage, Stage::Forwarding);
        assert!(failure.to_string().contains("Internal Server Error"));
        assert!(failure.error.is_temporary());
        assert_eq!(endpoint.hits(), 1);
    }
}
