//! Blocking HTTP fetcher with bounded retry on connection-level failures.
use std::{thread, time::Duration};

use reqwest::blocking::{Client, Response};
use tracing::warn;

use crate::{
    constants::{HTTP_ATTEMPTS, HTTP_RETRY_DELAY},
    error::SetupError,
};

/// HTTP client wrapper owning the retry policy for manifest and artifact
/// fetches.
///
/// Only connection-level failures are retried; HTTP error statuses are
/// returned to the caller, which decides whether they are fatal.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    attempts: usize,
    retry_delay: Duration,
}

impl HttpFetcher {
    /// Builds a fetcher with the given request timeout and the default retry
    /// policy.
    pub fn new(timeout: Duration) -> Result<Self, SetupError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            attempts: HTTP_ATTEMPTS,
            retry_delay: HTTP_RETRY_DELAY,
        })
    }

    /// Overrides the connection-retry policy.
    pub fn with_retry_policy(mut self, attempts: usize, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Performs a GET request, retrying connection failures up to the attempt
    /// budget with a fixed delay.
    pub fn get(&self, url: &str) -> Result<Response, SetupError> {
        for attempt in 1..self.attempts {
            match self.client.get(url).send() {
                Ok(response) => return Ok(response),
                Err(err) if is_connection_error(&err) => {
                    warn!(url, attempt, attempts = self.attempts, "connection failed: {err}");
                    thread::sleep(self.retry_delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.client.get(url).send().map_err(Into::into)
    }

    /// Performs a GET request and treats any non-success status as an error.
    pub fn get_ok(&self, url: &str) -> Result<Response, SetupError> {
        let response = self.get(url)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SetupError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn is_connection_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
        time::Instant,
    };

    use super::*;

    fn fetcher(attempts: usize, delay_ms: u64) -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(2))
            .unwrap()
            .with_retry_policy(attempts, Duration::from_millis(delay_ms))
    }

    #[test]
    fn connection_refused_exhausts_the_attempt_budget() {
        let started = Instant::now();
        // Port 1 is never listening; each attempt fails at connect time.
        let result = fetcher(3, 50).get("http://127.0.0.1:1/");

        assert!(matches!(result, Err(SetupError::Http(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn non_success_status_is_returned_not_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                .unwrap();
        });

        let url = format!("http://{addr}/missing");
        let result = fetcher(3, 10).get_ok(&url);
        server.join().unwrap();

        match result {
            Err(SetupError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn success_status_passes_through_get_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok")
                .unwrap();
        });

        let url = format!("http://{addr}/");
        let response = fetcher(2, 10).get_ok(&url).unwrap();
        server.join().unwrap();

        assert_eq!(response.text().unwrap(), "ok");
    }
}
