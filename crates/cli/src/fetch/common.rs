//! Shared HTTP plumbing for fetch paths.
//!
//! `FetchClient` owns a blocking client with a minimum inter-request
//! interval; [`FetchClient::download_text`] adds bounded retry with
//! exponential backoff for snapshot downloads, honoring `Retry-After` on
//! 429. Batch callers use the single-shot [`FetchClient::get`] and apply
//! their own retry policy.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use crate::exit_codes::{EXIT_FETCH_RATE_LIMIT, EXIT_FETCH_UPSTREAM};
use crate::CliError;

pub(crate) const MAX_RETRIES: u32 = 3;
const USER_AGENT: &str = concat!("vulnbase/", env!("CARGO_PKG_VERSION"));

pub(crate) struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) struct FetchClient {
    http: reqwest::blocking::Client,
    source_name: String,
    min_interval: Duration,
    last_request: Cell<Option<Instant>>,
}

impl FetchClient {
    pub fn new(source_name: &str, min_interval: Duration) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            source_name: source_name.to_string(),
            min_interval,
            last_request: Cell::new(None),
        }
    }

    /// Single throttled GET. Callers decide what each status means.
    pub fn get(&self, url: &str) -> Result<HttpResponse, CliError> {
        self.throttle();

        let resp = self.http.get(url).send().map_err(|e| CliError {
            code: EXIT_FETCH_UPSTREAM,
            message: format!("{} upstream error: {e}", self.source_name),
            hint: None,
        })?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = resp.text().map_err(|e| CliError {
            code: EXIT_FETCH_UPSTREAM,
            message: format!("failed to read {} response body: {e}", self.source_name),
            hint: None,
        })?;

        Ok(HttpResponse { status, retry_after, body })
    }

    /// GET with retry + exponential backoff. 4xx other than 429 fails
    /// immediately; 429, 5xx and network errors retry up to [`MAX_RETRIES`].
    pub fn download_text(&self, url: &str) -> Result<String, CliError> {
        let mut backoff_secs = 1u64;

        for attempt in 0..=MAX_RETRIES {
            match self.get(url) {
                Ok(resp) if resp.is_success() => {
                    // Strip a BOM before handing to the CSV parser.
                    return Ok(resp.body.trim_start_matches('\u{feff}').to_string());
                }
                Ok(resp) if resp.status == 429 || resp.status >= 500 => {
                    if attempt == MAX_RETRIES {
                        let (code, what) = if resp.status == 429 {
                            (EXIT_FETCH_RATE_LIMIT, "rate limited")
                        } else {
                            (EXIT_FETCH_UPSTREAM, "upstream error")
                        };
                        return Err(CliError {
                            code,
                            message: format!(
                                "{} {} after {} attempts (HTTP {})",
                                self.source_name, what, MAX_RETRIES, resp.status,
                            ),
                            hint: None,
                        });
                    }
                    let wait = if resp.status == 429 {
                        resp.retry_after.unwrap_or(backoff_secs)
                    } else {
                        backoff_secs
                    };
                    eprintln!(
                        "warning: retry {}/{} in {}s (HTTP {})",
                        attempt + 1,
                        MAX_RETRIES,
                        wait,
                        resp.status,
                    );
                    thread::sleep(Duration::from_secs(wait));
                    backoff_secs *= 2;
                }
                Ok(resp) => {
                    return Err(CliError {
                        code: EXIT_FETCH_UPSTREAM,
                        message: format!(
                            "{} error (HTTP {})",
                            self.source_name, resp.status,
                        ),
                        hint: None,
                    });
                }
                Err(err) => {
                    if attempt == MAX_RETRIES {
                        return Err(err);
                    }
                    eprintln!(
                        "warning: retry {}/{} in {}s ({})",
                        attempt + 1,
                        MAX_RETRIES,
                        backoff_secs,
                        err.message,
                    );
                    thread::sleep(Duration::from_secs(backoff_secs));
                    backoff_secs *= 2;
                }
            }
        }

        unreachable!()
    }

    fn throttle(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}
