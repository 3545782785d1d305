use metrics::{counter, histogram};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use surge_common::{HttpMethod, RequestResult};
use tokio::time::Instant;
use tracing::debug;

use crate::clock::{duration_ms, RunClock};
use crate::error::Result;

/// Header carrying the virtual user id on every synthetic request
pub const USER_ID_HEADER: &str = "x-surge-user-id";

/// Synthetic POST body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyntheticPayload<'a> {
    user_id: usize,
    request_id: u64,
    timestamp: i64,
    data: &'a str,
}

/// Identifies one attempt within a run
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub user_id: usize,
    pub request_id: u64,
    pub endpoint: &'a str,
}

/// Issues single timed HTTP requests and turns every outcome into a `RequestResult`
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    http_client: Client,
    base_url: String,
    get_probability: f64,
    filler: String,
}

impl RequestExecutor {
    /// Create an executor with its own HTTP client
    pub fn new(
        base_url: &str,
        timeout: Duration,
        get_probability: f64,
        payload_size: Option<usize>,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::with_client(
            http_client,
            base_url,
            get_probability,
            payload_size,
        ))
    }

    /// Create an executor sharing an existing client
    pub fn with_client(
        http_client: Client,
        base_url: &str,
        get_probability: f64,
        payload_size: Option<usize>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            get_probability: get_probability.clamp(0.0, 1.0),
            filler: "x".repeat(payload_size.unwrap_or(0)),
        }
    }

    /// Resolve an endpoint path against the base URL; absolute URLs pass through
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Pick a method with the configured read-heavy bias
    pub fn choose_method(&self) -> HttpMethod {
        if rand::thread_rng().gen_bool(self.get_probability) {
            HttpMethod::Get
        } else {
            HttpMethod::Post
        }
    }

    /// Issue one request with a randomly chosen method
    pub async fn execute(&self, ctx: RequestContext<'_>, clock: &RunClock) -> RequestResult {
        let method = self.choose_method();
        self.execute_with_method(ctx, method, clock).await
    }

    /// Issue one request; transport failures are returned as failed results, never errors
    pub async fn execute_with_method(
        &self,
        ctx: RequestContext<'_>,
        method: HttpMethod,
        clock: &RunClock,
    ) -> RequestResult {
        let url = self.url_for(ctx.endpoint);
        let timestamp = clock.elapsed_ms();

        let request = match method {
            HttpMethod::Get => self.http_client.get(&url),
            HttpMethod::Post => self.http_client.post(&url).json(&SyntheticPayload {
                user_id: ctx.user_id,
                request_id: ctx.request_id,
                timestamp: chrono::Utc::now().timestamp_millis(),
                data: &self.filler,
            }),
        }
        .headers(self.headers_for(ctx.user_id));

        let dispatched = Instant::now();
        let outcome = request.send().await;
        let response_time = duration_ms(dispatched.elapsed());

        counter!("surge_requests_total", 1);
        histogram!("surge_response_time_ms", response_time);

        let mut result = RequestResult {
            user_id: ctx.user_id,
            request_id: ctx.request_id,
            endpoint: ctx.endpoint.to_string(),
            method,
            success: false,
            status_code: None,
            response_time,
            response_size: 0,
            timestamp,
            from_cache: false,
            error: None,
        };

        match outcome {
            Ok(response) => {
                let status = response.status();
                result.success = status.is_success();
                result.status_code = Some(status.as_u16());
                result.from_cache = response.headers().contains_key(CACHE_CONTROL);
                result.response_size = match response.bytes().await {
                    Ok(body) => body.len() as u64,
                    Err(e) => {
                        debug!(url = %url, error = %e, "Failed to read response body");
                        0
                    }
                };

                if !result.success {
                    counter!("surge_requests_failed_total", 1);
                    debug!(
                        user_id = ctx.user_id,
                        url = %url,
                        status = status.as_u16(),
                        "Request returned non-success status"
                    );
                }
            }
            Err(e) => {
                counter!("surge_requests_failed_total", 1);
                debug!(user_id = ctx.user_id, url = %url, error = %e, "Request failed");
                result.error = Some(e.to_string());
            }
        }

        result
    }

    fn headers_for(&self, user_id: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(agent) = HeaderValue::from_str(&format!("surge-virtual-user/{}", user_id)) {
            headers.insert(USER_AGENT, agent);
        }
        headers.insert(USER_ID_HEADER, HeaderValue::from(user_id as u64));
        headers
    }
}
