use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap,
    HeaderName,
    HeaderValue,
    AUTHORIZATION,
    CONTENT_TYPE,
};
use sync_types::{
    PushError,
    PushResponse,
};
use url::Url;

use crate::{
    metrics::{
        dispatch_timer,
        log_dispatch_rejected,
        log_dispatch_transport_error,
    },
    queue::PushEntry,
    state::UserPushParams,
};

static X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Posts one coalesced batch to the application's push endpoint and
/// classifies the reply. No retries at this layer; retriable errors are
/// reported to the client, which resubmits.
#[async_trait]
pub trait PushDispatcher: Send + Sync + 'static {
    async fn dispatch(
        &self,
        entry: &PushEntry,
        user_params: Option<Arc<UserPushParams>>,
    ) -> anyhow::Result<PushResponse>;
}

#[derive(Clone, Debug)]
pub struct PusherConfig {
    /// Default push endpoint, used unless the connection supplied its own.
    pub push_url: String,
    pub app_id: String,
    /// Schema name forwarded to the endpoint as the `schema` query
    /// parameter.
    pub upstream_schema: String,
    pub api_key: Option<String>,
}

pub struct HttpPushDispatcher {
    client: reqwest::Client,
    config: PusherConfig,
}

impl HttpPushDispatcher {
    pub fn new(config: PusherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request_url(&self, user_params: Option<&UserPushParams>) -> anyhow::Result<Url> {
        let base = user_params
            .and_then(|params| params.url.as_deref())
            .unwrap_or(&self.config.push_url);
        let mut url: Url = base.parse().context("Invalid push URL")?;
        for (key, _) in url.query_pairs() {
            if key == "schema" || key == "appID" {
                anyhow::bail!("Push URL already contains reserved query parameter {key}");
            }
        }
        url.query_pairs_mut()
            .append_pair("schema", &self.config.upstream_schema)
            .append_pair("appID", &self.config.app_id);
        Ok(url)
    }

    fn request_headers(
        &self,
        entry: &PushEntry,
        user_params: Option<&UserPushParams>,
    ) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.config.api_key {
            headers.insert(
                X_API_KEY.clone(),
                api_key.parse().context("Invalid api key header value")?,
            );
        }
        if let Some(jwt) = &entry.jwt {
            headers.insert(
                AUTHORIZATION,
                format!("Bearer {}", jwt.as_str())
                    .parse()
                    .context("Invalid bearer token header value")?,
            );
        }
        if let Some(params) = user_params {
            for (key, value) in &params.headers {
                let name = HeaderName::from_bytes(key.as_bytes())
                    .with_context(|| format!("Invalid push header name {key}"))?;
                // Connection-supplied headers must not shadow the system
                // credentials.
                if name == X_API_KEY || name == AUTHORIZATION {
                    tracing::warn!("Ignoring connection header {name} for {}", entry.client_id);
                    continue;
                }
                headers.insert(
                    name,
                    value
                        .parse()
                        .with_context(|| format!("Invalid push header value for {key}"))?,
                );
            }
        }
        Ok(headers)
    }
}

#[async_trait]
impl PushDispatcher for HttpPushDispatcher {
    async fn dispatch(
        &self,
        entry: &PushEntry,
        user_params: Option<Arc<UserPushParams>>,
    ) -> anyhow::Result<PushResponse> {
        let timer = dispatch_timer();
        let user_params = user_params.as_deref();
        let mutation_ids = entry.push.mutation_ids();

        // A request we can't even build is reported like a transport
        // failure: the batch stays unconfirmed and the client retries once
        // the connection's parameters are fixed.
        let request = self.request_url(user_params).and_then(|url| {
            Ok((url, self.request_headers(entry, user_params)?))
        });
        let (url, headers) = match request {
            Ok(request) => request,
            Err(e) => {
                errors::report_error(&e);
                log_dispatch_rejected();
                return Ok(PushResponse::Error(PushError::transport(
                    format!("{e:#}"),
                    mutation_ids,
                )));
            },
        };

        let result = self
            .client
            .post(url)
            .headers(headers)
            .json(&entry.push)
            .send()
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log_dispatch_transport_error();
                return Ok(PushResponse::Error(PushError::transport(
                    e.to_string(),
                    mutation_ids,
                )));
            },
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log_dispatch_transport_error();
                return Ok(PushResponse::Error(PushError::transport(
                    e.to_string(),
                    mutation_ids,
                )));
            },
        };
        if !status.is_success() {
            return Ok(PushResponse::Error(PushError::http(
                status.as_u16(),
                body,
                mutation_ids,
            )));
        }

        // A 2xx body that doesn't parse means we can't know which mutations
        // were applied; raise rather than risk silently corrupting the
        // per-client streams.
        let parsed: PushResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse push endpoint response: {e}");
            anyhow::anyhow!(e).context("Push endpoint returned an unparseable response")
        })?;
        timer.finish();
        Ok(parsed)
    }
}
