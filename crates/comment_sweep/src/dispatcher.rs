use std::sync::Once;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use leaky_bucket::RateLimiter;
use reqwest::{Url, header};
use serde_json::{Map, Value};

use crate::config::RateLimit;
use crate::error::{DispatchError, DispatchOutcome};

/// 将单个视频交给远端处理，所有错误都需要被转换为失败结果，不允许向外传递
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, video_id: &str) -> DispatchOutcome;
}

// 一个对 reqwest::Client 的简单封装，附带默认 header 与超时设置
#[derive(Clone)]
pub struct Client(reqwest::Client);

impl Client {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            // 其他地方已经安装过 provider 时忽略即可
            let _ = rustls::crypto::ring::default_provider().install_default();
        });
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        );
        Ok(Self(
            reqwest::Client::builder()
                .default_headers(headers)
                .gzip(true)
                .connect_timeout(Duration::from_secs(10))
                .timeout(request_timeout)
                .build()
                .context("failed to build reqwest client")?,
        ))
    }
}

pub struct EndpointOption {
    pub endpoint: String,
    pub token: String,
    pub item_key: String,
    pub request_timeout: Duration,
    pub rate_limit: Option<RateLimit>,
}

/// 以 POST { "<item_key>": "<video_id>" } 的形式调用远端接口，2xx 视为成功
pub struct EndpointDispatcher {
    client: Client,
    endpoint: Url,
    token: String,
    item_key: String,
    limiter: Option<RateLimiter>,
}

impl EndpointDispatcher {
    pub fn new(option: EndpointOption) -> Result<Self> {
        let endpoint = Url::parse(&option.endpoint).with_context(|| format!("invalid endpoint {}", option.endpoint))?;
        Ok(Self {
            client: Client::new(option.request_timeout)?,
            endpoint,
            token: option.token,
            item_key: option.item_key,
            limiter: option.rate_limit.as_ref().map(RateLimit::build),
        })
    }

    async fn send(&self, video_id: &str) -> Result<()> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire_one().await;
        }
        let mut body = Map::new();
        body.insert(self.item_key.clone(), Value::String(video_id.to_owned()));
        let response = self
            .client
            .0
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(DispatchError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.chars().count() > 200 {
                body = body.chars().take(200).collect::<String>() + "...";
            }
            bail!(DispatchError::UnexpectedStatus { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Dispatch for EndpointDispatcher {
    async fn dispatch(&self, video_id: &str) -> DispatchOutcome {
        self.send(video_id).await.into()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;

    use super::*;

    async fn handler(headers: HeaderMap, Json(body): Json<Value>) -> StatusCode {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return StatusCode::UNAUTHORIZED;
        }
        match body["videoId"].as_str() {
            Some(id) if id.starts_with("ok") => StatusCode::OK,
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            None => StatusCode::BAD_REQUEST,
        }
    }

    async fn slow_handler() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn serve() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/parse", post(handler))
            .route("/slow", post(slow_handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn build_dispatcher(endpoint: String, token: &str) -> EndpointDispatcher {
        build_dispatcher_with_timeout(endpoint, token, Duration::from_secs(5))
    }

    fn build_dispatcher_with_timeout(endpoint: String, token: &str, request_timeout: Duration) -> EndpointDispatcher {
        EndpointDispatcher::new(EndpointOption {
            endpoint,
            token: token.to_owned(),
            item_key: "videoId".to_owned(),
            request_timeout,
            rate_limit: Some(RateLimit { limit: 4, duration: 250 }),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_dispatch() {
        let addr = serve().await;
        let dispatcher = build_dispatcher(format!("http://{}/parse", addr), "secret");
        assert_eq!(dispatcher.dispatch("ok-1").await, DispatchOutcome::Succeeded);
        let DispatchOutcome::Failed(reason) = dispatcher.dispatch("broken").await else {
            panic!("expected a failed outcome");
        };
        assert!(reason.contains("500"), "{reason}");
        let unauthorized = build_dispatcher(format!("http://{}/parse", addr), "wrong");
        let DispatchOutcome::Failed(reason) = unauthorized.dispatch("ok-1").await else {
            panic!("expected a failed outcome");
        };
        assert!(reason.contains("401"), "{reason}");
    }

    #[tokio::test]
    async fn test_endpoint_unreachable() {
        // 先占用一个端口再释放，保证没有服务在监听
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dispatcher = build_dispatcher(format!("http://{}/parse", addr), "secret");
        let outcome = dispatcher.dispatch("ok-1").await;
        assert!(matches!(outcome, DispatchOutcome::Failed(reason) if !reason.is_empty()));
    }

    #[tokio::test]
    async fn test_endpoint_timeout() {
        let addr = serve().await;
        let dispatcher =
            build_dispatcher_with_timeout(format!("http://{}/slow", addr), "secret", Duration::from_millis(200));
        let DispatchOutcome::Failed(reason) = dispatcher.dispatch("ok-1").await else {
            panic!("expected a failed outcome");
        };
        assert!(reason.starts_with("request timed out: failed to send request"), "{reason}");
    }
}
