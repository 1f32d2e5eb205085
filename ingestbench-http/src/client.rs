use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderName, HeaderValue};
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::util::{has_header, host_header_value};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Sent when the request carries no `Content-Type` of its own.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Pooled HTTP/1.1 client shared by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // An unreachable ingest host must show up as failed requests within
        // seconds, not after the OS connect timeout.
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(connect_timeout);
        connector.set_nodelay(true);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    /// Posts the body and reads the whole response.
    ///
    /// `req.timeout` bounds the full exchange: connect, send, headers and body.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let Some(timeout) = req.timeout else {
            return self.exchange(req).await;
        };
        tokio::time::timeout(timeout, self.exchange(req))
            .await
            .unwrap_or(Err(Error::Timeout(timeout)))
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let request = build_request(req)?;
        let res = self.inner.request(request).await?;

        let (parts, body) = res.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
        })
    }
}

fn build_request(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(req.url));
    }
    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let mut builder = Request::builder().method(http::Method::POST).uri(uri);

    if !has_header(&req.headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        builder = builder.header(HOST, host);
    }
    if !has_header(&req.headers, "content-type") {
        builder = builder.header(CONTENT_TYPE, NDJSON_CONTENT_TYPE);
    }
    builder = builder.header(CONTENT_LENGTH, req.body.len());

    for (k, v) in &req.headers {
        if k.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|_| Error::InvalidHeader { name: k.clone() })?;
        let value =
            HeaderValue::from_str(v).map_err(|_| Error::InvalidHeader { name: k.clone() })?;
        builder = builder.header(name, value);
    }

    Ok(builder.body(Full::new(req.body))?)
}
