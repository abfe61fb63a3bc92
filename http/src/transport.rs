//! [`Transport`] over reqwest.

use futures::future::BoxFuture;
use jxn_core::environment::Transport;
use jxn_core::wire::encode_pairs;
use jxn_core::{HttpMethod, TransportError, WireBody, WireRequest, WireResponse};
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client, Method, Url};
use std::time::Duration;

use crate::error::{classify, HttpError};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// HTTP transport
///
/// Relative request URIs are resolved against the base URL. Redirects are
/// *not* followed: the lifecycle sees the 3xx status and navigates itself.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport with default settings
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidBaseUrl` if `base_url` does not parse
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Self::builder(base_url).build()
    }

    /// Start configuring a transport
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder {
            base_url: base_url.into(),
            timeout: None,
            user_agent: None,
        }
    }

    /// The URL relative URIs are resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn exchange(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let url = self
            .base_url
            .join(&request.uri)
            .map_err(|err| TransportError::Protocol(format!("invalid URI {}: {err}", request.uri)))?;
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            WireBody::Empty => builder,
            WireBody::Form(fields) => builder
                .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encode_pairs(&fields)),
            WireBody::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let mut part = Part::bytes(file.bytes).file_name(file.file_name);
                    if let Some(content_type) = file.content_type {
                        part = part
                            .mime_str(&content_type)
                            .map_err(|err| TransportError::Protocol(err.to_string()))?;
                    }
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            },
        };

        let response = builder.send().await.map_err(|err| classify(&err))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|err| classify(&err))?;

        tracing::trace!(status, bytes = body.len(), "HTTP exchange finished");
        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, TransportError>> {
        Box::pin(self.exchange(request))
    }
}

/// Builder for [`HttpTransport`]
#[derive(Debug, Clone)]
pub struct HttpTransportBuilder {
    base_url: String,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl HttpTransportBuilder {
    /// Give up on a request after `timeout`
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send this `User-Agent`
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the transport
    ///
    /// # Errors
    ///
    /// Returns `HttpError::InvalidBaseUrl` for an unparsable base URL and
    /// `HttpError::Build` when the client cannot be created
    pub fn build(self) -> Result<HttpTransport, HttpError> {
        let base_url = Url::parse(&self.base_url).map_err(|err| HttpError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: err.to_string(),
        })?;

        let mut client = Client::builder().redirect(redirect::Policy::none());
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        if let Some(user_agent) = self.user_agent {
            client = client.user_agent(user_agent);
        }
        let client = client.build().map_err(|err| HttpError::Build(err.to_string()))?;

        Ok(HttpTransport { client, base_url })
    }
}
