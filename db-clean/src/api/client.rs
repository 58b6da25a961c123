use std::{fmt::Display, time::Duration};

use reqwest::{
    blocking::{Client, RequestBuilder, Response},
    header::{HeaderMap, HeaderValue},
    Method, Url,
};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::drain::Collection;

/// Connection settings for one backend. Certificate checks stay on unless the caller turns
/// them off.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub verify_server_certificate: bool,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            verify_server_certificate: true,
            timeout: None,
        }
    }

    pub fn from_parts(scheme: &str, host: &str, port: u16) -> Result<Self, ClientError> {
        // Bare IPv6 literals need brackets before a port can follow them
        let raw = if host.contains(':') && !host.starts_with('[') {
            format!("{scheme}://[{host}]:{port}/")
        } else {
            format!("{scheme}://{host}:{port}/")
        };
        let endpoint = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{e} {raw}")))?;
        Ok(Self::new(endpoint))
    }
}

pub struct ApiClient {
    config: ClientConfig,
    client: Client,
}

#[derive(Error, Debug)]
pub enum ClientError {
    RequestError(reqwest::Error),
    // All invalid status codes
    ApiError(u16, Box<Url>, String),
    InvalidUrl(String),
    DecodeError {
        url: Box<Url>,
        #[source]
        source: serde_json::Error,
    },
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::RequestError(err) => write!(f, "Request error: {err}"),
            ClientError::InvalidUrl(msg) => {
                write!(f, "Failed to build URL: {msg}")
            }
            ClientError::ApiError(status, url, body) => {
                // The backend wraps failures as {"message": ..., "data": ...}, but a proxy in
                // front of it may not, so fall back to the raw body
                match serde_json::from_str::<ApiErrorResponse>(body) {
                    Ok(api_error) => write!(
                        f,
                        "API error: status='{status}' url='{url}' message='{}'",
                        api_error.message
                    ),
                    Err(_) => write!(
                        f,
                        "API error: status='{status}' url='{url}' message='{body}'",
                    ),
                }
            }
            ClientError::DecodeError { url, .. } => {
                write!(f, "Failed to decode response from '{url}'")
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        ClientError::RequestError(error)
    }
}

#[derive(Deserialize, Debug)]
pub struct ApiErrorResponse {
    message: String,
}

impl ApiClient {
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::build_client(&config)?;
        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &Url {
        &self.config.endpoint
    }

    /// `{endpoint}/api/{collection}`
    pub fn collection_url(&self, collection: Collection) -> Result<Url, ClientError> {
        let endpoint = &self.config.endpoint;
        endpoint
            .join(&format!("api/{collection}"))
            .map_err(|e| ClientError::InvalidUrl(format!("{e} {endpoint}api/{collection}")))
    }

    /// `{endpoint}/api/{collection}/{id}`, with the id as a single path segment.
    pub fn record_url(&self, collection: Collection, id: &str) -> Result<Url, ClientError> {
        let mut url = self.collection_url(collection)?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidUrl(format!("{} cannot take a record id", self.endpoint()))
            })?
            .push(id);
        Ok(url)
    }

    /// Sends the request and fails on any non-2xx status.
    pub fn send_request<F: FnOnce(RequestBuilder) -> RequestBuilder>(
        &self,
        method: Method,
        url: Url,
        builder: F,
    ) -> Result<Response, ClientError> {
        let request = builder(self.create_request(method, url));
        let response = request.send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let box_url = Box::new(response.url().clone());
            let body = response.text()?;
            Err(ClientError::ApiError(status, box_url, body))
        }
    }

    /// Sends the request and hands back the response whatever its status.
    pub fn send_unchecked<F: FnOnce(RequestBuilder) -> RequestBuilder>(
        &self,
        method: Method,
        url: Url,
        builder: F,
    ) -> Result<Response, ClientError> {
        let request = builder(self.create_request(method, url));
        Ok(request.send()?)
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self.send_request(Method::GET, url, |req| req.query(query))?;
        let url = Box::new(response.url().clone());
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|source| ClientError::DecodeError { url, source })
    }

    fn create_request(&self, method: Method, url: Url) -> RequestBuilder {
        let headers = self.build_headers();
        debug!("building request for {method} {url}");
        self.client.request(method, url).headers(headers)
    }

    fn build_client(config: &ClientConfig) -> Result<Client, ClientError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_server_certificate)
            .timeout(config.timeout)
            .build()?;
        Ok(client)
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("User-Agent", HeaderValue::from_static("db-clean"));
        headers
    }
}
