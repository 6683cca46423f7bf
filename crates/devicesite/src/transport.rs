//! HTTP plumbing between the form and the calculation service.

use std::rc::Rc;

use reqwest::Url;

use crate::credential::Credential;
use crate::recompute::RecomputeError;

/// Outbound side of the recompute protocol.
///
/// Implementations return the raw response body; interpreting it is the
/// caller's job. A non-2xx status is a failure.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// POST `fields` form-encoded, with the credential header attached.
    async fn post_form(
        &self,
        endpoint: &str,
        credential: &Credential,
        fields: &[(String, String)],
    ) -> Result<String, RecomputeError>;

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, RecomputeError>;
}

impl<T: Transport> Transport for Rc<T> {
    async fn post_form(
        &self,
        endpoint: &str,
        credential: &Credential,
        fields: &[(String, String)],
    ) -> Result<String, RecomputeError> {
        (**self).post_form(endpoint, credential, fields).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, RecomputeError> {
        (**self).get(path, query).await
    }
}

/// `reqwest`-backed transport. On wasm32 reqwest goes through `fetch`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    origin: Url,
}

impl HttpTransport {
    /// `origin` is the service root, e.g. `http://localhost:8000`.
    pub fn new(origin: &str) -> Result<Self, RecomputeError> {
        Ok(Self {
            client: reqwest::Client::new(),
            origin: parse_origin(origin)?,
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn with_timeout(origin: &str, timeout: std::time::Duration) -> Result<Self, RecomputeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecomputeError::Network(e.to_string()))?;
        Ok(Self {
            client,
            origin: parse_origin(origin)?,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn resolve(&self, path: &str) -> Result<Url, RecomputeError> {
        self.origin
            .join(path)
            .map_err(|e| RecomputeError::InvalidEndpoint(format!("{path}: {e}")))
    }
}

fn parse_origin(origin: &str) -> Result<Url, RecomputeError> {
    Url::parse(origin).map_err(|e| RecomputeError::InvalidEndpoint(format!("{origin}: {e}")))
}

async fn read_body(response: reqwest::Response) -> Result<String, RecomputeError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| RecomputeError::Network(e.to_string()))?;
    if !status.is_success() {
        return Err(RecomputeError::Status {
            code: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

impl Transport for HttpTransport {
    async fn post_form(
        &self,
        endpoint: &str,
        credential: &Credential,
        fields: &[(String, String)],
    ) -> Result<String, RecomputeError> {
        let url = self.resolve(endpoint)?;
        let response = self
            .client
            .post(url)
            .header(credential.header(), credential.token())
            .form(fields)
            .send()
            .await
            .map_err(|e| RecomputeError::Network(e.to_string()))?;
        read_body(response).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, RecomputeError> {
        let url = self.resolve(path)?;
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RecomputeError::Network(e.to_string()))?;
        read_body(response).await
    }
}
