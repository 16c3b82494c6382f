//! HTTP client used by the plugin's ADD and DEL phases to reach the agent.

use reqwest::{Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    domain::{Container, InterfaceResult, NetConf},
    http::{CONTAINERS_PATH, ErrorBody, HealthResponse, INTERFACES_PATH, NETWORK_CONFIGS_PATH},
};

#[derive(Debug)]
pub enum ClientError {
    InvalidBaseUrl(String),
    Http(reqwest::Error),
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::InvalidBaseUrl(_) => None,
            Self::Http(e) => e.status(),
            Self::Api { status, .. } => Some(*status),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(base) => write!(f, "invalid agent base url: {base}"),
            Self::Http(e) => write!(f, "http error: {e}"),
            Self::Api {
                status,
                code,
                message,
            } => write!(f, "agent returned {status} ({code}): {message}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::InvalidBaseUrl(_) | Self::Api { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Clone)]
pub struct AgentClient {
    base: Url,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("cni-agent-client/{}", crate::version::VERSION))
            .build()?;
        Self::with_client(base, client)
    }

    /// Uses a caller-built client, e.g. one configured with the agent's CA.
    pub fn with_client(base: &str, client: reqwest::Client) -> Result<Self, ClientError> {
        let base = Url::parse(base).map_err(|e| ClientError::InvalidBaseUrl(format!("{base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base.to_string()));
        }
        Ok(Self { base, client })
    }

    /// Appends path segments to the base URL; each segment is
    /// percent-encoded, so names may contain `/`, `?` or `#`.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn collection(path: &str) -> &str {
        path.trim_start_matches('/')
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut req = self.client.request(method, self.url(segments)?);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let text = resp.text().await?;
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(ClientError::Api {
                status,
                code: body.code,
                message: body.message,
            }),
            Err(_) => Err(ClientError::Api {
                status,
                code: "unknown".to_string(),
                message: text,
            }),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        Ok(self
            .send::<()>(Method::GET, segments, None)
            .await?
            .json::<T>()
            .await?)
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<(), ClientError> {
        self.send(method, segments, body).await.map(|_| ())
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.fetch(&["health"]).await
    }

    pub async fn create_network(&self, netconf: &NetConf) -> Result<(), ClientError> {
        let networks = Self::collection(NETWORK_CONFIGS_PATH);
        self.execute(Method::POST, &[networks], Some(netconf)).await
    }

    pub async fn list_networks(&self) -> Result<Vec<NetConf>, ClientError> {
        self.fetch(&[Self::collection(NETWORK_CONFIGS_PATH)]).await
    }

    pub async fn get_network(&self, name: &str) -> Result<NetConf, ClientError> {
        self.fetch(&[Self::collection(NETWORK_CONFIGS_PATH), name])
            .await
    }

    pub async fn delete_network(&self, name: &str) -> Result<(), ClientError> {
        let networks = Self::collection(NETWORK_CONFIGS_PATH);
        self.execute::<()>(Method::DELETE, &[networks, name], None)
            .await
    }

    pub async fn put_container(&self, name: &str, container: &Container) -> Result<(), ClientError> {
        let containers = Self::collection(CONTAINERS_PATH);
        self.execute(Method::PUT, &[containers, name], Some(container))
            .await
    }

    pub async fn list_containers(&self) -> Result<Vec<Container>, ClientError> {
        self.fetch(&[Self::collection(CONTAINERS_PATH)]).await
    }

    pub async fn get_container(&self, name: &str) -> Result<Container, ClientError> {
        self.fetch(&[Self::collection(CONTAINERS_PATH), name]).await
    }

    pub async fn delete_container(&self, name: &str) -> Result<(), ClientError> {
        let containers = Self::collection(CONTAINERS_PATH);
        self.execute::<()>(Method::DELETE, &[containers, name], None)
            .await
    }

    /// Registers interfaces under the name carried by their `sandbox` field.
    pub async fn create_interfaces(&self, results: &[InterfaceResult]) -> Result<(), ClientError> {
        let interfaces = Self::collection(INTERFACES_PATH);
        self.execute(Method::POST, &[interfaces], Some(results))
            .await
    }

    pub async fn put_interfaces(
        &self,
        name: &str,
        results: &[InterfaceResult],
    ) -> Result<(), ClientError> {
        let interfaces = Self::collection(INTERFACES_PATH);
        self.execute(Method::PUT, &[interfaces, name], Some(results))
            .await
    }

    pub async fn list_interfaces(&self) -> Result<Vec<Vec<InterfaceResult>>, ClientError> {
        self.fetch(&[Self::collection(INTERFACES_PATH)]).await
    }

    pub async fn get_interfaces(&self, name: &str) -> Result<Vec<InterfaceResult>, ClientError> {
        self.fetch(&[Self::collection(INTERFACES_PATH), name]).await
    }

    pub async fn delete_interfaces(&self, name: &str) -> Result<(), ClientError> {
        let interfaces = Self::collection(INTERFACES_PATH);
        self.execute::<()>(Method::DELETE, &[interfaces, name], None)
            .await
    }
}
