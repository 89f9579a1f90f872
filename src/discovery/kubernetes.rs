//! Pod discovery through the Kubernetes core v1 API.
//!
//! # Responsibilities
//! - Locate the API server (explicit URL, in-cluster service env, then kubeconfig)
//! - List pods matching the pool's label selector
//! - Reduce the pod list to serving endpoints
//!
//! # Design Decisions
//! - Plain REST over `reqwest`; only the pod fields we read are modelled
//! - Token files are re-read on every refresh (service account tokens rotate)
//! - Matching keeps API order so the round-robin order is stable between refreshes

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::DiscoveryConfig;
use crate::discovery::{kubeconfig, DiscoveryError, EndpointSource};
use crate::load_balancer::Endpoint;

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";
const RUNNING_PHASE: &str = "Running";

/// Subset of a core v1 `PodList`.
#[derive(Debug, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMetadata,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodMetadata {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContainerPort {
    pub name: Option<String>,
    #[serde(rename = "containerPort")]
    pub container_port: u16,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodStatus {
    pub phase: Option<String>,
    #[serde(rename = "podIP")]
    pub pod_ip: Option<String>,
}

/// Reduce a pod list to endpoints.
///
/// A pod contributes only when it is `Running` with a non-empty pod IP. Each
/// container port named `port_name`, or numbered `service_port`, yields one
/// `podIP:containerPort` endpoint.
pub fn endpoints_from_pods(pods: &PodList, port_name: &str, service_port: u16) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();

    for pod in &pods.items {
        let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
        if pod.status.phase.as_deref() != Some(RUNNING_PHASE) {
            tracing::trace!(pod = name, phase = ?pod.status.phase, "Skipping pod that is not running");
            continue;
        }
        let pod_ip = match pod.status.pod_ip.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => {
                tracing::trace!(pod = name, "Skipping running pod without an IP");
                continue;
            }
        };

        for container in &pod.spec.containers {
            for port in &container.ports {
                if port.name.as_deref() == Some(port_name) || port.container_port == service_port {
                    endpoints.push(Endpoint::new(pod_ip, port.container_port));
                }
            }
        }
    }

    endpoints
}

/// How requests to the API server authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    /// Bearer token read from a file on every request.
    TokenFile(PathBuf),
    /// Bearer token taken verbatim from a kubeconfig.
    Token(String),
}

/// A resolved API server location with its TLS material and credentials.
#[derive(Debug, Clone)]
pub struct ApiAccess {
    pub base: Url,
    /// Extra root certificate (PEM) trusted for the API server.
    pub ca_pem: Option<Vec<u8>>,
    pub insecure_skip_verify: bool,
    /// Client certificate followed by its private key (PEM).
    pub identity_pem: Option<Vec<u8>>,
    pub credentials: Credentials,
}

impl ApiAccess {
    /// Locate the API server, first match wins:
    /// 1. `discovery.api_server`
    /// 2. `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` over https
    /// 3. the kubeconfig at `$KUBECONFIG` or `$HOME/.kube/config`
    ///
    /// `lookup` reads environment variables.
    pub fn resolve<F>(config: &DiscoveryConfig, lookup: F) -> Result<Self, DiscoveryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = &config.api_server {
            let base = Url::parse(url)?;
            let ca_pem = if base.scheme() == "https" {
                read_cluster_ca(&config.ca_cert_path)
            } else {
                None
            };
            return Ok(Self {
                base,
                ca_pem,
                insecure_skip_verify: false,
                identity_pem: None,
                credentials: Credentials::TokenFile(PathBuf::from(&config.token_path)),
            });
        }

        if let Some(host) = lookup(SERVICE_HOST_ENV).filter(|h| !h.is_empty()) {
            let port = lookup(SERVICE_PORT_ENV).unwrap_or_else(|| "443".to_string());
            return Ok(Self {
                base: in_cluster_base_url(&host, &port)?,
                ca_pem: read_cluster_ca(&config.ca_cert_path),
                insecure_skip_verify: false,
                identity_pem: None,
                credentials: Credentials::TokenFile(PathBuf::from(&config.token_path)),
            });
        }

        match kubeconfig::default_path(&lookup) {
            Some(path) if path.is_file() => {
                tracing::info!(path = %path.display(), "Not in a cluster, using kubeconfig");
                kubeconfig::load(&path)
            }
            Some(path) => Err(DiscoveryError::Environment(format!(
                "{} is not set and no kubeconfig exists at {}; configure discovery.api_server or use local mode",
                SERVICE_HOST_ENV,
                path.display()
            ))),
            None => Err(DiscoveryError::Environment(format!(
                "{} is not set and no kubeconfig location is known; configure discovery.api_server or use local mode",
                SERVICE_HOST_ENV
            ))),
        }
    }
}

/// Endpoint source backed by the Kubernetes API.
#[derive(Debug)]
pub struct KubernetesSource {
    client: reqwest::Client,
    pods_url: Url,
    credentials: Credentials,
    port_name: String,
    service_port: u16,
}

impl KubernetesSource {
    /// Build a source from discovery configuration and the process environment.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let access = ApiAccess::resolve(config, |key| std::env::var(key).ok())?;
        Self::from_access(access, config)
    }

    /// Build a source against an already resolved API location.
    pub fn from_access(access: ApiAccess, config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let client_error = |e: reqwest::Error| DiscoveryError::Client(e.to_string());

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.request_timeout_secs));

        if let Some(pem) = &access.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem).map_err(client_error)?);
        }
        if let Some(pem) = &access.identity_pem {
            builder = builder.identity(reqwest::Identity::from_pem(pem).map_err(client_error)?);
        }
        if access.insecure_skip_verify {
            tracing::warn!(server = %access.base, "TLS verification disabled for the Kubernetes API");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(client_error)?;

        Ok(Self {
            client,
            pods_url: pods_url(&access.base, config.namespace.as_deref(), &config.label_selector)?,
            credentials: access.credentials,
            port_name: config.port_name.clone(),
            service_port: config.service_port,
        })
    }

    /// URL queried on every refresh.
    pub fn pods_url(&self) -> &Url {
        &self.pods_url
    }

    async fn bearer_token(&self) -> Result<Option<String>, DiscoveryError> {
        let path = match &self.credentials {
            Credentials::None => return Ok(None),
            Credentials::Token(token) => return Ok(Some(token.clone())),
            Credentials::TokenFile(path) => path,
        };

        match tokio::fs::read_to_string(path).await {
            Ok(token) => {
                let token = token.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DiscoveryError::Credentials {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl EndpointSource for KubernetesSource {
    async fn discover(&self) -> Result<Vec<Endpoint>, DiscoveryError> {
        let mut request = self.client.get(self.pods_url.clone());
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let pods: PodList = response.json().await?;
        let endpoints = endpoints_from_pods(&pods, &self.port_name, self.service_port);

        tracing::debug!(
            pods = ?pods.items.iter().filter_map(|p| p.metadata.name.as_deref()).collect::<Vec<_>>(),
            endpoints = endpoints.len(),
            "Pod list fetched"
        );

        Ok(endpoints)
    }

    fn describe(&self) -> String {
        format!("kubernetes pods at {}", self.pods_url)
    }
}

fn read_cluster_ca(path: impl AsRef<Path>) -> Option<Vec<u8>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(pem) => Some(pem),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Cluster CA not readable, using system roots"
            );
            None
        }
    }
}

fn in_cluster_base_url(host: &str, port: &str) -> Result<Url, DiscoveryError> {
    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    Ok(Url::parse(&format!("https://{}:{}", host, port))?)
}

fn pods_url(base: &Url, namespace: Option<&str>, selector: &str) -> Result<Url, DiscoveryError> {
    let path = match namespace {
        Some(ns) => format!("api/v1/namespaces/{}/pods", ns),
        None => "api/v1/pods".to_string(),
    };

    // keep any path prefix on the base (e.g. an apiserver behind a proxy path)
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    let mut url = base.join(&path)?;
    url.query_pairs_mut().append_pair("labelSelector", selector);
    Ok(url)
}
