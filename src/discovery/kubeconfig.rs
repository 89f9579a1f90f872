//! Out-of-cluster API access from a kubeconfig file.
//!
//! Only the current context is used. Supported credentials are bearer tokens
//! (inline or `tokenFile`) and client certificates (inline data or file
//! paths). Relative file paths resolve against the kubeconfig's directory.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Deserialize;
use url::Url;

use crate::discovery::kubernetes::{ApiAccess, Credentials};
use crate::discovery::DiscoveryError;

const KUBECONFIG_ENV: &str = "KUBECONFIG";
const HOME_ENV: &str = "HOME";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    certificate_authority: Option<String>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<String>,
    client_certificate: Option<String>,
    client_certificate_data: Option<String>,
    client_key: Option<String>,
    client_key_data: Option<String>,
    exec: Option<serde_yaml::Value>,
}

/// Kubeconfig location: the first entry of `$KUBECONFIG`, else `$HOME/.kube/config`.
pub fn default_path<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(paths) = lookup(KUBECONFIG_ENV).filter(|v| !v.is_empty()) {
        return std::env::split_paths(&paths).find(|p| !p.as_os_str().is_empty());
    }
    lookup(HOME_ENV)
        .filter(|home| !home.is_empty())
        .map(|home| Path::new(&home).join(".kube").join("config"))
}

/// Read a kubeconfig and resolve its current context.
pub fn load(path: &Path) -> Result<ApiAccess, DiscoveryError> {
    let raw = std::fs::read_to_string(path).map_err(|e| kubeconfig_error(path, e))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve(&raw, dir).map_err(|reason| DiscoveryError::Kubeconfig {
        path: path.display().to_string(),
        reason,
    })
}

fn resolve(raw: &str, dir: &Path) -> Result<ApiAccess, String> {
    let config: Kubeconfig = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;

    let context_name = config
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or("current-context is not set")?;
    let context = &config
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .ok_or_else(|| format!("context '{}' not found", context_name))?
        .context;
    let cluster = &config
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)
        .ok_or_else(|| format!("cluster '{}' not found", context.cluster))?
        .cluster;
    let user = match &context.user {
        Some(name) => Some(
            &config
                .users
                .iter()
                .find(|u| &u.name == name)
                .ok_or_else(|| format!("user '{}' not found", name))?
                .user,
        ),
        None => None,
    };

    let base = Url::parse(&cluster.server).map_err(|e| format!("server '{}': {}", cluster.server, e))?;
    let ca_pem = material(
        dir,
        cluster.certificate_authority_data.as_deref(),
        cluster.certificate_authority.as_deref(),
        "certificate-authority",
    )?;

    let mut credentials = Credentials::None;
    let mut identity_pem = None;
    if let Some(user) = user {
        if let Some(token) = user.token.as_deref().filter(|t| !t.is_empty()) {
            credentials = Credentials::Token(token.to_string());
        } else if let Some(file) = &user.token_file {
            credentials = Credentials::TokenFile(relative_to(dir, file));
        }

        let cert = material(
            dir,
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            "client-certificate",
        )?;
        let key = material(
            dir,
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            "client-key",
        )?;
        identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                cert.push(b'\n');
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => return Err("client certificate and key must be set together".to_string()),
        };

        if user.exec.is_some() && credentials == Credentials::None && identity_pem.is_none() {
            tracing::warn!(
                context = context_name,
                "exec credential plugins are not supported; requests go out unauthenticated"
            );
        }
    }

    Ok(ApiAccess {
        base,
        ca_pem,
        insecure_skip_verify: cluster.insecure_skip_tls_verify,
        identity_pem,
        credentials,
    })
}

/// Inline base64 data wins over a file path.
fn material(
    dir: &Path,
    data: Option<&str>,
    file: Option<&str>,
    field: &str,
) -> Result<Option<Vec<u8>>, String> {
    if let Some(data) = data.filter(|d| !d.is_empty()) {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| format!("{}-data: {}", field, e))?;
        return Ok(Some(decoded));
    }
    match file.filter(|f| !f.is_empty()) {
        Some(file) => {
            let path = relative_to(dir, file);
            std::fs::read(&path)
                .map(Some)
                .map_err(|e| format!("{} {}: {}", field, path.display(), e))
        }
        None => Ok(None),
    }
}

fn relative_to(dir: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

fn kubeconfig_error(path: &Path, e: std::io::Error) -> DiscoveryError {
    DiscoveryError::Kubeconfig {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
