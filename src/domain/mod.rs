use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CNI network configuration as handed to the plugin by the runtime.
///
/// Only the fields the agent looks at are typed; everything else a plugin
/// puts in its configuration is carried through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetConf {
    #[serde(rename = "cniVersion", default, skip_serializing_if = "Option::is_none")]
    pub cni_version: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub plugin_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Opaque container descriptor cached between the ADD phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Every CNI record below is stored and served back as received: optional
// fields keep "absent" distinct from "empty" and unknown keys land in
// `extra`.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Sandbox (container) identifier owning this interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One CNI `Result` document. A container with several networks owns a
/// sequence of these, one per attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceResult {
    #[serde(rename = "cniVersion", default, skip_serializing_if = "Option::is_none")]
    pub cni_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<Interface>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ips: Option<Vec<IpConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<Route>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    EmptyNetworkName,
    MissingSandbox,
    AmbiguousSandbox { first: String, second: String },
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyNetworkName => "network_cannot_create",
            Self::MissingSandbox | Self::AmbiguousSandbox { .. } => {
                "container_interfaces_cannot_create"
            }
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyNetworkName => write!(f, "network configuration lacks a valid name"),
            Self::MissingSandbox => write!(
                f,
                "cannot find a valid container name in the 'sandbox' field"
            ),
            Self::AmbiguousSandbox { first, second } => write!(
                f,
                "only one interface may specify the container name in the 'sandbox' field: {first}, {second}"
            ),
        }
    }
}

impl std::error::Error for DomainError {}

pub fn validate_network_name(conf: &NetConf) -> Result<&str, DomainError> {
    if conf.name.is_empty() {
        return Err(DomainError::EmptyNetworkName);
    }
    Ok(&conf.name)
}

/// Finds the container name a set of interface results belongs to.
///
/// Exactly one interface across all results must carry a non-empty
/// `sandbox`; its value is the key.
pub fn derive_sandbox_key(results: &[InterfaceResult]) -> Result<String, DomainError> {
    let mut found: Option<&str> = None;
    let owners = results
        .iter()
        .flat_map(|result| result.interfaces.iter().flatten())
        .filter_map(|iface| iface.sandbox.as_deref())
        .filter(|sandbox| !sandbox.is_empty());

    for sandbox in owners {
        if let Some(first) = found {
            return Err(DomainError::AmbiguousSandbox {
                first: first.to_string(),
                second: sandbox.to_string(),
            });
        }
        found = Some(sandbox);
    }

    found
        .map(str::to_string)
        .ok_or(DomainError::MissingSandbox)
}
