use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capabilities advertised by a remote agent, learned via UDP discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub agent_id: String,
    pub hostname: String,
    /// "windows" | "linux" | "macos"
    pub platform: String,
    pub capabilities: Vec<String>,
    pub workspace_roots: Vec<String>,
    pub certificate_fingerprint: String,
    pub discovery_port: u16,
    pub grpc_port: u16,
    #[serde(default)]
    pub ip_address: String,
    pub last_seen: DateTime<Utc>,
}

/// The wire shape of a discovery reply: camelCase keys with snake_case
/// accepted as aliases, per the external interface contract.
#[derive(Debug, Deserialize)]
struct DiscoveryReplyWire {
    #[serde(rename = "agentId", alias = "agent_id")]
    agent_id: Option<String>,
    hostname: Option<String>,
    platform: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(rename = "workspaceRoots", alias = "workspace_roots", default)]
    workspace_roots: Vec<String>,
    #[serde(rename = "certificateFingerprint", alias = "certificate_fingerprint", default)]
    certificate_fingerprint: String,
    #[serde(rename = "discoveryPort", alias = "discovery_port")]
    discovery_port: Option<u16>,
    #[serde(rename = "grpcPort", alias = "grpc_port")]
    grpc_port: Option<u16>,
}

impl AgentCapabilities {
    pub const DEFAULT_DISCOVERY_PORT: u16 = 41234;
    pub const DEFAULT_GRPC_PORT: u16 = 41235;

    /// Parses a JSON discovery reply, accepting both camelCase and
    /// snake_case field names, and stamping the supplied source address
    /// (or, for a direct Docker-host probe, the original host string —
    /// see the discovery algorithm's note on address precedence).
    pub fn from_reply_json(raw: &str, ip_address: &str) -> Result<Self, serde_json::Error> {
        let wire: DiscoveryReplyWire = serde_json::from_str(raw)?;
        Ok(Self {
            agent_id: wire.agent_id.unwrap_or_else(|| "unknown".to_owned()),
            hostname: wire.hostname.unwrap_or_else(|| "unknown".to_owned()),
            platform: wire.platform.unwrap_or_else(|| "unknown".to_owned()),
            capabilities: wire.capabilities,
            workspace_roots: wire.workspace_roots,
            certificate_fingerprint: wire.certificate_fingerprint,
            discovery_port: wire.discovery_port.unwrap_or(Self::DEFAULT_DISCOVERY_PORT),
            grpc_port: wire.grpc_port.unwrap_or(Self::DEFAULT_GRPC_PORT),
            ip_address: ip_address.to_owned(),
            last_seen: Utc::now(),
        })
    }

    /// Structured projection used by the `list_agents` tool handler and
    /// any status endpoint; the `to_dict . from_dict` round trip is the
    /// identity modulo `last_seen`.
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "agent_id": self.agent_id,
            "hostname": self.hostname,
            "platform": self.platform,
            "capabilities": self.capabilities,
            "workspace_roots": self.workspace_roots,
            "certificate_fingerprint": self.certificate_fingerprint,
            "discovery_port": self.discovery_port,
            "grpc_port": self.grpc_port,
            "ip_address": self.ip_address,
            "last_seen": self.last_seen.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_camel_case_reply() {
        let raw = r#"{"agentId":"ians-r16","hostname":"ians-r16","platform":"windows","capabilities":["powershell"],"workspaceRoots":["C:\\Users"],"certificateFingerprint":"ab:cd"}"#;
        let cap = AgentCapabilities::from_reply_json(raw, "10.0.0.5").unwrap();
        assert_eq!(cap.agent_id, "ians-r16");
        assert_eq!(cap.ip_address, "10.0.0.5");
        assert_eq!(cap.discovery_port, AgentCapabilities::DEFAULT_DISCOVERY_PORT);
    }

    #[test]
    fn accepts_snake_case_reply() {
        let raw = r#"{"agent_id":"domain02","hostname":"domain02","platform":"linux","capabilities":["shell"],"workspace_roots":[],"certificate_fingerprint":""}"#;
        let cap = AgentCapabilities::from_reply_json(raw, "10.0.0.6").unwrap();
        assert_eq!(cap.agent_id, "domain02");
    }

    #[test]
    fn to_dict_round_trips_modulo_last_seen() {
        let raw = r#"{"agentId":"a1","hostname":"h1","platform":"linux","capabilities":[],"workspaceRoots":[],"certificateFingerprint":""}"#;
        let cap = AgentCapabilities::from_reply_json(raw, "1.2.3.4").unwrap();
        let dict = cap.to_dict();
        assert_eq!(dict["agent_id"], "a1");
        assert_eq!(dict["ip_address"], "1.2.3.4");
    }
}
