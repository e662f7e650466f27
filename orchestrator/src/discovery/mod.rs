use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::domain::AgentCapabilities;

/// UDP magic packet that identifies a discovery probe to remote agents.
const DISCOVERY_MAGIC: &[u8] = b"FUNNEL_DISCOVER";
const BROADCAST_ADDRESS: &str = "255.255.255.255";

/// Finds remote agents by UDP broadcast (and, optionally, a direct probe
/// of a single known host first — the Docker-host-networking case), caches
/// the result for a configurable TTL, and serves lookups against that
/// cache. A failed discovery round degrades to an empty result; it never
/// poisons whatever was already cached.
pub struct DiscoveryService {
    cache: scc::HashMap<String, AgentCapabilities>,
    last_discovery: Mutex<Option<std::time::Instant>>,
    cache_ttl: Duration,
    discovery_port: u16,
    discovery_timeout: Duration,
    /// Known single host to probe directly before broadcasting, e.g.
    /// `host.docker.internal` when the orchestrator itself runs in a
    /// container and broadcast traffic can't reach the host network.
    host_address: Option<String>,
}

impl DiscoveryService {
    pub fn new(discovery_port: u16, discovery_timeout: Duration, cache_ttl: Duration, host_address: Option<String>) -> Self {
        Self {
            cache: scc::HashMap::new(),
            last_discovery: Mutex::new(None),
            cache_ttl,
            discovery_port,
            discovery_timeout,
            host_address: host_address.filter(|s| !s.is_empty()),
        }
    }

    async fn cache_valid(&self) -> bool {
        match *self.last_discovery.lock().await {
            Some(at) => at.elapsed() < self.cache_ttl,
            None => false,
        }
    }

    /// Returns the cached agent list, refreshing it first unless the cache
    /// is still fresh and `force` wasn't asked for.
    pub async fn discover(&self, force: bool) -> Vec<AgentCapabilities> {
        if !force && self.cache_valid().await {
            return self.list_agents_internal().await;
        }

        let mut found = Vec::new();
        if let Some(host) = self.host_address.clone() {
            if let Some(agent) = self.discover_direct(&host).await {
                found.push(agent);
            }
        }
        found.extend(self.discover_broadcast().await);

        self.cache.clear_async().await;
        for agent in found {
            let _ = self.cache.insert_async(agent.agent_id.clone(), agent).await;
        }
        *self.last_discovery.lock().await = Some(std::time::Instant::now());

        self.list_agents_internal().await
    }

    /// Sends the discovery magic to a single resolved host and waits for
    /// one reply. On success, the agent's `ip_address` is stamped with the
    /// original host string (not the resolved IP) — gRPC dials through the
    /// same hostname and lets Docker's DNS route it, which an IP snapshot
    /// would bypass.
    async fn discover_direct(&self, host_address: &str) -> Option<AgentCapabilities> {
        let resolved = tokio::net::lookup_host((host_address, self.discovery_port)).await.ok()?.next()?;

        let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
        socket.send_to(DISCOVERY_MAGIC, resolved).await.ok()?;

        let mut buf = [0u8; 4096];
        let (n, _from) = tokio::time::timeout(self.discovery_timeout, socket.recv_from(&mut buf)).await.ok()?.ok()?;

        let raw = std::str::from_utf8(&buf[..n]).ok()?;
        match AgentCapabilities::from_reply_json(raw, host_address) {
            Ok(agent) => Some(agent),
            Err(source) => {
                tracing::warn!(%source, host_address, "malformed direct discovery reply");
                None
            }
        }
    }

    /// Broadcasts the discovery magic on the LAN and collects every
    /// well-formed reply received before the timeout elapses.
    async fn discover_broadcast(&self) -> Vec<AgentCapabilities> {
        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(s) => s,
            Err(source) => {
                tracing::error!(%source, "failed to bind discovery broadcast socket");
                return Vec::new();
            }
        };
        if let Err(source) = socket.set_broadcast(true) {
            tracing::error!(%source, "failed to enable SO_BROADCAST");
            return Vec::new();
        }
        if let Err(source) = socket.send_to(DISCOVERY_MAGIC, (BROADCAST_ADDRESS, self.discovery_port)).await {
            tracing::error!(%source, "discovery broadcast send failed");
            return Vec::new();
        }

        let mut agents = Vec::new();
        let deadline = tokio::time::Instant::now() + self.discovery_timeout;
        let mut buf = [0u8; 4096];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, from))) => {
                    let Ok(raw) = std::str::from_utf8(&buf[..n]) else {
                        tracing::warn!(%from, "discovery reply was not valid utf-8");
                        continue;
                    };
                    match AgentCapabilities::from_reply_json(raw, &from.ip().to_string()) {
                        Ok(agent) => agents.push(agent),
                        Err(source) => tracing::warn!(%source, %from, "malformed discovery reply"),
                    }
                }
                Ok(Err(source)) => {
                    tracing::debug!(%source, "discovery recv error");
                    continue;
                }
                Err(_timeout) => break,
            }
        }
        agents
    }

    async fn list_agents_internal(&self) -> Vec<AgentCapabilities> {
        let mut out = Vec::new();
        self.cache
            .scan_async(|_, agent| {
                out.push(agent.clone());
            })
            .await;
        out
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<AgentCapabilities> {
        self.cache.get_async(agent_id).await.map(|e| e.get().clone())
    }

    pub async fn get_agents_with_capability(&self, capability: &str) -> Vec<AgentCapabilities> {
        let mut out = Vec::new();
        self.cache
            .scan_async(|_, agent| {
                if agent.capabilities.iter().any(|c| c == capability) {
                    out.push(agent.clone());
                }
            })
            .await;
        out
    }

    /// Matches agents whose advertised workspace roots contain
    /// `workspace_path`, comparing case-insensitively with slashes
    /// normalized so Windows agents compare sanely against POSIX paths.
    pub async fn get_agents_for_workspace(&self, workspace_path: &str) -> Vec<AgentCapabilities> {
        let norm_path = normalize_path(workspace_path);
        let mut out = Vec::new();
        self.cache
            .scan_async(|_, agent| {
                if agent.workspace_roots.iter().any(|root| norm_path.starts_with(&normalize_path(root))) {
                    out.push(agent.clone());
                }
            })
            .await;
        out
    }

    pub async fn mark_agent_stale(&self, agent_id: &str) {
        let _ = self.cache.remove_async(agent_id).await;
    }

    pub async fn invalidate_cache(&self) {
        self.cache.clear_async().await;
        *self.last_discovery.lock().await = None;
    }

    pub async fn list_agents(&self) -> Vec<serde_json::Value> {
        self.list_agents_internal().await.iter().map(AgentCapabilities::to_dict).collect()
    }
}

fn normalize_path(p: &str) -> String {
    p.to_lowercase().replace('\\', "/")
}

pub type SharedDiscoveryService = Arc<DiscoveryService>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_reply(agent_id: &str) -> String {
        format!(
            r#"{{"agentId":"{agent_id}","hostname":"h","platform":"linux","capabilities":["shell"],"workspaceRoots":["/home"],"certificateFingerprint":""}}"#
        )
    }

    #[tokio::test]
    async fn empty_cache_returns_no_agents() {
        let svc = DiscoveryService::new(41234, Duration::from_millis(50), Duration::from_secs(300), None);
        assert!(svc.list_agents_internal().await.is_empty());
    }

    #[tokio::test]
    async fn mark_stale_removes_from_cache() {
        let svc = DiscoveryService::new(41234, Duration::from_millis(50), Duration::from_secs(300), None);
        let agent = AgentCapabilities::from_reply_json(&sample_reply("a1"), "10.0.0.1").unwrap();
        let _ = svc.cache.insert_async(agent.agent_id.clone(), agent).await;
        assert!(svc.get_agent("a1").await.is_some());
        svc.mark_agent_stale("a1").await;
        assert!(svc.get_agent("a1").await.is_none());
    }

    #[tokio::test]
    async fn workspace_match_is_case_and_separator_insensitive() {
        let svc = DiscoveryService::new(41234, Duration::from_millis(50), Duration::from_secs(300), None);
        let agent = AgentCapabilities::from_reply_json(&sample_reply("a1"), "10.0.0.1").unwrap();
        let _ = svc.cache.insert_async(agent.agent_id.clone(), agent).await;
        let matches = svc.get_agents_for_workspace(r"C:\Home\project").await;
        assert!(matches.is_empty());
        let matches = svc.get_agents_for_workspace("/HOME/project").await;
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_cache_clears_agents_and_timestamp() {
        let svc = DiscoveryService::new(41234, Duration::from_millis(50), Duration::from_secs(300), None);
        let agent = AgentCapabilities::from_reply_json(&sample_reply("a1"), "10.0.0.1").unwrap();
        let _ = svc.cache.insert_async(agent.agent_id.clone(), agent).await;
        *svc.last_discovery.lock().await = Some(std::time::Instant::now());
        svc.invalidate_cache().await;
        assert!(svc.list_agents_internal().await.is_empty());
        assert!(!svc.cache_valid().await);
    }
}
