use std::time::Duration;

use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::Request;

use crate::application::config::Configuration;
use crate::discovery::SharedDiscoveryService;
use crate::domain::{AgentCapabilities, ErrorKind};
use crate::error::DispatchError;

pub mod proto {
    #![allow(clippy::all)]
    tonic::include_proto!("funnel.agent.v1");
}

use proto::agent_service_client::AgentServiceClient;
use proto::{CancelRequest, PingRequest, TaskOutput, TaskRequest, TaskStatusRequest};

const MAX_MESSAGE_SIZE: usize = 500 * 1024 * 1024;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);
/// Added to the caller-specified `timeout_seconds` so the agent, not the
/// gRPC client, is the one to surface a command timeout.
const TIMEOUT_SLACK_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Shell,
    PowerShell,
    ReadFile,
    WriteFile,
    ListDirectory,
    DotnetCode,
}

impl TaskType {
    fn into_proto(self) -> proto::TaskType {
        match self {
            TaskType::Shell => proto::TaskType::Shell,
            TaskType::PowerShell => proto::TaskType::Powershell,
            TaskType::ReadFile => proto::TaskType::ReadFile,
            TaskType::WriteFile => proto::TaskType::WriteFile,
            TaskType::ListDirectory => proto::TaskType::ListDirectory,
            TaskType::DotnetCode => proto::TaskType::DotnetCode,
        }
    }
}

/// Normalized result of a unary `execute` call.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

fn map_error_code(code: i32) -> Option<ErrorKind> {
    match proto::ErrorCode::try_from(code).unwrap_or(proto::ErrorCode::ErrorCodeNone) {
        proto::ErrorCode::ErrorCodeNone => None,
        proto::ErrorCode::Timeout => Some(ErrorKind::Timeout),
        // The domain error vocabulary has no dedicated "elevation required"
        // kind; permission_denied is the closest existing classification.
        proto::ErrorCode::ElevationRequired => Some(ErrorKind::PermissionDenied),
        proto::ErrorCode::NotFound => Some(ErrorKind::NotFound),
        proto::ErrorCode::PermissionDenied => Some(ErrorKind::PermissionDenied),
        proto::ErrorCode::Internal => Some(ErrorKind::ExecutionError),
        proto::ErrorCode::Cancelled => Some(ErrorKind::ExecutionError),
        proto::ErrorCode::GrpcError => Some(ErrorKind::GrpcError),
    }
}

/// Used by callers that catch `DispatchError::Status`/`Transport` and need
/// to fold it into a `StepResult`'s `error_kind`.
pub fn map_status(status: &tonic::Status) -> ErrorKind {
    use tonic::Code;
    match status.code() {
        Code::DeadlineExceeded => ErrorKind::Timeout,
        Code::PermissionDenied | Code::Unauthenticated => ErrorKind::PermissionDenied,
        Code::NotFound => ErrorKind::NotFound,
        Code::Unavailable | Code::Cancelled => ErrorKind::ConnectionError,
        Code::ResourceExhausted => ErrorKind::ResourceError,
        _ => ErrorKind::GrpcError,
    }
}

/// mTLS-secured channel pool plus the unary/streaming RPC surface the
/// driver and local handlers call into. One channel per `(agent_id, ip,
/// port)`; a channel observed to error is evicted so the next call rebuilds
/// it rather than retrying a dead connection forever.
pub struct AgentDispatcher {
    discovery: SharedDiscoveryService,
    channels: scc::HashMap<(String, String, u16), Channel>,
    cert_path: std::path::PathBuf,
    key_path: std::path::PathBuf,
    ca_cert_path: std::path::PathBuf,
    insecure_allowed: bool,
}

impl AgentDispatcher {
    pub fn new(discovery: SharedDiscoveryService, config: &Configuration) -> Self {
        Self {
            discovery,
            channels: scc::HashMap::new(),
            cert_path: config.cert_path.clone(),
            key_path: config.key_path.clone(),
            ca_cert_path: config.ca_cert_path.clone(),
            insecure_allowed: config.insecure,
        }
    }

    fn has_mtls_material(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists() && self.ca_cert_path.exists()
    }

    /// Consults the Discovery cache; on a miss, forces one fresh discovery
    /// round before giving up.
    async fn resolve(&self, agent_id: &str) -> Result<AgentCapabilities, DispatchError> {
        if let Some(agent) = self.discovery.get_agent(agent_id).await {
            return Ok(agent);
        }
        self.discovery.discover(true).await;
        self.discovery
            .get_agent(agent_id)
            .await
            .ok_or_else(|| DispatchError::AgentNotFound(agent_id.to_owned()))
    }

    async fn build_channel(&self, agent: &AgentCapabilities) -> Result<Channel, DispatchError> {
        let scheme = if self.has_mtls_material() { "https" } else { "http" };
        let uri = format!("{scheme}://{}:{}", agent.ip_address, agent.grpc_port);
        let mut endpoint = Endpoint::from_shared(uri)
            .map_err(|source| DispatchError::Channel {
                agent_id: agent.agent_id.clone(),
                ip: agent.ip_address.clone(),
                port: agent.grpc_port,
                source,
            })?
            .keep_alive_while_idle(true)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT);

        if self.has_mtls_material() {
            let cert = tokio::fs::read(&self.cert_path).await.map_err(|e| DispatchError::Tls(e.to_string()))?;
            let key = tokio::fs::read(&self.key_path).await.map_err(|e| DispatchError::Tls(e.to_string()))?;
            let ca = tokio::fs::read(&self.ca_cert_path).await.map_err(|e| DispatchError::Tls(e.to_string()))?;
            let tls = ClientTlsConfig::new()
                .identity(Identity::from_pem(cert, key))
                .ca_certificate(Certificate::from_pem(ca))
                .domain_name(agent.hostname.clone());
            endpoint = endpoint.tls_config(tls).map_err(|source| DispatchError::Channel {
                agent_id: agent.agent_id.clone(),
                ip: agent.ip_address.clone(),
                port: agent.grpc_port,
                source,
            })?;
        } else if !self.insecure_allowed {
            return Err(DispatchError::Tls("mTLS material missing and insecure mode not enabled".to_owned()));
        } else {
            tracing::warn!(agent_id = %agent.agent_id, "connecting without mTLS; insecure mode enabled");
        }

        endpoint.connect().await.map_err(|source| DispatchError::Channel {
            agent_id: agent.agent_id.clone(),
            ip: agent.ip_address.clone(),
            port: agent.grpc_port,
            source,
        })
    }

    async fn channel_for(&self, agent: &AgentCapabilities) -> Result<Channel, DispatchError> {
        let key = (agent.agent_id.clone(), agent.ip_address.clone(), agent.grpc_port);
        if let Some(entry) = self.channels.get_async(&key).await {
            return Ok(entry.get().clone());
        }
        let channel = self.build_channel(agent).await?;
        let _ = self.channels.insert_async(key, channel.clone()).await;
        Ok(channel)
    }

    async fn evict(&self, agent: &AgentCapabilities) {
        let key = (agent.agent_id.clone(), agent.ip_address.clone(), agent.grpc_port);
        let _ = self.channels.remove_async(&key).await;
    }

    fn client_for(channel: Channel) -> AgentServiceClient<Channel> {
        AgentServiceClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        agent_id: &str,
        task_type: TaskType,
        command: &str,
        timeout_seconds: u32,
        require_elevation: bool,
        working_directory: &str,
        environment: std::collections::HashMap<String, String>,
    ) -> Result<TaskResult, DispatchError> {
        let agent = self.resolve(agent_id).await?;
        let channel = self.channel_for(&agent).await?;
        let mut client = Self::client_for(channel);

        let mut request = Request::new(TaskRequest {
            task_id: uuid::Uuid::new_v4().to_string(),
            r#type: task_type.into_proto() as i32,
            command: command.to_owned(),
            timeout_seconds,
            require_elevation,
            working_directory: working_directory.to_owned(),
            environment,
        });
        request.set_timeout(Duration::from_secs(timeout_seconds as u64 + TIMEOUT_SLACK_SECS));

        match client.execute(request).await {
            Ok(response) => {
                let body = response.into_inner();
                Ok(TaskResult {
                    task_id: body.task_id,
                    success: body.success,
                    stdout: body.stdout,
                    stderr: body.stderr,
                    exit_code: body.exit_code,
                    error_kind: map_error_code(body.error_code),
                    duration_ms: body.duration_ms,
                })
            }
            Err(status) => {
                self.evict(&agent).await;
                Err(DispatchError::Status(status))
            }
        }
    }

    /// Server-streaming variant; transport/status errors surface as one
    /// final `TaskOutput{output_type=error}` on the returned stream rather
    /// than propagating, per the dispatcher's streaming-error contract.
    pub async fn execute_streaming(
        &self,
        agent_id: &str,
        task_type: TaskType,
        command: &str,
        timeout_seconds: u32,
        require_elevation: bool,
        working_directory: &str,
        environment: std::collections::HashMap<String, String>,
    ) -> Result<tonic::Streaming<TaskOutput>, DispatchError> {
        let agent = self.resolve(agent_id).await?;
        let channel = self.channel_for(&agent).await?;
        let mut client = Self::client_for(channel);

        let mut request = Request::new(TaskRequest {
            task_id: uuid::Uuid::new_v4().to_string(),
            r#type: task_type.into_proto() as i32,
            command: command.to_owned(),
            timeout_seconds,
            require_elevation,
            working_directory: working_directory.to_owned(),
            environment,
        });
        request.set_timeout(Duration::from_secs(timeout_seconds as u64 + TIMEOUT_SLACK_SECS));

        match client.execute_streaming(request).await {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                self.evict(&agent).await;
                Err(DispatchError::Status(status))
            }
        }
    }

    pub async fn ping(&self, agent_id: &str) -> Result<bool, DispatchError> {
        let agent = self.resolve(agent_id).await?;
        let channel = self.channel_for(&agent).await?;
        let mut client = Self::client_for(channel);
        let mut request = Request::new(PingRequest { agent_id: agent_id.to_owned() });
        request.set_timeout(Duration::from_secs(5));
        match client.ping(request).await {
            Ok(response) => Ok(response.into_inner().ok),
            Err(status) => {
                self.evict(&agent).await;
                Err(DispatchError::Status(status))
            }
        }
    }

    pub async fn get_status(&self, agent_id: &str, task_id: &str) -> Result<(bool, bool), DispatchError> {
        let agent = self.resolve(agent_id).await?;
        let channel = self.channel_for(&agent).await?;
        let mut client = Self::client_for(channel);
        let response = client
            .get_status(Request::new(TaskStatusRequest { task_id: task_id.to_owned() }))
            .await
            .map_err(DispatchError::Status)?;
        let body = response.into_inner();
        Ok((body.running, body.found))
    }

    pub async fn cancel(&self, agent_id: &str, task_id: &str) -> Result<bool, DispatchError> {
        let agent = self.resolve(agent_id).await?;
        let channel = self.channel_for(&agent).await?;
        let mut client = Self::client_for(channel);
        let response = client
            .cancel(Request::new(CancelRequest { task_id: task_id.to_owned() }))
            .await
            .map_err(DispatchError::Status)?;
        Ok(response.into_inner().cancelled)
    }

    /// Drops every pooled channel; new calls rebuild lazily on next use.
    pub async fn close(&self) {
        self.channels.clear_async().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_error_codes() {
        assert_eq!(map_error_code(proto::ErrorCode::Timeout as i32), Some(ErrorKind::Timeout));
        assert_eq!(map_error_code(proto::ErrorCode::ErrorCodeNone as i32), None);
        assert_eq!(map_error_code(proto::ErrorCode::ElevationRequired as i32), Some(ErrorKind::PermissionDenied));
    }

    #[test]
    fn maps_grpc_status_codes() {
        assert_eq!(map_status(&tonic::Status::deadline_exceeded("x")), ErrorKind::Timeout);
        assert_eq!(map_status(&tonic::Status::unavailable("x")), ErrorKind::ConnectionError);
        assert_eq!(map_status(&tonic::Status::not_found("x")), ErrorKind::NotFound);
    }
}
