use thiserror::Error;

/// Errors raised by the discovery service. These never propagate out of
/// `discover()` itself (a failed round degrades to an empty result per
/// the discovery failure semantics) but are surfaced to callers that want
/// to log or distinguish causes.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket: {0}")]
    Socket(#[source] std::io::Error),
    #[error("malformed discovery reply from {addr}: {source}")]
    MalformedReply {
        addr: std::net::SocketAddr,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the gRPC dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("failed to establish channel to {agent_id} at {ip}:{port}: {source}")]
    Channel {
        agent_id: String,
        ip: String,
        port: u16,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("grpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("grpc status error: {0}")]
    Status(#[from] tonic::Status),
    #[error("failed to load mTLS material: {0}")]
    Tls(String),
}

/// Errors raised while parsing an LLM response into a `Step`.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("no balanced JSON object found in response")]
    NoJsonObject,
    #[error("failed to decode JSON step: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("response looked hallucinated: {0}")]
    Hallucination(String),
    #[error("llm client error: {0}")]
    Llm(#[from] llm_client::clients::types::LLMClientError),
}

/// Errors raised by the session registry / session state machinery.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("too many concurrent sessions (limit {0})")]
    TooManySessions(usize),
}

/// Top-level error, composed at the binary/handler boundary.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
