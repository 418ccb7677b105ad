use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no reply received for configuration write within timeout")]
    NoReply,

    #[error("no reply received, but a subsequent refresh shows the write was applied")]
    NoReplyButApplied,

    #[error("REQCONFIGALL incomplete: expected {expected} channels, received {received}")]
    IncompleteConfig { expected: u32, received: u32 },

    #[error("transport error: {0}")]
    Transport(#[from] nsp_net::TransportError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport error: {0}")]
    Transport(#[from] nsp_net::TransportError),

    #[error("timed out waiting to reach run level {expected:?}")]
    RunLevelTimeout { expected: crate::startup::RunLevel },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
