use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The registry rejected the service entry itself. Nothing was registered.
    #[error("register service {id} to registry: {source}")]
    ServiceRegister {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The service entry exists but its TTL check could not be attached.
    #[error("initial register service check {id} to registry: {source}")]
    CheckRegister {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("deregister check {id}: {source}")]
    CheckDeregister {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("query service entries [{service}]: {source}")]
    Resolve {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("no resolver installed for scheme {0}")]
    UnknownScheme(String),

    #[error("resolver for scheme {0} already installed")]
    SchemeInstalled(String),

    #[error("registry client: {0}")]
    Client(#[source] anyhow::Error),
}
