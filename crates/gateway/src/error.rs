use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{entity}.{action} transport failure: {source}")]
    Transport {
        entity: String,
        action: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{entity}.{action} returned an undecodable reply: {source}")]
    MalformedReply {
        entity: String,
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode parameters for {entity}.{action}: {source}")]
    Encode {
        entity: String,
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GatewayError {
    pub(crate) fn transport(entity: &str, action: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            entity: entity.to_string(),
            action: action.to_string(),
            source,
        }
    }

    pub(crate) fn malformed(entity: &str, action: &str, source: serde_json::Error) -> Self {
        Self::MalformedReply {
            entity: entity.to_string(),
            action: action.to_string(),
            source,
        }
    }

    pub(crate) fn encode(entity: &str, action: &str, source: serde_json::Error) -> Self {
        Self::Encode {
            entity: entity.to_string(),
            action: action.to_string(),
            source,
        }
    }
}
