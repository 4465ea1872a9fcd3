/// Protocol errors shared by the ledger, RPC layer, and plugin surface.
///
/// The variant kinds are part of the wire contract: an error crossing the
/// RPC boundary is flattened to `{type, message}` and rebuilt on the other
/// side via [`ProtocolError::from_wire`]. Each variant carries its full
/// human-readable message so the round trip is lossless.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A field failed validation; the message names the field and value.
    #[error("{0}")]
    InvalidFields(String),

    /// A transfer id was reused with different contents.
    #[error("{0}")]
    DuplicateId(String),

    /// Business-rule refusal (credit limit, direction, precondition).
    #[error("{0}")]
    NotAccepted(String),

    /// No prepared or terminal record exists for the id.
    #[error("{0}")]
    TransferNotFound(String),

    /// The transfer already reached the fulfilled terminal state.
    #[error("{0}")]
    AlreadyFulfilled(String),

    /// The transfer already reached the cancelled terminal state.
    #[error("{0}")]
    AlreadyRolledBack(String),

    /// The transfer was already rejected or has expired.
    #[error("{0}")]
    AlreadyRejected(String),

    /// A second inbound-request handler was registered.
    #[error("request handler already registered")]
    RequestHandlerAlreadyRegistered,

    /// The peer did not answer an RPC call in time.
    #[error("{0}")]
    Timeout(String),

    /// The transport refused or failed to deliver a payload.
    #[error("{0}")]
    Transport(String),

    /// The backing store failed a read.
    #[error("{0}")]
    Store(String),

    /// A payload could not be encoded or decoded.
    #[error("{0}")]
    Serialization(String),

    /// An error kind this side does not recognise; kept verbatim.
    #[error("{kind}: {message}")]
    Unknown { kind: String, message: String },
}

impl ProtocolError {
    /// The wire name of this error kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::InvalidFields(_) => "InvalidFieldsError",
            Self::DuplicateId(_) => "DuplicateIdError",
            Self::NotAccepted(_) => "NotAcceptedError",
            Self::TransferNotFound(_) => "TransferNotFoundError",
            Self::AlreadyFulfilled(_) => "AlreadyFulfilledError",
            Self::AlreadyRolledBack(_) => "AlreadyRolledBackError",
            Self::AlreadyRejected(_) => "AlreadyRejectedError",
            Self::RequestHandlerAlreadyRegistered => "RequestHandlerAlreadyRegisteredError",
            Self::Timeout(_) => "TimeoutError",
            Self::Transport(_) => "TransportError",
            Self::Store(_) => "StoreError",
            Self::Serialization(_) => "SerializationError",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Rebuild an error from its flattened wire form.
    ///
    /// Unknown kinds are preserved as [`ProtocolError::Unknown`] so the
    /// original message still surfaces to the caller.
    pub fn from_wire(kind: &str, message: String) -> Self {
        match kind {
            "InvalidFieldsError" => Self::InvalidFields(message),
            "DuplicateIdError" => Self::DuplicateId(message),
            "NotAcceptedError" => Self::NotAccepted(message),
            "TransferNotFoundError" => Self::TransferNotFound(message),
            "AlreadyFulfilledError" => Self::AlreadyFulfilled(message),
            "AlreadyRolledBackError" => Self::AlreadyRolledBack(message),
            "AlreadyRejectedError" => Self::AlreadyRejected(message),
            "RequestHandlerAlreadyRegisteredError" => Self::RequestHandlerAlreadyRegistered,
            "TimeoutError" => Self::Timeout(message),
            "TransportError" => Self::Transport(message),
            "StoreError" => Self::Store(message),
            "SerializationError" => Self::Serialization(message),
            _ => Self::Unknown {
                kind: kind.to_string(),
                message,
            },
        }
    }

    /// Shorthand for an [`InvalidFields`](Self::InvalidFields) error naming
    /// the offending field.
    pub fn invalid_field(field: &str, detail: impl std::fmt::Display) -> Self {
        Self::InvalidFields(format!("invalid {}: {}", field, detail))
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
