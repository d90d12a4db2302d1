use crate::transaction::AccountTransactionType;
use wasm_bindgen::{JsCast as _, JsValue};

/// Error object as returned by the wallet backends, e.g. the
/// `{ code, message }` objects a WalletConnect wallet rejects requests with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error, serde::Deserialize)]
#[error("{message}")]
pub struct BackendError {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

/// Code used by the mobile wallets when the user rejects a request.
pub const REJECTED_IN_WALLET_CODE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("provided schema '{0}' is not valid base64")]
    InvalidBase64(String),
    #[error("provided value '{input}' is not valid hex: {reason}")]
    InvalidHex { input: String, reason: String },

    #[error("'parameters' must be provided for transaction of type '{0}'")]
    MissingTypedParameters(AccountTransactionType),
    #[error("'parameters' must not be provided for transaction of type '{0}'")]
    UnexpectedTypedParameters(AccountTransactionType),
    #[error("'{field}' field of '{transaction_type}' parameters must be empty")]
    ParameterAlreadySet {
        field: &'static str,
        transaction_type: AccountTransactionType,
    },
    #[error("payload doesn't match transaction of type '{0}'")]
    PayloadMismatch(AccountTransactionType),
    #[error("receive name '{0}' is not of the form '<contract>.<entrypoint>'")]
    InvalidReceiveName(String),
    #[error("{0} is not supported by this wallet")]
    UnsupportedMessage(&'static str),

    #[error("unexpected size of custom section \"{section}\": expected 1 but it was {size}")]
    SectionSize { section: String, size: usize },
    #[error("invalid wasm module: {0}")]
    InvalidModule(String),
    #[error("module source is empty")]
    EmptyModuleSource,

    #[error("invalid contract index '{0}'")]
    InvalidContractIndex(String),
    #[error("contract {0} not found")]
    ContractNotFound(u64),
    #[error("name \"{0}\" doesn't start with \"init_\"")]
    InvalidContractName(String),

    #[error("transaction rejected in wallet")]
    Rejected,
    #[error("no Concordium browser wallet was detected")]
    WalletNotFound,
    #[error("connection has already been closed")]
    Disconnected,
    #[error("{0}")]
    Backend(BackendError),
    #[error("couldn't decode the response: {0}")]
    Decode(String),
}

impl Error {
    /// `true` for errors caused by malformed input from the caller.
    /// These are always raised before anything is sent to the wallet.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidBase64(_)
                | Self::InvalidHex { .. }
                | Self::MissingTypedParameters(_)
                | Self::UnexpectedTypedParameters(_)
                | Self::ParameterAlreadySet { .. }
                | Self::PayloadMismatch(_)
                | Self::InvalidReceiveName(_)
                | Self::UnsupportedMessage(_)
                | Self::InvalidContractIndex(_)
        )
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend(BackendError {
            code: None,
            message: message.into(),
        })
    }

    /// Best-effort conversion of whatever a JS promise was rejected with.
    pub fn from_js(error: JsValue) -> Self {
        if let Ok(backend) = serde_wasm_bindgen::from_value::<BackendError>(error.clone()) {
            return Self::Backend(backend);
        }
        if let Some(message) = error.as_string() {
            return Self::backend(message);
        }
        if let Some(error) = error.dyn_ref::<js_sys::Error>() {
            return Self::backend(String::from(error.message()));
        }
        Self::backend(format!("{error:?}"))
    }
}

impl From<BackendError> for Error {
    fn from(error: BackendError) -> Self {
        Self::Backend(error)
    }
}

/// Render an error for display to the end user.
pub fn error_string(error: &Error) -> String {
    match error {
        Error::Backend(BackendError {
            code: Some(code),
            message,
        }) => format!("{message} (code {code})"),
        error => error.to_string(),
    }
}
