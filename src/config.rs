use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

use crate::error::Error;

/// ID of the "Mobile Wallets" project in Concordium's WalletConnect Cloud account.
///
/// dApps that don't have a WalletConnect Cloud project of their own may use this one.
pub const CONCORDIUM_WALLET_CONNECT_PROJECT_ID: &str = "76324905a70fe5c388bab46d3e0564dc";

/// Options the WalletConnect sign client is initialized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnectOptions {
    pub project_id: String,
    pub metadata: AppMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
}

/// Description of the dApp as shown to the user in the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

/// The methods and events requested from the wallet when pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredNamespace {
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

impl WalletConnectOptions {
    pub fn new(metadata: AppMetadata) -> Self {
        Self {
            project_id: CONCORDIUM_WALLET_CONNECT_PROJECT_ID.to_owned(),
            metadata,
            relay_url: None,
        }
    }

    /// read the options from a plain JS object
    pub fn from_js(value: JsValue) -> Result<Self, Error> {
        serde_wasm_bindgen::from_value(value).map_err(|error| Error::Decode(error.to_string()))
    }
}

impl Default for RequiredNamespace {
    fn default() -> Self {
        Self {
            methods: vec![
                "sign_and_send_transaction".to_owned(),
                "sign_message".to_owned(),
            ],
            events: vec!["chain_changed".to_owned(), "accounts_changed".to_owned()],
        }
    }
}
