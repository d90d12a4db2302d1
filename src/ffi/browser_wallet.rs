use async_trait::async_trait;
use serde::Serialize as _;
use serde_json::json;
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, error};
use wasm_bindgen::prelude::*;

use super::{from_js_json, method, to_js};
use crate::{
    browser_wallet::{BrowserWalletApi, BrowserWalletConnector, BrowserWalletEvent},
    connection::WalletConnectionDelegate,
    error::Error,
    network::Network,
    schema::{Schema, SignableMessage, TypedParameters},
    transaction::{AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType},
};

#[wasm_bindgen]
extern "C" {
    /// The API the Concordium browser wallet injects as `window.concordium`.
    #[derive(Clone)]
    pub type ConcordiumProvider;

    /// Request access to the selected account. Resolves to the address, or
    /// `undefined` if the user didn't grant access.
    #[wasm_bindgen(method, catch)]
    pub async fn connect(this: &ConcordiumProvider) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "getMostRecentlySelectedAccount")]
    pub async fn most_recently_selected_account(
        this: &ConcordiumProvider,
    ) -> Result<JsValue, JsValue>;

    /// Genesis hash of the chain selected in the wallet.
    #[wasm_bindgen(method, catch, js_name = "getSelectedChain")]
    pub async fn selected_chain(this: &ConcordiumProvider) -> Result<JsValue, JsValue>;

    /// The wallet encodes `parameters` itself using `schema`. Resolves to the
    /// hash of the submitted transaction.
    #[wasm_bindgen(method, catch, js_name = "sendTransaction")]
    pub async fn send_transaction(
        this: &ConcordiumProvider,
        account_address: &str,
        transaction_type: u8,
        payload: JsValue,
        parameters: JsValue,
        schema: JsValue,
        schema_version: Option<u8>,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = "signMessage")]
    pub async fn sign_message(
        this: &ConcordiumProvider,
        account_address: &str,
        message: JsValue,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method)]
    pub fn on(this: &ConcordiumProvider, event: &str, handler: &js_sys::Function);

    #[wasm_bindgen(method, js_name = "removeAllListeners")]
    pub fn remove_all_listeners(this: &ConcordiumProvider);
}

const ACCOUNT_CHANGED: &str = "accountChanged";
const ACCOUNT_DISCONNECTED: &str = "accountDisconnected";
const CHAIN_CHANGED: &str = "chainChanged";

/// The browser wallet found in the page.
pub struct BrowserWallet {
    provider: ConcordiumProvider,
    listeners: RefCell<Vec<Closure<dyn Fn(JsValue)>>>,
}

impl BrowserWallet {
    /// Look up the API injected by the extension.
    ///
    /// The extension injects it once the page has loaded: make sure the page
    /// is loaded fully before calling this function.
    pub fn detect() -> Result<Self, Error> {
        let provider = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("concordium"))
            .map_err(|_| Error::WalletNotFound)?;
        if !looks_like_concordium_provider(&provider) {
            return Err(Error::WalletNotFound);
        }
        Ok(Self {
            provider: provider.unchecked_into(),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Detect the browser wallet and wrap it into a connector.
    pub fn connector(
        delegate: Rc<dyn WalletConnectionDelegate>,
        network: Network,
    ) -> Result<Rc<BrowserWalletConnector<Self>>, Error> {
        Ok(BrowserWalletConnector::new(Self::detect()?, delegate, network))
    }
}

fn looks_like_concordium_provider(value: &JsValue) -> bool {
    value.is_object()
        && ["connect", "sendTransaction", "signMessage", "on"]
            .into_iter()
            .all(|name| method(value, name).is_some())
}

fn optional_string(value: Result<JsValue, JsValue>) -> Result<Option<String>, Error> {
    value.map(|value| value.as_string()).map_err(Error::from_js)
}

/// Amounts and indices become `BigInt`s as the wallet expects.
fn payload_to_js(payload: &AccountTransactionPayload) -> Result<JsValue, Error> {
    let serializer = serde_wasm_bindgen::Serializer::new()
        .serialize_maps_as_objects(true)
        .serialize_large_number_types_as_bigints(true);
    payload
        .serialize(&serializer)
        .map_err(|error| Error::Decode(format!("couldn't encode the payload: {error}")))
}

#[async_trait(?Send)]
impl BrowserWalletApi for BrowserWallet {
    async fn connect(&self) -> Result<Option<String>, Error> {
        optional_string(self.provider.connect().await)
    }

    async fn most_recently_selected_account(&self) -> Result<Option<String>, Error> {
        optional_string(self.provider.most_recently_selected_account().await)
    }

    async fn selected_chain(&self) -> Result<Option<String>, Error> {
        optional_string(self.provider.selected_chain().await)
    }

    async fn send_transaction(
        &self,
        account_address: &str,
        transaction_type: AccountTransactionType,
        payload: &AccountTransactionPayload,
        typed_params: Option<&TypedParameters>,
    ) -> Result<String, Error> {
        let (parameters, schema, schema_version) = match typed_params {
            Some(TypedParameters { parameters, schema }) => {
                let version = match schema {
                    Schema::Module { version, .. } => version.map(|v| v as u8),
                    Schema::Parameter { .. } => None,
                };
                (to_js(parameters)?, to_js(schema)?, version)
            }
            None => (JsValue::UNDEFINED, JsValue::UNDEFINED, None),
        };

        let hash = self
            .provider
            .send_transaction(
                account_address,
                transaction_type.into(),
                payload_to_js(payload)?,
                parameters,
                schema,
                schema_version,
            )
            .await
            .map_err(Error::from_js)?;
        hash.as_string()
            .ok_or_else(|| Error::Decode(format!("unexpected transaction hash: {hash:?}")))
    }

    async fn sign_message(
        &self,
        account_address: &str,
        message: &SignableMessage,
    ) -> Result<AccountTransactionSignature, Error> {
        let message = match message {
            SignableMessage::String(message) => JsValue::from_str(message),
            SignableMessage::Binary { data, schema } => to_js(&json!({
                "data": hex::encode(data),
                "schema": schema.to_base64(),
            }))?,
        };
        let signature = self
            .provider
            .sign_message(account_address, message)
            .await
            .map_err(Error::from_js)?;
        from_js_json(signature)
    }

    fn subscribe(&self, handler: Rc<dyn Fn(BrowserWalletEvent)>) {
        let events: [(&str, fn(String) -> BrowserWalletEvent); 3] = [
            (ACCOUNT_CHANGED, BrowserWalletEvent::AccountChanged),
            (ACCOUNT_DISCONNECTED, BrowserWalletEvent::AccountDisconnected),
            (CHAIN_CHANGED, BrowserWalletEvent::ChainChanged),
        ];
        let mut listeners = self.listeners.borrow_mut();
        for (name, event) in events {
            let handler = Rc::clone(&handler);
            let listener = Closure::<dyn Fn(JsValue)>::new(move |value: JsValue| {
                match value.as_string() {
                    Some(value) => handler(event(value)),
                    None => error!(event = name, ?value, "unexpected browser wallet event payload"),
                }
            });
            self.provider.on(name, listener.as_ref().unchecked_ref());
            listeners.push(listener);
        }
        debug!("subscribed to browser wallet events");
    }

    fn release(&self) {
        self.provider.remove_all_listeners();
        self.listeners.borrow_mut().clear();
    }
}
