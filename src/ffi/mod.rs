pub mod browser_wallet;
pub mod json_rpc;
pub mod module;
pub mod wallet_connect;
pub mod web_sdk;

pub use self::{
    browser_wallet::BrowserWallet,
    json_rpc::JsonRpcClient,
    module::{compile_module, fetch_compiled_schema},
    wallet_connect::{QrCodeModal, WalletConnectClient},
    web_sdk::WebSdkCodec,
};

use serde::{Serialize, de::DeserializeOwned};
use wasm_bindgen::prelude::*;

use crate::error::Error;

/// Plain JS object (no `Map`s) for a JSON-like value.
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, Error> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|error| Error::Decode(format!("couldn't encode the request: {error}")))
}

/// Decode a value that is known to be plain JSON by going through
/// `JSON.stringify`, so map keys of any type are handled by `serde_json`.
pub(crate) fn from_js_json<T: DeserializeOwned>(value: JsValue) -> Result<T, Error> {
    let json = js_sys::JSON::stringify(&value).map_err(Error::from_js)?;
    serde_json::from_str(&String::from(json)).map_err(|error| Error::Decode(error.to_string()))
}

/// The property `name` of `value` if it's a function.
pub(crate) fn method(value: &JsValue, name: &str) -> Option<js_sys::Function> {
    js_sys::Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .and_then(|property| property.dyn_into().ok())
}
