use async_trait::async_trait;
use serde::Serialize as _;
use wasm_bindgen::prelude::*;

use crate::{
    contract::{InstanceInfo, NodeClient, VersionedModuleSource},
    error::Error,
    network::Network,
    transaction::{ContractAddress, ModuleReference},
};

#[wasm_bindgen(module = "@concordium/web-sdk")]
extern "C" {
    pub type HttpProvider;

    #[wasm_bindgen(constructor)]
    pub fn new(url: &str) -> HttpProvider;

    #[derive(Clone)]
    #[wasm_bindgen(js_name = "JsonRpcClient")]
    pub type JsonRpcClientJs;

    #[wasm_bindgen(constructor, js_class = "JsonRpcClient")]
    pub fn new(provider: HttpProvider) -> JsonRpcClientJs;

    /// Resolves to `undefined` if there's no instance at the address.
    #[wasm_bindgen(method, catch, js_class = "JsonRpcClient", js_name = "getInstanceInfo")]
    pub async fn instance_info(this: &JsonRpcClientJs, address: JsValue) -> Result<JsValue, JsValue>;

    /// Resolves to the versioned source as a `Buffer`.
    #[wasm_bindgen(method, catch, js_class = "JsonRpcClient", js_name = "getModuleSource")]
    pub async fn module_source(
        this: &JsonRpcClientJs,
        module_ref: ModuleReferenceJs,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_name = "ModuleReference")]
    pub type ModuleReferenceJs;

    #[wasm_bindgen(constructor, js_class = "ModuleReference")]
    pub fn new(module_ref: &str) -> ModuleReferenceJs;
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, Error> {
    serde_wasm_bindgen::from_value(value).map_err(|error| Error::Decode(error.to_string()))
}

/// Client of a Concordium JSON-RPC proxy.
#[derive(Clone)]
pub struct JsonRpcClient {
    client: JsonRpcClientJs,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            client: JsonRpcClientJs::new(HttpProvider::new(url)),
        }
    }

    /// Client of the proxy configured for `network`.
    pub fn for_network(network: &Network) -> Self {
        Self::new(&network.json_rpc_url)
    }
}

#[async_trait(?Send)]
impl NodeClient for JsonRpcClient {
    async fn instance_info(
        &self,
        address: ContractAddress,
    ) -> Result<Option<InstanceInfo>, Error> {
        let serializer =
            serde_wasm_bindgen::Serializer::new().serialize_large_number_types_as_bigints(true);
        let address = address
            .serialize(&serializer)
            .map_err(|error| Error::Decode(format!("couldn't encode the address: {error}")))?;
        let info = self
            .client
            .instance_info(address)
            .await
            .map_err(Error::from_js)?;
        if info.is_undefined() || info.is_null() {
            return Ok(None);
        }
        from_js(info).map(Some)
    }

    async fn module_source(
        &self,
        module_ref: &ModuleReference,
    ) -> Result<VersionedModuleSource, Error> {
        let source = self
            .client
            .module_source(ModuleReferenceJs::new(&module_ref.module_ref))
            .await
            .map_err(Error::from_js)?;
        let bytes = js_sys::Uint8Array::new(&source).to_vec();
        VersionedModuleSource::from_bytes(&bytes)
    }
}
