use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use wasm_bindgen::prelude::*;

use super::to_js;
use crate::{error::Error, schema::SchemaVersion, transaction::ParameterCodec};

#[wasm_bindgen(module = "@concordium/web-sdk")]
extern "C" {
    #[wasm_bindgen(catch, js_name = "serializeInitContractParameters")]
    fn serialize_init_contract_parameters(
        contract_name: &str,
        parameters: JsValue,
        raw_schema: JsValue,
        schema_version: Option<u8>,
    ) -> Result<js_sys::Uint8Array, JsValue>;

    #[wasm_bindgen(catch, js_name = "serializeUpdateContractParameters")]
    fn serialize_update_contract_parameters(
        contract_name: &str,
        receive_function_name: &str,
        parameters: JsValue,
        raw_schema: JsValue,
        schema_version: Option<u8>,
    ) -> Result<js_sys::Uint8Array, JsValue>;

    #[wasm_bindgen(catch, js_name = "serializeTypeValue")]
    fn serialize_type_value(
        value: JsValue,
        raw_schema: JsValue,
    ) -> Result<js_sys::Uint8Array, JsValue>;

    /// `Buffer` from an encoded string.
    #[wasm_bindgen(js_name = "toBuffer")]
    fn to_buffer(data: &str, encoding: &str) -> JsValue;
}

fn schema_buffer(schema: &[u8]) -> JsValue {
    to_buffer(&STANDARD.encode(schema), "base64")
}

/// Parameter encoding of the Concordium web SDK.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSdkCodec;

impl ParameterCodec for WebSdkCodec {
    fn serialize_init_contract_parameters(
        &self,
        contract_name: &str,
        parameters: &JsonValue,
        schema: &[u8],
        version: Option<SchemaVersion>,
    ) -> Result<Vec<u8>, Error> {
        serialize_init_contract_parameters(
            contract_name,
            to_js(parameters)?,
            schema_buffer(schema),
            version.map(|v| v as u8),
        )
        .map(|buffer| buffer.to_vec())
        .map_err(Error::from_js)
    }

    fn serialize_update_contract_parameters(
        &self,
        contract_name: &str,
        entrypoint_name: &str,
        parameters: &JsonValue,
        schema: &[u8],
        version: Option<SchemaVersion>,
    ) -> Result<Vec<u8>, Error> {
        serialize_update_contract_parameters(
            contract_name,
            entrypoint_name,
            to_js(parameters)?,
            schema_buffer(schema),
            version.map(|v| v as u8),
        )
        .map(|buffer| buffer.to_vec())
        .map_err(Error::from_js)
    }

    fn serialize_type_value(&self, parameters: &JsonValue, schema: &[u8]) -> Result<Vec<u8>, Error> {
        serialize_type_value(to_js(parameters)?, schema_buffer(schema))
            .map(|buffer| buffer.to_vec())
            .map_err(Error::from_js)
    }
}
