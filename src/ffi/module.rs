use js_sys::WebAssembly;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::{
    contract::{Info, NodeClient, VersionedModuleSource, fetch_module_source, log_resolved_schema},
    error::Error,
    section::{ModuleSchemaSection, find_schema},
};

/// Compile a wasm binary with `WebAssembly.compile`.
pub async fn compile_module(source: &[u8]) -> Result<WebAssembly::Module, Error> {
    let bytes = js_sys::Uint8Array::from(source);
    let module = JsFuture::from(WebAssembly::compile(&bytes))
        .await
        .map_err(|error| Error::InvalidModule(Error::from_js(error).to_string()))?;
    module
        .dyn_into()
        .map_err(|_| Error::InvalidModule("compiling didn't produce a module".to_owned()))
}

/// Fetch the module of `contract`, compile it and extract its schema, if it
/// has one.
pub async fn fetch_compiled_schema(
    node: &dyn NodeClient,
    contract: &Info,
) -> Result<Option<ModuleSchemaSection>, Error> {
    let VersionedModuleSource { version, source } = fetch_module_source(node, contract).await?;
    let module = compile_module(&source).await?;
    let schema = find_schema(&module, version)?;
    log_resolved_schema(contract, version, schema.as_ref());
    Ok(schema)
}
