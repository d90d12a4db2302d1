/*!
Lookup of smart contract instances and their schemas through a node.
*/

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::Error,
    section::{ModuleSchemaSection, WasmModule, find_schema},
    transaction::{AccountAddress, CcdAmount, ContractAddress, ModuleReference},
};

const INIT_PREFIX: &str = "init_";

/// State of a contract instance as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub version: u32,
    /// name of the init function, i.e. `init_<contract>`
    pub name: String,
    pub owner: AccountAddress,
    pub amount: CcdAmount,
    pub methods: Vec<String>,
    pub source_module: ModuleReference,
}

/// A module source prefixed by the version of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedModuleSource {
    pub version: u32,
    pub source: Vec<u8>,
}

impl VersionedModuleSource {
    /// Decode the node's binary representation: the version and the length
    /// of the source as big endian `u32`s, followed by the source.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let truncated = || Error::InvalidModule("truncated versioned module source".to_owned());
        let (version, rest) = bytes.split_first_chunk::<4>().ok_or_else(truncated)?;
        let (length, rest) = rest.split_first_chunk::<4>().ok_or_else(truncated)?;
        let length = u32::from_be_bytes(*length) as usize;
        let source = rest.get(..length).ok_or_else(truncated)?;
        Ok(Self {
            version: u32::from_be_bytes(*version),
            source: source.to_vec(),
        })
    }
}

/// The node queries needed to resolve contracts.
#[async_trait(?Send)]
pub trait NodeClient {
    /// `None` if there's no instance at `address`.
    async fn instance_info(&self, address: ContractAddress)
    -> Result<Option<InstanceInfo>, Error>;

    async fn module_source(&self, module_ref: &ModuleReference)
    -> Result<VersionedModuleSource, Error>;
}

/// Data and state of a smart contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// version of the contract's semantics
    pub version: u32,
    pub index: u64,
    /// contract name without the `init_` prefix
    pub name: String,
    pub amount: CcdAmount,
    pub owner: AccountAddress,
    pub methods: Vec<String>,
    pub module_ref: ModuleReference,
}

/// Parse user input (e.g. the value of an input field) as a contract index.
pub fn parse_contract_index(input: &str) -> Result<u64, Error> {
    input
        .trim()
        .parse()
        .map_err(|_| Error::InvalidContractIndex(input.to_owned()))
}

/// Look up the contract with the given index (and subindex 0).
pub async fn load_contract(node: &dyn NodeClient, index: u64) -> Result<Info, Error> {
    let address = ContractAddress { index, subindex: 0 };
    let InstanceInfo {
        version,
        name,
        owner,
        amount,
        methods,
        source_module,
    } = node
        .instance_info(address)
        .await?
        .ok_or(Error::ContractNotFound(index))?;

    let Some(contract_name) = name.strip_prefix(INIT_PREFIX) else {
        return Err(Error::InvalidContractName(name));
    };
    Ok(Info {
        version,
        index,
        name: contract_name.to_owned(),
        amount,
        owner,
        methods,
        module_ref: source_module,
    })
}

/// [`parse_contract_index`] followed by [`load_contract`].
pub async fn select_contract(node: &dyn NodeClient, input: &str) -> Result<Info, Error> {
    let index = parse_contract_index(input)?;
    load_contract(node, index).await
}

/// Fetch the module of `contract`.
pub async fn fetch_module_source(
    node: &dyn NodeClient,
    contract: &Info,
) -> Result<VersionedModuleSource, Error> {
    let module = node.module_source(&contract.module_ref).await?;
    if module.source.is_empty() {
        return Err(Error::EmptyModuleSource);
    }
    Ok(module)
}

/// Fetch the module of `contract` and extract its schema, if it has one.
///
/// Only the section layout of the wasm binary is read: a module that isn't
/// valid wasm is accepted as long as its sections are well formed. In the
/// browser, [`fetch_compiled_schema`] compiles the module first.
///
/// [`fetch_compiled_schema`]: crate::ffi::fetch_compiled_schema
pub async fn fetch_schema(
    node: &dyn NodeClient,
    contract: &Info,
) -> Result<Option<ModuleSchemaSection>, Error> {
    let VersionedModuleSource { version, source } = fetch_module_source(node, contract).await?;
    let schema = find_schema(&WasmModule::parse(&source)?, version)?;
    log_resolved_schema(contract, version, schema.as_ref());
    Ok(schema)
}

pub(crate) fn log_resolved_schema(
    contract: &Info,
    module_version: u32,
    schema: Option<&ModuleSchemaSection>,
) {
    debug!(
        contract = %contract.name,
        module_version,
        section = schema.map(|s| s.section_name),
        "resolved contract schema"
    );
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use serde_json::json;
    use std::collections::HashMap;

    use super::*;
    use crate::{
        schema::{Schema, SchemaVersion},
        section::{SCHEMA_SECTION, SCHEMA_SECTION_V2},
    };

    #[derive(Default)]
    struct MockNode {
        instances: HashMap<u64, InstanceInfo>,
        modules: HashMap<String, VersionedModuleSource>,
    }

    #[async_trait(?Send)]
    impl NodeClient for MockNode {
        async fn instance_info(
            &self,
            address: ContractAddress,
        ) -> Result<Option<InstanceInfo>, Error> {
            assert_eq!(address.subindex, 0);
            Ok(self.instances.get(&address.index).cloned())
        }

        async fn module_source(
            &self,
            module_ref: &ModuleReference,
        ) -> Result<VersionedModuleSource, Error> {
            self.modules
                .get(&module_ref.module_ref)
                .cloned()
                .ok_or_else(|| Error::backend("module not found"))
        }
    }

    fn instance(name: &str) -> InstanceInfo {
        serde_json::from_value(json! { {
            "version": 1,
            "name": name,
            "owner": { "address": "3kBx2h5Y2veb4hZgAJWPrr8RyQESKm5TjzF3ti1QQ4VSYLwK1G" },
            "amount": { "microCcdAmount": 42 },
            "methods": ["piggy_bank.insert", "piggy_bank.smash"],
            "sourceModule": { "moduleRef": "ab".repeat(32) },
        }})
        .unwrap()
    }

    /// wasm binary with a single custom section
    fn wasm_module(section: &str, contents: &[u8]) -> Vec<u8> {
        let mut payload = vec![section.len() as u8];
        payload.extend_from_slice(section.as_bytes());
        payload.extend_from_slice(contents);

        let mut module = b"\0asm".to_vec();
        module.extend_from_slice(&[1, 0, 0, 0]);
        module.push(0);
        module.push(payload.len() as u8);
        module.extend(payload);
        module
    }

    #[test]
    fn parse_index() {
        assert_eq!(parse_contract_index("2059"), Ok(2059));
        assert_eq!(parse_contract_index(" 7 "), Ok(7));
        assert_eq!(
            parse_contract_index("-1"),
            Err(Error::InvalidContractIndex("-1".to_owned()))
        );
        assert!(parse_contract_index("").is_err());
    }

    #[test]
    fn versioned_module_source() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 2, 0xaa, 0xbb];
        assert_eq!(
            VersionedModuleSource::from_bytes(&bytes),
            Ok(VersionedModuleSource {
                version: 1,
                source: vec![0xaa, 0xbb],
            })
        );
        assert!(matches!(
            VersionedModuleSource::from_bytes(&bytes[..9]),
            Err(Error::InvalidModule(_))
        ));
    }

    #[test]
    fn load() {
        let mut node = MockNode::default();
        node.instances.insert(2059, instance("init_piggy_bank"));
        node.instances.insert(2060, instance("piggy_bank"));

        let info = block_on(select_contract(&node, "2059")).unwrap();
        assert_eq!(info.name, "piggy_bank");
        assert_eq!(info.index, 2059);
        assert_eq!(info.amount, CcdAmount::from_micro_ccd(42));
        assert_eq!(info.methods.len(), 2);

        assert_eq!(
            block_on(load_contract(&node, 2060)),
            Err(Error::InvalidContractName("piggy_bank".to_owned()))
        );
        assert_eq!(
            block_on(load_contract(&node, 1)),
            Err(Error::ContractNotFound(1))
        );
        assert_eq!(
            block_on(select_contract(&node, "x")),
            Err(Error::InvalidContractIndex("x".to_owned()))
        );
    }

    #[test]
    fn schema_of_contract() {
        let mut node = MockNode::default();
        node.instances.insert(2059, instance("init_piggy_bank"));
        node.modules.insert(
            "ab".repeat(32),
            VersionedModuleSource {
                version: 1,
                source: wasm_module(SCHEMA_SECTION_V2, &[0xff, 0x01]),
            },
        );
        let info = block_on(load_contract(&node, 2059)).unwrap();

        let found = block_on(fetch_schema(&node, &info)).unwrap().unwrap();
        assert_eq!(found.section_name, SCHEMA_SECTION_V2);
        assert_eq!(
            found.schema,
            Schema::Module {
                value: vec![0xff, 0x01],
                version: Some(SchemaVersion::V1),
            }
        );
    }

    #[test]
    fn schema_of_empty_module() {
        let mut node = MockNode::default();
        node.instances.insert(1, instance("init_a"));
        node.modules.insert(
            "ab".repeat(32),
            VersionedModuleSource {
                version: 0,
                source: Vec::new(),
            },
        );
        let info = block_on(load_contract(&node, 1)).unwrap();
        assert_eq!(
            block_on(fetch_schema(&node, &info)),
            Err(Error::EmptyModuleSource)
        );
    }

    #[test]
    fn module_source_of_contract() {
        let mut node = MockNode::default();
        node.instances.insert(2059, instance("init_piggy_bank"));
        let info = block_on(load_contract(&node, 2059)).unwrap();
        assert_eq!(
            block_on(fetch_module_source(&node, &info)),
            Err(Error::backend("module not found"))
        );

        // sections are well formed, the code section isn't
        let mut source = wasm_module(SCHEMA_SECTION, &[0x01]);
        source.extend_from_slice(&[10, 1, 0xff]);
        node.modules.insert(
            "ab".repeat(32),
            VersionedModuleSource { version: 1, source: source.clone() },
        );
        assert_eq!(
            block_on(fetch_module_source(&node, &info)),
            Ok(VersionedModuleSource { version: 1, source })
        );
        assert_eq!(
            block_on(fetch_schema(&node, &info)).unwrap().map(|found| found.section_name),
            Some(SCHEMA_SECTION)
        );
    }
}
