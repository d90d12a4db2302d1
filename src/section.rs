/*!
Lookup of the contract schema embedded into a smart contract module.

The module can contain a schema in one of a few custom sections. Which
sections are supported depends on the module version, and the schema version
is either given by the section name or embedded into the schema itself:

- Both v0 and v1 modules support the section `concordium-schema` where the
  schema includes the version. For v0 modules this is always a v0 schema, for
  v1 modules it can be a v1, v2, or v3 schema.
- v0 modules additionally support `concordium-schema-v1`, which always
  contains a v0 schema (not a typo).
- v1 modules additionally support `concordium-schema-v2`, which always
  contains a v1 schema (not a typo).

`concordium-schema` is the most common one and what current tooling produces,
so it's always checked first.
*/

use crate::{
    error::Error,
    schema::{Schema, SchemaVersion},
};

pub const SCHEMA_SECTION: &str = "concordium-schema";
pub const SCHEMA_SECTION_V1: &str = "concordium-schema-v1";
pub const SCHEMA_SECTION_V2: &str = "concordium-schema-v2";

/// Access to the custom sections of a compiled WebAssembly module.
pub trait CustomSections {
    /// All the contents of the custom sections named `name`, in module order.
    fn custom_sections(&self, name: &str) -> Result<Vec<Vec<u8>>, Error>;
}

/// The schema found in a module together with the section it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSchemaSection {
    pub section_name: &'static str,
    pub schema: Schema,
}

/// The sections to look for, in order of precedence, with the schema version
/// implied by the section name (if any).
fn candidate_sections(module_version: u32) -> &'static [(&'static str, Option<SchemaVersion>)] {
    match module_version {
        0 => &[
            (SCHEMA_SECTION, None),
            (SCHEMA_SECTION_V1, Some(SchemaVersion::V0)),
        ],
        1 => &[
            (SCHEMA_SECTION, None),
            (SCHEMA_SECTION_V2, Some(SchemaVersion::V1)),
        ],
        // expecting to find this section in future module versions
        _ => &[(SCHEMA_SECTION, None)],
    }
}

/// Find the schema of a module with the given version.
///
/// Returns `Ok(None)` if the module has no schema.
///
/// # Errors
///
/// fails with [`Error::SectionSize`] if the first section found is present
/// more than once.
pub fn find_schema(
    module: &impl CustomSections,
    module_version: u32,
) -> Result<Option<ModuleSchemaSection>, Error> {
    for &(section_name, version) in candidate_sections(module_version) {
        let mut contents = module.custom_sections(section_name)?;
        match contents.len() {
            0 => continue,
            1 => {
                let value = contents.remove(0);
                return Ok(Some(ModuleSchemaSection {
                    section_name,
                    schema: Schema::Module { value, version },
                }));
            }
            size => {
                return Err(Error::SectionSize {
                    section: section_name.to_owned(),
                    size,
                });
            }
        }
    }
    Ok(None)
}

impl CustomSections for js_sys::WebAssembly::Module {
    fn custom_sections(&self, name: &str) -> Result<Vec<Vec<u8>>, Error> {
        let sections = js_sys::WebAssembly::Module::custom_sections(self, name);
        Ok(sections
            .iter()
            .map(|buffer| js_sys::Uint8Array::new(&buffer).to_vec())
            .collect())
    }
}

const WASM_MAGIC: &[u8; 4] = b"\0asm";
const WASM_VERSION: &[u8; 4] = &[1, 0, 0, 0];
const CUSTOM_SECTION_ID: u8 = 0;

/// Custom sections read straight out of a wasm binary, for when the module
/// doesn't need to be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmModule<'a> {
    custom: Vec<(&'a str, &'a [u8])>,
}

impl<'a> WasmModule<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        let mut reader = Reader { bytes };
        if reader.take(4)? != WASM_MAGIC {
            return Err(Error::InvalidModule("missing wasm magic".to_owned()));
        }
        if reader.take(4)? != WASM_VERSION {
            return Err(Error::InvalidModule("unsupported wasm version".to_owned()));
        }

        let mut custom = Vec::new();
        while !reader.bytes.is_empty() {
            let id = reader.take(1)?[0];
            let size = reader.leb128_u32()? as usize;
            let content = reader.take(size)?;
            if id == CUSTOM_SECTION_ID {
                let mut content = Reader { bytes: content };
                let name_len = content.leb128_u32()? as usize;
                let name = std::str::from_utf8(content.take(name_len)?)
                    .map_err(|error| Error::InvalidModule(format!("custom section name: {error}")))?;
                custom.push((name, content.bytes));
            }
        }

        Ok(Self { custom })
    }
}

impl CustomSections for WasmModule<'_> {
    fn custom_sections(&self, name: &str) -> Result<Vec<Vec<u8>>, Error> {
        Ok(self
            .custom
            .iter()
            .filter(|(section, _)| *section == name)
            .map(|(_, content)| content.to_vec())
            .collect())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.bytes.len() < n {
            return Err(Error::InvalidModule(format!(
                "unexpected end of module: needed {n} bytes, {} left",
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn leb128_u32(&mut self) -> Result<u32, Error> {
        let mut result = 0u32;
        // a u32 takes at most 5 bytes
        for shift in (0..35).step_by(7) {
            let byte = self.take(1)?[0];
            // the last byte only has room for the top 4 bits
            if shift == 28 && byte & 0x70 != 0 {
                return Err(Error::InvalidModule("LEB128 integer overflows u32".to_owned()));
            }
            result |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::InvalidModule("LEB128 integer too long".to_owned()))
    }
}
