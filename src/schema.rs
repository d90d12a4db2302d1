use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Serialize, Serializer, ser::SerializeStruct as _};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Version of the schema format.
///
/// Only relevant for schemas that don't embed their own version
/// (see the custom sections handled in [`find_schema`]).
///
/// [`find_schema`]: crate::section::find_schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    V0 = 0,
    V1 = 1,
    V2 = 2,
}

/// Schema for contract invocation parameters. Selects the method used for
/// encoding the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Schema {
    /// Schema for all the contracts of a module.
    Module {
        value: Vec<u8>,
        version: Option<SchemaVersion>,
    },
    /// Schema of a single type, e.g. the parameter of one entrypoint.
    Parameter { value: Vec<u8> },
}

impl Schema {
    /// # Errors
    ///
    /// fails if `schema_base64` isn't canonically padded base64.
    pub fn module_from_base64(
        schema_base64: &str,
        version: Option<SchemaVersion>,
    ) -> Result<Self, Error> {
        Ok(Self::Module {
            value: schema_from_base64(schema_base64)?,
            version,
        })
    }

    /// # Errors
    ///
    /// fails if `schema_base64` isn't canonically padded base64.
    pub fn parameter_from_base64(schema_base64: &str) -> Result<Self, Error> {
        Ok(Self::Parameter {
            value: schema_from_base64(schema_base64)?,
        })
    }

    pub fn value(&self) -> &[u8] {
        match self {
            Self::Module { value, .. } | Self::Parameter { value } => value,
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.value())
    }
}

/// Decode base64 and require that encoding the result gives the input back.
fn schema_from_base64(schema_base64: &str) -> Result<Vec<u8>, Error> {
    let bytes = STANDARD
        .decode(schema_base64)
        .map_err(|_| Error::InvalidBase64(schema_base64.to_owned()))?;
    if STANDARD.encode(&bytes) != schema_base64 {
        return Err(Error::InvalidBase64(schema_base64.to_owned()));
    }
    Ok(bytes)
}

/// The wire representation used in WalletConnect requests:
/// `{ "type": "module", "value": <base64>, "version": <n> }`.
impl Serialize for Schema {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Module { value, version } => {
                let mut state = serializer.serialize_struct("Schema", 3)?;
                state.serialize_field("type", "module")?;
                state.serialize_field("value", &STANDARD.encode(value))?;
                state.serialize_field("version", &version.map(|v| v as u8))?;
                state.end()
            }
            Self::Parameter { value } => {
                let mut state = serializer.serialize_struct("Schema", 2)?;
                state.serialize_field("type", "parameter")?;
                state.serialize_field("value", &STANDARD.encode(value))?;
                state.end()
            }
        }
    }
}

/// Contract invocation parameters paired with the schema that describes
/// how to serialize them.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedParameters {
    pub parameters: JsonValue,
    pub schema: Schema,
}

/// Pair `parameters` with `schema`, or nothing at all if there is no schema.
pub fn typed_params(parameters: JsonValue, schema: Option<Schema>) -> Option<TypedParameters> {
    schema.map(|schema| TypedParameters { parameters, schema })
}

/// Message to be signed by an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignableMessage {
    /// Plain text, signed as-is.
    String(String),
    /// Binary payload with the schema the wallet uses to display it.
    Binary { data: Vec<u8>, schema: Schema },
}

pub fn string_message(message: impl Into<String>) -> SignableMessage {
    SignableMessage::String(message.into())
}

/// # Errors
///
/// fails if `message_hex` isn't valid hex.
pub fn binary_message_from_hex(message_hex: &str, schema: Schema) -> Result<SignableMessage, Error> {
    let data = hex::decode(message_hex).map_err(|error| Error::InvalidHex {
        input: message_hex.to_owned(),
        reason: error.to_string(),
    })?;
    Ok(SignableMessage::Binary { data, schema })
}
