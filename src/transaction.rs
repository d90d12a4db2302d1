use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{collections::BTreeMap, fmt};

use crate::{
    error::Error,
    schema::{Schema, SchemaVersion, TypedParameters},
};

/// The kinds of account transactions a wallet may be asked to sign and send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountTransactionType {
    DeployModule = 0,
    InitContract = 1,
    Update = 2,
    Transfer = 3,
    TransferToEncrypted = 17,
    TransferToPublic = 18,
    TransferWithSchedule = 19,
    UpdateCredentials = 20,
    RegisterData = 21,
    TransferWithMemo = 22,
    TransferWithScheduleAndMemo = 24,
    ConfigureBaker = 25,
    ConfigureDelegation = 26,
}

impl AccountTransactionType {
    /// Contract transactions carry invocation parameters that must be
    /// encoded using a schema.
    pub fn is_contract(self) -> bool {
        matches!(self, Self::InitContract | Self::Update)
    }
}

impl From<AccountTransactionType> for u8 {
    fn from(transaction_type: AccountTransactionType) -> Self {
        transaction_type as u8
    }
}

impl fmt::Display for AccountTransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct CcdAmount {
    pub micro_ccd_amount: u64,
}

impl CcdAmount {
    pub const fn from_micro_ccd(micro_ccd_amount: u64) -> Self {
        Self { micro_ccd_amount }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractAddress {
    pub index: u64,
    pub subindex: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReference {
    /// hex encoded module hash
    pub module_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress {
    /// base58 encoded address
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitContractPayload {
    pub amount: CcdAmount,
    pub module_ref: ModuleReference,
    /// name of the contract, without the `init_` prefix
    pub init_name: String,
    /// encoded parameters; leave empty, it's filled in from the typed parameters
    #[serde(with = "hex::serde")]
    pub param: Vec<u8>,
    pub max_contract_execution_energy: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContractPayload {
    pub amount: CcdAmount,
    pub address: ContractAddress,
    /// `<contract>.<entrypoint>`
    pub receive_name: String,
    /// encoded parameters; leave empty, it's filled in from the typed parameters
    #[serde(with = "hex::serde")]
    pub message: Vec<u8>,
    pub max_contract_execution_energy: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTransferPayload {
    pub amount: CcdAmount,
    pub to_address: AccountAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AccountTransactionPayload {
    InitContract(InitContractPayload),
    Update(UpdateContractPayload),
    Transfer(SimpleTransferPayload),
    /// Payload of any other transaction type, passed on to the wallet as-is.
    Other(JsonValue),
}

impl AccountTransactionPayload {
    fn matches(&self, transaction_type: AccountTransactionType) -> bool {
        match (self, transaction_type) {
            (Self::InitContract(_), AccountTransactionType::InitContract)
            | (Self::Update(_), AccountTransactionType::Update)
            | (Self::Transfer(_), AccountTransactionType::Transfer) => true,
            (Self::Other(_), transaction_type) => {
                !transaction_type.is_contract()
                    && transaction_type != AccountTransactionType::Transfer
            }
            _ => false,
        }
    }

    /// The JSON string the mobile wallets expect: binary fields as hex and
    /// big integers as plain numbers.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|error| Error::Decode(error.to_string()))
    }
}

/// Signatures by credential index and key index, hex encoded.
pub type AccountTransactionSignature = BTreeMap<u8, BTreeMap<u8, String>>;

/// External implementation of the schema based parameter encoding.
pub trait ParameterCodec {
    fn serialize_init_contract_parameters(
        &self,
        contract_name: &str,
        parameters: &JsonValue,
        schema: &[u8],
        version: Option<SchemaVersion>,
    ) -> Result<Vec<u8>, Error>;

    fn serialize_update_contract_parameters(
        &self,
        contract_name: &str,
        entrypoint_name: &str,
        parameters: &JsonValue,
        schema: &[u8],
        version: Option<SchemaVersion>,
    ) -> Result<Vec<u8>, Error>;

    fn serialize_type_value(&self, parameters: &JsonValue, schema: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Check the shape of a transaction before anything is sent to the wallet:
///
/// * the payload must match the transaction type;
/// * contract transactions must come with typed parameters and their
///   parameter field must be empty;
/// * any other transaction must not come with typed parameters.
pub fn check_transaction(
    transaction_type: AccountTransactionType,
    payload: &AccountTransactionPayload,
    typed_params: Option<&TypedParameters>,
) -> Result<(), Error> {
    if !payload.matches(transaction_type) {
        return Err(Error::PayloadMismatch(transaction_type));
    }

    match payload {
        AccountTransactionPayload::InitContract(init) if !init.param.is_empty() => {
            return Err(Error::ParameterAlreadySet {
                field: "param",
                transaction_type,
            });
        }
        AccountTransactionPayload::Update(update) if !update.message.is_empty() => {
            return Err(Error::ParameterAlreadySet {
                field: "message",
                transaction_type,
            });
        }
        _ => {}
    }

    match (transaction_type.is_contract(), typed_params) {
        (true, None) => Err(Error::MissingTypedParameters(transaction_type)),
        (false, Some(_)) => Err(Error::UnexpectedTypedParameters(transaction_type)),
        _ => Ok(()),
    }
}

/// Encode the typed parameters into the payload field of contract
/// transactions (`param` for `InitContract`, `message` for `Update`).
pub fn serialize_payload_parameters(
    codec: &dyn ParameterCodec,
    transaction_type: AccountTransactionType,
    payload: AccountTransactionPayload,
    typed_params: Option<&TypedParameters>,
) -> Result<AccountTransactionPayload, Error> {
    check_transaction(transaction_type, &payload, typed_params)?;

    match (payload, typed_params) {
        (AccountTransactionPayload::InitContract(mut init), Some(typed)) => {
            init.param = match &typed.schema {
                Schema::Module { value, version } => codec.serialize_init_contract_parameters(
                    &init.init_name,
                    &typed.parameters,
                    value,
                    *version,
                )?,
                Schema::Parameter { value } => {
                    codec.serialize_type_value(&typed.parameters, value)?
                }
            };
            Ok(AccountTransactionPayload::InitContract(init))
        }
        (AccountTransactionPayload::Update(mut update), Some(typed)) => {
            let Some((contract_name, entrypoint_name)) = update.receive_name.split_once('.') else {
                return Err(Error::InvalidReceiveName(update.receive_name.clone()));
            };
            update.message = match &typed.schema {
                Schema::Module { value, version } => codec.serialize_update_contract_parameters(
                    contract_name,
                    entrypoint_name,
                    &typed.parameters,
                    value,
                    *version,
                )?,
                Schema::Parameter { value } => {
                    codec.serialize_type_value(&typed.parameters, value)?
                }
            };
            Ok(AccountTransactionPayload::Update(update))
        }
        (payload, _) => Ok(payload),
    }
}
