/*!

# Concordium wallet connectors

This library is meant to be used by web applications (dApps) that need to interact with
Concordium wallets. It provides a single interface for two kinds of wallets:

- the Concordium browser wallet extension ([`BrowserWalletConnector`]);
- mobile wallets paired over WalletConnect v2 ([`WalletConnectConnector`]).

## Features

- Connect to a wallet and follow the account and chain it selects
- Sign and send transactions, including contract invocations with schema encoded parameters
- Sign messages
- Look up contracts and the schema embedded into their module
- Derive the UI state of the connectors

## Usage

A connector is created with a [`WalletConnectionDelegate`] receiving the events of all
its connections. [`ConnectionTracker`] is a delegate that keeps the account and chain of
each connection:

```no_run
use concordium_wallet_connectors::{
    ConnectionTracker, TESTNET, WalletConnection as _, WalletConnector as _, ffi::BrowserWallet,
};

# async fn test() -> anyhow::Result<()> {
let tracker = ConnectionTracker::new();
let connector = BrowserWallet::connector(tracker.clone(), TESTNET)?;
if let Some(connection) = connector.connect().await? {
    println!("connected to {:?}", tracker.account(&connection.key()));
}
# Ok(()) }
```

Contract transactions take their parameters as [`TypedParameters`]: the parameters as
JSON and the schema describing how to encode them.

```no_run
# use concordium_wallet_connectors::*;
#
# async fn test(connection: std::rc::Rc<dyn WalletConnection>) -> anyhow::Result<()> {
let schema = Schema::module_from_base64("//8CAQAAAAoAAABwaWdneV9iYW5r", None)?;
let payload = AccountTransactionPayload::Update(UpdateContractPayload {
    amount: CcdAmount::from_micro_ccd(1_000_000),
    address: ContractAddress { index: 2059, subindex: 0 },
    receive_name: "piggy_bank.insert".to_owned(),
    message: Vec::new(),
    max_contract_execution_energy: 30_000,
});
let params = typed_params(serde_json::json!({}), Some(schema));
let hash = connection
    .sign_and_send_transaction("<account>", AccountTransactionType::Update, payload, params.as_ref())
    .await?;
println!("{}", TESTNET.transaction_url(&hash));
# Ok(()) }
```

*/

pub mod browser_wallet;
pub mod config;
mod connection;
pub mod contract;
pub mod error;
pub mod ffi;
pub mod network;
pub mod schema;
pub mod section;
pub mod status;
#[cfg(test)]
mod testing;
pub mod transaction;
pub mod wallet_connect;

pub use self::{
    browser_wallet::BrowserWalletConnector,
    config::{CONCORDIUM_WALLET_CONNECT_PROJECT_ID, WalletConnectOptions},
    connection::{
        ConnectionKey, ConnectorId, WalletConnection, WalletConnectionDelegate, WalletConnector,
    },
    error::{Error, error_string},
    network::{MAINNET, Network, TESTNET},
    schema::{Schema, SchemaVersion, SignableMessage, TypedParameters, typed_params},
    status::{ConnectionTracker, ConnectorType, ConnectorTypeStatus, connector_type_status},
    transaction::{
        AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType, CcdAmount,
        ContractAddress, UpdateContractPayload,
    },
    wallet_connect::WalletConnectConnector,
};
