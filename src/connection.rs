use async_trait::async_trait;
use std::{
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    error::Error,
    schema::{SignableMessage, TypedParameters},
    transaction::{AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType},
};

/// Identity of a [`WalletConnector`] instance.
///
/// Two connectors of the same kind never share an identifier, so a
/// connection left over from a torn down connector can be told apart from
/// one of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectorId(u64);

impl ConnectorId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a [`WalletConnection`]: the connector that owns it and the
/// backend's identifier of the session (e.g. the WalletConnect topic).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    pub connector: ConnectorId,
    pub session: String,
}

/// A connection to a wallet that has already been established.
///
/// The connected account (and in turn the network) is managed by the wallet
/// and may change during the lifetime of the connection. Register a
/// [`WalletConnectionDelegate`] on the connector to follow these changes.
#[async_trait(?Send)]
pub trait WalletConnection {
    fn key(&self) -> ConnectionKey;

    /// The connector that instantiated this connection, if it's still alive.
    fn connector(&self) -> Option<Rc<dyn WalletConnector>>;

    fn connector_id(&self) -> ConnectorId {
        self.key().connector
    }

    /// The account that the wallet currently associates with this connection.
    fn connected_account(&self) -> Option<String>;

    /// Fails if the wallet no longer considers the session valid.
    async fn ping(&self) -> Result<(), Error>;

    /// Assemble a transaction and send it to the wallet for approval and
    /// submission, returning the hash of the submitted transaction.
    ///
    /// Contract transactions ([`AccountTransactionType::InitContract`] and
    /// [`AccountTransactionType::Update`]) must come with `typed_params` and
    /// an empty parameter field in `payload`. Any other transaction type must
    /// not come with `typed_params`. Both rules are checked before anything
    /// is sent to the wallet.
    async fn sign_and_send_transaction(
        &self,
        account_address: &str,
        transaction_type: AccountTransactionType,
        payload: AccountTransactionPayload,
        typed_params: Option<&TypedParameters>,
    ) -> Result<String, Error>;

    /// Ask the wallet to sign `message` with the keys of the given account.
    async fn sign_message(
        &self,
        account_address: &str,
        message: &SignableMessage,
    ) -> Result<AccountTransactionSignature, Error>;

    /// Close the connection and remove it from its connector.
    ///
    /// Calling this on a connection that is already closed does nothing.
    async fn disconnect(&self) -> Result<(), Error>;
}

/// Wraps the client of a concrete wallet protocol and keeps track of the
/// connections established through it.
#[async_trait(?Send)]
pub trait WalletConnector {
    fn id(&self) -> ConnectorId;

    /// Initiate a new connection.
    ///
    /// Resolves to `None` if the user cancelled before the connection was
    /// established, and fails if the wallet refused it.
    async fn connect(&self) -> Result<Option<Rc<dyn WalletConnection>>, Error>;

    /// All the connections of this connector that haven't been closed.
    fn connections(&self) -> Vec<Rc<dyn WalletConnection>>;

    /// Close all the connections and release the underlying client.
    /// Safe to call multiple times.
    async fn disconnect(&self) -> Result<(), Error>;
}

/// Receiver of the events of all the connections of a connector.
///
/// The methods may be called redundantly, implementations should compare
/// against their current state.
pub trait WalletConnectionDelegate {
    fn on_chain_changed(&self, connection: &Rc<dyn WalletConnection>, genesis_hash: &str);

    fn on_account_changed(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>);

    fn on_connected(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>);

    fn on_disconnected(&self, connection: &Rc<dyn WalletConnection>);
}
