/*!
[`WalletConnector`] for the Concordium browser wallet extension.

The extension injects its API into the page and only ever holds a single
connection with a dApp, so the connector has at most one connection. The
extension encodes contract parameters itself from the schema; this connector
only forwards them.
*/

use async_trait::async_trait;
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};
use tracing::{debug, error, warn};

use crate::{
    connection::{
        ConnectionKey, ConnectorId, WalletConnection, WalletConnectionDelegate, WalletConnector,
    },
    error::Error,
    network::Network,
    schema::{SignableMessage, TypedParameters},
    transaction::{
        AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType,
        check_transaction,
    },
};

/// Session identifier of the (only) browser wallet connection.
const SESSION: &str = "browser-wallet";

/// Events emitted by the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserWalletEvent {
    AccountChanged(String),
    AccountDisconnected(String),
    /// genesis hash of the newly selected chain
    ChainChanged(String),
}

/// The API the browser wallet injects into the page.
#[async_trait(?Send)]
pub trait BrowserWalletApi: 'static {
    /// Ask for access to the selected account. Resolves to `None` if the user
    /// didn't grant it.
    async fn connect(&self) -> Result<Option<String>, Error>;

    async fn most_recently_selected_account(&self) -> Result<Option<String>, Error>;

    /// genesis hash of the selected chain
    async fn selected_chain(&self) -> Result<Option<String>, Error>;

    async fn send_transaction(
        &self,
        account_address: &str,
        transaction_type: AccountTransactionType,
        payload: &AccountTransactionPayload,
        typed_params: Option<&TypedParameters>,
    ) -> Result<String, Error>;

    async fn sign_message(
        &self,
        account_address: &str,
        message: &SignableMessage,
    ) -> Result<AccountTransactionSignature, Error>;

    fn subscribe(&self, handler: Rc<dyn Fn(BrowserWalletEvent)>);

    fn release(&self);
}

pub struct BrowserWalletConnector<W: BrowserWalletApi> {
    id: ConnectorId,
    client: W,
    network: Network,
    delegate: Rc<dyn WalletConnectionDelegate>,
    connection: RefCell<Option<Rc<BrowserWalletConnection<W>>>>,
    this: Weak<Self>,
}

impl<W: BrowserWalletApi> BrowserWalletConnector<W> {
    pub fn new(
        client: W,
        delegate: Rc<dyn WalletConnectionDelegate>,
        network: Network,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let events = this.clone();
            client.subscribe(Rc::new(move |event| {
                if let Some(connector) = events.upgrade() {
                    connector.handle_event(event);
                }
            }));

            Self {
                id: ConnectorId::next(),
                client,
                network,
                delegate,
                connection: RefCell::new(None),
                this: this.clone(),
            }
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn client(&self) -> &W {
        &self.client
    }

    fn current(&self) -> Option<Rc<BrowserWalletConnection<W>>> {
        self.connection.borrow().clone()
    }

    fn handle_event(&self, event: BrowserWalletEvent) {
        debug!(?event, "browser wallet event");
        let Some(connection) = self.current() else {
            error!(?event, "browser wallet event received without a connection");
            return;
        };

        match event {
            BrowserWalletEvent::AccountChanged(address) => {
                *connection.account.borrow_mut() = Some(address.clone());
                let connection: Rc<dyn WalletConnection> = connection;
                self.delegate
                    .on_account_changed(&connection, Some(address.as_str()));
            }
            BrowserWalletEvent::AccountDisconnected(address) => {
                let was_connected = {
                    let mut account = connection.account.borrow_mut();
                    if account.as_deref() == Some(address.as_str()) {
                        *account = None;
                        true
                    } else {
                        false
                    }
                };
                if was_connected {
                    let connection: Rc<dyn WalletConnection> = connection;
                    self.delegate.on_account_changed(&connection, None);
                }
            }
            BrowserWalletEvent::ChainChanged(genesis_hash) => {
                let connection: Rc<dyn WalletConnection> = connection;
                self.delegate.on_chain_changed(&connection, &genesis_hash);
            }
        }
    }

    /// Drop `connection` if it's still the current one.
    fn on_disconnect(&self, connection: &BrowserWalletConnection<W>) {
        let removed = {
            let mut current = self.connection.borrow_mut();
            let is_current = current
                .as_deref()
                .is_some_and(|current| std::ptr::eq(current, connection));
            if is_current { current.take() } else { None }
        };
        if let Some(connection) = removed {
            let connection: Rc<dyn WalletConnection> = connection;
            self.delegate.on_disconnected(&connection);
        }
    }
}

#[async_trait(?Send)]
impl<W: BrowserWalletApi> WalletConnector for BrowserWalletConnector<W> {
    fn id(&self) -> ConnectorId {
        self.id
    }

    async fn connect(&self) -> Result<Option<Rc<dyn WalletConnection>>, Error> {
        let Some(account) = self.client.connect().await? else {
            debug!("browser wallet connection was not granted");
            return Ok(None);
        };

        let connection = Rc::new(BrowserWalletConnection {
            connector: self.this.clone(),
            connector_id: self.id,
            account: RefCell::new(Some(account.clone())),
        });
        let replaced = self.connection.replace(Some(Rc::clone(&connection)));
        if let Some(replaced) = replaced {
            let replaced: Rc<dyn WalletConnection> = replaced;
            self.delegate.on_disconnected(&replaced);
        }

        let connection: Rc<dyn WalletConnection> = connection;
        self.delegate.on_connected(&connection, Some(account.as_str()));
        match self.client.selected_chain().await {
            Ok(Some(genesis_hash)) => self.delegate.on_chain_changed(&connection, &genesis_hash),
            Ok(None) => {}
            Err(error) => warn!(%error, "couldn't resolve the chain selected in the browser wallet"),
        }
        Ok(Some(connection))
    }

    fn connections(&self) -> Vec<Rc<dyn WalletConnection>> {
        self.current()
            .into_iter()
            .map(|connection| connection as Rc<dyn WalletConnection>)
            .collect()
    }

    async fn disconnect(&self) -> Result<(), Error> {
        if let Some(connection) = self.current() {
            connection.disconnect().await?;
        }
        self.client.release();
        Ok(())
    }
}

/// The connection with the browser wallet.
///
/// The extension can't be asked to close the connection; disconnecting only
/// makes the dApp stop using it.
pub struct BrowserWalletConnection<W: BrowserWalletApi> {
    connector: Weak<BrowserWalletConnector<W>>,
    connector_id: ConnectorId,
    account: RefCell<Option<String>>,
}

impl<W: BrowserWalletApi> BrowserWalletConnection<W> {
    fn owner(&self) -> Result<Rc<BrowserWalletConnector<W>>, Error> {
        self.connector.upgrade().ok_or(Error::Disconnected)
    }
}

#[async_trait(?Send)]
impl<W: BrowserWalletApi> WalletConnection for BrowserWalletConnection<W> {
    fn key(&self) -> ConnectionKey {
        ConnectionKey {
            connector: self.connector_id,
            session: SESSION.to_owned(),
        }
    }

    fn connector(&self) -> Option<Rc<dyn WalletConnector>> {
        self.connector
            .upgrade()
            .map(|connector| connector as Rc<dyn WalletConnector>)
    }

    fn connected_account(&self) -> Option<String> {
        self.account.borrow().clone()
    }

    async fn ping(&self) -> Result<(), Error> {
        match self.owner()?.client.most_recently_selected_account().await? {
            Some(_) => Ok(()),
            None => Err(Error::Disconnected),
        }
    }

    async fn sign_and_send_transaction(
        &self,
        account_address: &str,
        transaction_type: AccountTransactionType,
        payload: AccountTransactionPayload,
        typed_params: Option<&TypedParameters>,
    ) -> Result<String, Error> {
        check_transaction(transaction_type, &payload, typed_params)?;
        self.owner()?
            .client
            .send_transaction(account_address, transaction_type, &payload, typed_params)
            .await
    }

    async fn sign_message(
        &self,
        account_address: &str,
        message: &SignableMessage,
    ) -> Result<AccountTransactionSignature, Error> {
        self.owner()?
            .client
            .sign_message(account_address, message)
            .await
    }

    async fn disconnect(&self) -> Result<(), Error> {
        if let Some(connector) = self.connector.upgrade() {
            connector.on_disconnect(self);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::{
        network::TESTNET,
        schema::Schema,
        testing::{DelegateEvent, RecordingDelegate},
        transaction::tests::{module_params, update_payload},
    };

    #[derive(Default)]
    struct MockWallet {
        account: RefCell<Option<String>>,
        chain: RefCell<Option<String>>,
        sent: RefCell<Vec<(String, AccountTransactionType)>>,
        handler: RefCell<Option<Rc<dyn Fn(BrowserWalletEvent)>>>,
        released: Cell<usize>,
    }

    impl MockWallet {
        fn emit(&self, event: BrowserWalletEvent) {
            let handler = self.handler.borrow().clone();
            if let Some(handler) = handler {
                handler(event);
            }
        }
    }

    #[async_trait(?Send)]
    impl BrowserWalletApi for MockWallet {
        async fn connect(&self) -> Result<Option<String>, Error> {
            Ok(self.account.borrow().clone())
        }

        async fn most_recently_selected_account(&self) -> Result<Option<String>, Error> {
            Ok(self.account.borrow().clone())
        }

        async fn selected_chain(&self) -> Result<Option<String>, Error> {
            Ok(self.chain.borrow().clone())
        }

        async fn send_transaction(
            &self,
            account_address: &str,
            transaction_type: AccountTransactionType,
            _payload: &AccountTransactionPayload,
            _typed_params: Option<&TypedParameters>,
        ) -> Result<String, Error> {
            self.sent
                .borrow_mut()
                .push((account_address.to_owned(), transaction_type));
            Ok("beef".to_owned())
        }

        async fn sign_message(
            &self,
            _account_address: &str,
            message: &SignableMessage,
        ) -> Result<AccountTransactionSignature, Error> {
            let signed = match message {
                SignableMessage::String(message) => hex::encode(message),
                SignableMessage::Binary { data, .. } => hex::encode(data),
            };
            Ok(serde_json::from_value(json!({ "0": { "0": signed } })).unwrap())
        }

        fn subscribe(&self, handler: Rc<dyn Fn(BrowserWalletEvent)>) {
            *self.handler.borrow_mut() = Some(handler);
        }

        fn release(&self) {
            self.released.set(self.released.get() + 1);
        }
    }

    fn connector(
        account: Option<&str>,
    ) -> (Rc<BrowserWalletConnector<MockWallet>>, Rc<RecordingDelegate>) {
        let wallet = MockWallet::default();
        *wallet.account.borrow_mut() = account.map(str::to_owned);
        *wallet.chain.borrow_mut() = Some(TESTNET.genesis_hash.to_string());
        let delegate = Rc::new(RecordingDelegate::default());
        let connector = BrowserWalletConnector::new(
            wallet,
            Rc::clone(&delegate) as Rc<dyn WalletConnectionDelegate>,
            TESTNET,
        );
        (connector, delegate)
    }

    #[test]
    fn connect_not_granted() {
        let (connector, delegate) = connector(None);
        assert!(block_on(connector.connect()).unwrap().is_none());
        assert!(connector.connections().is_empty());
        assert!(delegate.take().is_empty());
    }

    #[test]
    fn connect_and_events() {
        let (connector, delegate) = connector(Some("alice"));
        let connection = block_on(connector.connect()).unwrap().unwrap();
        let key = connection.key();

        assert_eq!(connection.connector_id(), connector.id());
        assert_eq!(connector.connections().len(), 1);
        assert_eq!(
            delegate.take(),
            vec![
                DelegateEvent::Connected(key.clone(), Some("alice".to_owned())),
                DelegateEvent::ChainChanged(key.clone(), TESTNET.genesis_hash.to_string()),
            ]
        );

        let wallet = connector.client();
        wallet.emit(BrowserWalletEvent::AccountChanged("bob".to_owned()));
        // not the connected account anymore
        wallet.emit(BrowserWalletEvent::AccountDisconnected("alice".to_owned()));
        wallet.emit(BrowserWalletEvent::AccountDisconnected("bob".to_owned()));
        assert_eq!(connection.connected_account(), None);
        assert_eq!(
            delegate.take(),
            vec![
                DelegateEvent::AccountChanged(key.clone(), Some("bob".to_owned())),
                DelegateEvent::AccountChanged(key, None),
            ]
        );
    }

    #[test]
    fn events_without_connection_are_ignored() {
        let (connector, delegate) = connector(Some("alice"));
        connector
            .client()
            .emit(BrowserWalletEvent::ChainChanged("abcd".to_owned()));
        assert!(delegate.take().is_empty());
    }

    #[test]
    fn disconnect_twice() {
        let (connector, delegate) = connector(Some("alice"));
        let connection = block_on(connector.connect()).unwrap().unwrap();
        delegate.take();

        block_on(connection.disconnect()).unwrap();
        assert!(connector.connections().is_empty());
        block_on(connection.disconnect()).unwrap();

        assert_eq!(
            delegate.take(),
            vec![DelegateEvent::Disconnected(connection.key())]
        );

        block_on(connector.disconnect()).unwrap();
        block_on(connector.disconnect()).unwrap();
        assert_eq!(connector.client().released.get(), 2);
    }

    #[test]
    fn reconnect_replaces_connection() {
        let (connector, delegate) = connector(Some("alice"));
        let first = block_on(connector.connect()).unwrap().unwrap();
        let second = block_on(connector.connect()).unwrap().unwrap();
        assert_eq!(connector.connections().len(), 1);
        assert!(delegate.take().contains(&DelegateEvent::Disconnected(first.key())));

        // the stale connection no longer owns anything
        block_on(first.disconnect()).unwrap();
        assert_eq!(connector.connections().len(), 1);
        assert!(delegate.take().is_empty());
        drop(second);
    }

    #[test]
    fn transactions_are_checked_before_sending() {
        let (connector, _) = connector(Some("alice"));
        let connection = block_on(connector.connect()).unwrap().unwrap();

        let missing = block_on(connection.sign_and_send_transaction(
            "alice",
            AccountTransactionType::Update,
            update_payload(Vec::new()),
            None,
        ));
        assert_eq!(
            missing,
            Err(Error::MissingTypedParameters(AccountTransactionType::Update))
        );
        assert!(connector.client().sent.borrow().is_empty());

        let hash = block_on(connection.sign_and_send_transaction(
            "alice",
            AccountTransactionType::Update,
            update_payload(Vec::new()),
            Some(&module_params()),
        ))
        .unwrap();
        assert_eq!(hash, "beef");
        assert_eq!(
            *connector.client().sent.borrow(),
            vec![("alice".to_owned(), AccountTransactionType::Update)]
        );
    }

    #[test]
    fn sign_binary_message() {
        let (connector, _) = connector(Some("alice"));
        let connection = block_on(connector.connect()).unwrap().unwrap();
        let message = SignableMessage::Binary {
            data: vec![0xab],
            schema: Schema::Parameter { value: vec![2] },
        };
        let signature = block_on(connection.sign_message("alice", &message)).unwrap();
        assert_eq!(signature[&0][&0], "ab");
    }

    #[test]
    fn ping() {
        let (connector, _) = connector(Some("alice"));
        let connection = block_on(connector.connect()).unwrap().unwrap();
        assert_eq!(block_on(connection.ping()), Ok(()));

        *connector.client().account.borrow_mut() = None;
        assert_eq!(block_on(connection.ping()), Err(Error::Disconnected));
    }
}
