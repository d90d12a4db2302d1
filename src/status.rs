/*!
State derived for the UI from the active connector and connection.

Nothing here talks to a wallet by itself: the functions and types only combine
what the connectors report, and convert errors into strings that can be shown
to the user.
*/

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};
use tracing::debug;

use crate::{
    connection::{ConnectionKey, WalletConnection, WalletConnectionDelegate, WalletConnector},
    error::error_string,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorType {
    BrowserWallet,
    WalletConnect,
}

/// Status of a connector type, e.g. for rendering the button that selects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectorTypeStatus {
    /// the active connector is of this type
    pub is_active: bool,
    /// active, and the connection was created by the active connector
    pub is_connected: bool,
    /// another connector type is active and has a connection
    pub is_other_connected: bool,
}

/// Compute the status of `connector_type`.
///
/// The connection only makes the type connected if it originates from
/// `active_connector` itself: a connection left over from a previous
/// connector of the same type doesn't count.
pub fn connector_type_status(
    connector_type: ConnectorType,
    connection: Option<&dyn WalletConnection>,
    active_connector_type: Option<ConnectorType>,
    active_connector: Option<&dyn WalletConnector>,
) -> ConnectorTypeStatus {
    let is_active = active_connector_type == Some(connector_type);
    let is_connected = is_active
        && match (connection, active_connector) {
            (Some(connection), Some(connector)) => connection.connector_id() == connector.id(),
            _ => false,
        };
    let is_other_connected = !is_active && active_connector_type.is_some() && connection.is_some();
    ConnectorTypeStatus {
        is_active,
        is_connected,
        is_other_connected,
    }
}

/// Delegate keeping the account and chain of every open connection.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    accounts: RefCell<HashMap<ConnectionKey, Option<String>>>,
    genesis_hashes: RefCell<HashMap<ConnectionKey, String>>,
}

impl ConnectionTracker {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn account(&self, key: &ConnectionKey) -> Option<String> {
        self.accounts.borrow().get(key).cloned().flatten()
    }

    /// Hash of the genesis block of the chain the connected account lives on.
    pub fn genesis_hash(&self, key: &ConnectionKey) -> Option<String> {
        self.genesis_hashes.borrow().get(key).cloned()
    }
}

impl WalletConnectionDelegate for ConnectionTracker {
    fn on_chain_changed(&self, connection: &Rc<dyn WalletConnection>, genesis_hash: &str) {
        self.genesis_hashes
            .borrow_mut()
            .insert(connection.key(), genesis_hash.to_owned());
    }

    fn on_account_changed(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>) {
        self.accounts
            .borrow_mut()
            .insert(connection.key(), address.map(str::to_owned));
    }

    fn on_connected(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>) {
        self.on_account_changed(connection, address);
    }

    fn on_disconnected(&self, connection: &Rc<dyn WalletConnection>) {
        let key = connection.key();
        self.accounts.borrow_mut().remove(&key);
        self.genesis_hashes.borrow_mut().remove(&key);
    }
}

/// The connection the UI currently works with.
#[derive(Default)]
pub struct ActiveConnection {
    connection: Option<Rc<dyn WalletConnection>>,
}

impl ActiveConnection {
    /// Start out with the first open connection of `connector`, if any.
    pub fn for_connector(connector: Option<&dyn WalletConnector>) -> Self {
        let connection = connector.and_then(|c| c.connections().into_iter().next());
        Self { connection }
    }

    pub fn connection(&self) -> Option<&Rc<dyn WalletConnection>> {
        self.connection.as_ref()
    }

    pub fn set_connection(&mut self, connection: Option<Rc<dyn WalletConnection>>) {
        self.connection = connection;
    }

    pub fn account(&self, tracker: &ConnectionTracker) -> Option<String> {
        tracker.account(&self.connection.as_ref()?.key())
    }

    pub fn genesis_hash(&self, tracker: &ConnectionTracker) -> Option<String> {
        tracker.genesis_hash(&self.connection.as_ref()?.key())
    }
}

/// Counts an operation as running for as long as it's alive.
struct Busy<'a>(&'a Cell<usize>);

impl<'a> Busy<'a> {
    fn start(running: &'a Cell<usize>) -> Self {
        running.set(running.get() + 1);
        Self(running)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// The action of connecting through a connector.
#[derive(Debug, Default)]
pub struct ConnectAction {
    connecting: Cell<usize>,
}

impl ConnectAction {
    /// Whether any connect started through this action is still running.
    pub fn is_connecting(&self) -> bool {
        self.connecting.get() > 0
    }

    /// Connect through `connector`. Resolves to `Ok(None)` if the user
    /// cancelled; errors come back as display strings.
    pub async fn connect(
        &self,
        connector: &dyn WalletConnector,
    ) -> Result<Option<Rc<dyn WalletConnection>>, String> {
        let _busy = Busy::start(&self.connecting);
        connector.connect().await.map_err(|error| {
            debug!(%error, "connecting failed");
            error_string(&error)
        })
    }
}

/// The action of closing a connection.
#[derive(Debug, Default)]
pub struct DisconnectAction {
    disconnecting: Cell<usize>,
}

impl DisconnectAction {
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.get() > 0
    }

    pub async fn disconnect(
        &self,
        connection: Option<&Rc<dyn WalletConnection>>,
    ) -> Result<(), String> {
        let Some(connection) = connection else {
            return Err("no connection to disconnect".to_owned());
        };
        let _busy = Busy::start(&self.disconnecting);
        connection.disconnect().await.map_err(|error| {
            debug!(%error, "disconnecting failed");
            error_string(&error)
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::{channel::oneshot, executor::block_on};
    use std::{collections::VecDeque, pin::pin, rc::Weak};

    use super::*;
    use crate::{
        connection::ConnectorId,
        error::{BackendError, Error},
        schema::{SignableMessage, TypedParameters},
        transaction::{
            AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType,
        },
    };

    struct StubConnector {
        id: ConnectorId,
        connections: RefCell<Vec<Rc<dyn WalletConnection>>>,
        /// outcome of the next connect
        refuse: Cell<bool>,
        /// each connect waits for the next gate, if there is one
        gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
        this: Weak<Self>,
    }

    impl StubConnector {
        fn new() -> Rc<Self> {
            Rc::new_cyclic(|this| Self {
                id: ConnectorId::next(),
                connections: RefCell::new(Vec::new()),
                refuse: Cell::new(false),
                gates: RefCell::new(VecDeque::new()),
                this: this.clone(),
            })
        }
    }

    #[async_trait(?Send)]
    impl WalletConnector for StubConnector {
        fn id(&self) -> ConnectorId {
            self.id
        }

        async fn connect(&self) -> Result<Option<Rc<dyn WalletConnection>>, Error> {
            let gate = self.gates.borrow_mut().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if self.refuse.get() {
                return Err(Error::Backend(BackendError {
                    code: Some(5000),
                    message: "user rejected".to_owned(),
                }));
            }
            let connection: Rc<dyn WalletConnection> = Rc::new(StubConnection {
                connector: self.this.clone(),
                connector_id: self.id,
                session: format!("session-{}", self.connections.borrow().len()),
            });
            self.connections.borrow_mut().push(Rc::clone(&connection));
            Ok(Some(connection))
        }

        fn connections(&self) -> Vec<Rc<dyn WalletConnection>> {
            self.connections.borrow().clone()
        }

        async fn disconnect(&self) -> Result<(), Error> {
            self.connections.borrow_mut().clear();
            Ok(())
        }
    }

    struct StubConnection {
        connector: Weak<StubConnector>,
        connector_id: ConnectorId,
        session: String,
    }

    #[async_trait(?Send)]
    impl WalletConnection for StubConnection {
        fn key(&self) -> ConnectionKey {
            ConnectionKey {
                connector: self.connector_id,
                session: self.session.clone(),
            }
        }

        fn connector(&self) -> Option<Rc<dyn WalletConnector>> {
            self.connector
                .upgrade()
                .map(|connector| connector as Rc<dyn WalletConnector>)
        }

        fn connected_account(&self) -> Option<String> {
            None
        }

        async fn ping(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn sign_and_send_transaction(
            &self,
            _account_address: &str,
            _transaction_type: AccountTransactionType,
            _payload: AccountTransactionPayload,
            _typed_params: Option<&TypedParameters>,
        ) -> Result<String, Error> {
            Err(Error::Rejected)
        }

        async fn sign_message(
            &self,
            _account_address: &str,
            _message: &SignableMessage,
        ) -> Result<AccountTransactionSignature, Error> {
            Err(Error::Rejected)
        }

        async fn disconnect(&self) -> Result<(), Error> {
            Err(Error::Disconnected)
        }
    }

    #[test]
    fn status_requires_type_and_connector_match() {
        let active = StubConnector::new();
        let previous = StubConnector::new();
        let current = block_on(active.connect()).unwrap().unwrap();
        let stale = block_on(previous.connect()).unwrap().unwrap();
        let active: &dyn WalletConnector = active.as_ref();

        let status = connector_type_status(
            ConnectorType::BrowserWallet,
            Some(current.as_ref()),
            Some(ConnectorType::BrowserWallet),
            Some(active),
        );
        assert_eq!(
            status,
            ConnectorTypeStatus {
                is_active: true,
                is_connected: true,
                is_other_connected: false,
            }
        );

        // same type, connection from another connector instance
        let status = connector_type_status(
            ConnectorType::BrowserWallet,
            Some(stale.as_ref()),
            Some(ConnectorType::BrowserWallet),
            Some(active),
        );
        assert!(status.is_active);
        assert!(!status.is_connected);

        // same connector, other type selected
        let status = connector_type_status(
            ConnectorType::WalletConnect,
            Some(current.as_ref()),
            Some(ConnectorType::BrowserWallet),
            Some(active),
        );
        assert_eq!(
            status,
            ConnectorTypeStatus {
                is_active: false,
                is_connected: false,
                is_other_connected: true,
            }
        );

        let status = connector_type_status(ConnectorType::WalletConnect, None, None, None);
        assert_eq!(status, ConnectorTypeStatus::default());
    }

    #[test]
    fn tracker_follows_delegate_events() {
        let connector = StubConnector::new();
        let connection = block_on(connector.connect()).unwrap().unwrap();
        let tracker = ConnectionTracker::new();
        let key = connection.key();

        tracker.on_connected(&connection, Some("alice"));
        tracker.on_chain_changed(&connection, "4221332d");
        assert_eq!(tracker.account(&key).as_deref(), Some("alice"));
        assert_eq!(tracker.genesis_hash(&key).as_deref(), Some("4221332d"));

        tracker.on_account_changed(&connection, None);
        assert_eq!(tracker.account(&key), None);

        tracker.on_disconnected(&connection);
        assert_eq!(tracker.genesis_hash(&key), None);
    }

    #[test]
    fn active_connection_starts_with_first_connection() {
        let connector = StubConnector::new();
        assert!(
            ActiveConnection::for_connector(Some(connector.as_ref() as &dyn WalletConnector))
                .connection()
                .is_none()
        );
        assert!(ActiveConnection::for_connector(None).connection().is_none());

        let first = block_on(connector.connect()).unwrap().unwrap();
        block_on(connector.connect()).unwrap().unwrap();
        let tracker = ConnectionTracker::new();
        tracker.on_connected(&first, Some("alice"));

        let mut active =
            ActiveConnection::for_connector(Some(connector.as_ref() as &dyn WalletConnector));
        assert_eq!(active.connection().unwrap().key(), first.key());
        assert_eq!(active.account(&tracker).as_deref(), Some("alice"));

        active.set_connection(None);
        assert_eq!(active.account(&tracker), None);
    }

    #[test]
    fn actions_report_errors_as_strings() {
        let connector = StubConnector::new();
        let connect = ConnectAction::default();
        let disconnect = DisconnectAction::default();

        let connection = block_on(connect.connect(connector.as_ref())).unwrap();
        assert!(connection.is_some());
        assert!(!connect.is_connecting());

        connector.refuse.set(true);
        assert_eq!(
            block_on(connect.connect(connector.as_ref())).err().unwrap(),
            "user rejected (code 5000)"
        );
        assert!(!connect.is_connecting());

        assert_eq!(
            block_on(disconnect.disconnect(None)),
            Err("no connection to disconnect".to_owned())
        );
        assert_eq!(
            block_on(disconnect.disconnect(connection.as_ref())),
            Err("connection has already been closed".to_owned())
        );
        assert!(!disconnect.is_disconnecting());
    }

    #[test]
    fn overlapping_connects() {
        let connector = StubConnector::new();
        let connect = ConnectAction::default();
        let (open_first, first_gate) = oneshot::channel();
        let (open_second, second_gate) = oneshot::channel();
        connector
            .gates
            .borrow_mut()
            .extend([first_gate, second_gate]);

        block_on(async {
            let mut first = pin!(connect.connect(connector.as_ref()));
            let mut second = pin!(connect.connect(connector.as_ref()));
            assert!(futures::poll!(first.as_mut()).is_pending());
            assert!(futures::poll!(second.as_mut()).is_pending());
            assert!(connect.is_connecting());

            open_first.send(()).unwrap();
            assert!(first.await.unwrap().is_some());
            assert!(connect.is_connecting());

            open_second.send(()).unwrap();
            assert!(second.await.unwrap().is_some());
        });

        assert!(!connect.is_connecting());
        assert_eq!(connector.connections().len(), 2);
    }
}
