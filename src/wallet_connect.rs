/*!
[`WalletConnector`] for mobile wallets paired over WalletConnect v2.

WalletConnect doesn't restrict the number of accounts or chains of a single
session. This implementation assumes there is at least one account and always
uses the first one of the `ccd` namespace. The chain is fixed to the network
the connector was created with.
*/

use async_trait::async_trait;
use futures::future::{Either, LocalBoxFuture, join_all, select};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};
use tracing::{debug, error, warn};

use crate::{
    config::RequiredNamespace,
    connection::{
        ConnectionKey, ConnectorId, WalletConnection, WalletConnectionDelegate, WalletConnector,
    },
    error::{BackendError, Error, REJECTED_IN_WALLET_CODE},
    network::{Network, WALLET_CONNECT_SESSION_NAMESPACE},
    schema::{SignableMessage, TypedParameters},
    transaction::{
        AccountTransactionPayload, AccountTransactionSignature, AccountTransactionType,
        ParameterCodec, serialize_payload_parameters,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionNamespace {
    /// `<namespace>:<chain>:<address>`
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// The parts of a WalletConnect session this crate relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub topic: String,
    #[serde(default)]
    pub namespaces: HashMap<String, SessionNamespace>,
}

impl Session {
    pub fn connected_account(&self) -> Option<String> {
        let full_address = self
            .namespaces
            .get(WALLET_CONNECT_SESSION_NAMESPACE)?
            .accounts
            .first()?;
        full_address.rsplit(':').next().map(str::to_owned)
    }
}

/// Events emitted by the sign client.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Event {
        topic: String,
        chain_id: String,
        name: String,
        data: JsonValue,
    },
    Update {
        topic: String,
        namespaces: HashMap<String, SessionNamespace>,
    },
    Delete {
        topic: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisconnectReason {
    pub code: i64,
    pub message: String,
}

impl DisconnectReason {
    pub fn user_disconnecting() -> Self {
        Self {
            code: 1,
            message: "user disconnecting".to_owned(),
        }
    }
}

/// A pairing in progress.
pub struct Pairing {
    /// URI to show to the user (usually as a QR code). `None` when an
    /// existing pairing is reused.
    pub uri: Option<String>,
    /// Resolves once the wallet approves the session.
    pub approval: LocalBoxFuture<'static, Result<Session, Error>>,
}

/// The WalletConnect sign client.
#[async_trait(?Send)]
pub trait SignClient: 'static {
    async fn connect(&self, chain_id: &str, namespace: &RequiredNamespace) -> Result<Pairing, Error>;

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue, Error>;

    async fn ping(&self, topic: &str) -> Result<(), Error>;

    async fn disconnect(&self, topic: &str, reason: &DisconnectReason) -> Result<(), Error>;

    /// Forward all session events to `handler`, in the order they're received.
    fn subscribe(&self, handler: Rc<dyn Fn(SessionEvent)>);

    /// Stop forwarding events.
    fn release(&self);
}

/// Overlay showing the pairing URI to the user.
pub trait PairingModal {
    /// Show the overlay. The returned future resolves if the user closes it
    /// before the pairing completes.
    fn open(&self, uri: &str) -> LocalBoxFuture<'static, ()>;

    fn close(&self);
}

#[derive(Debug, Deserialize)]
struct SignAndSendTransactionResult {
    hash: String,
}

pub struct WalletConnectConnector<C: SignClient> {
    id: ConnectorId,
    client: C,
    modal: Box<dyn PairingModal>,
    codec: Box<dyn ParameterCodec>,
    network: Network,
    namespace: RequiredNamespace,
    delegate: Rc<dyn WalletConnectionDelegate>,
    connections: RefCell<HashMap<String, Rc<WalletConnectConnection<C>>>>,
    this: Weak<Self>,
}

impl<C: SignClient> WalletConnectConnector<C> {
    /// Set up the connector around an initialized client. Events emitted by
    /// the client are handled from here on and forwarded to `delegate`.
    pub fn new(
        client: C,
        modal: Box<dyn PairingModal>,
        codec: Box<dyn ParameterCodec>,
        delegate: Rc<dyn WalletConnectionDelegate>,
        network: Network,
        namespace: RequiredNamespace,
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
                modal,
                codec,
                network,
                namespace,
                delegate,
                connections: RefCell::new(HashMap::new()),
                this: this.clone(),
            }
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn connection(&self, topic: &str) -> Option<Rc<WalletConnectConnection<C>>> {
        self.connections.borrow().get(topic).cloned()
    }

    fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Event {
                topic,
                chain_id,
                name,
                data,
            } => {
                debug!(%topic, %chain_id, %name, %data, "WalletConnect event: session_event");
                if self.connection(&topic).is_none() {
                    error!(%topic, "WalletConnect event 'session_event' received for unknown topic");
                }
            }
            SessionEvent::Update { topic, namespaces } => {
                debug!(%topic, ?namespaces, "WalletConnect event: session_update");
                let Some(connection) = self.connection(&topic) else {
                    error!(%topic, "WalletConnect event 'session_update' received for unknown topic");
                    return;
                };
                connection.session.borrow_mut().namespaces = namespaces;
                let account = connection.connected_account();
                let connection: Rc<dyn WalletConnection> = connection;
                self.delegate
                    .on_account_changed(&connection, account.as_deref());
            }
            SessionEvent::Delete { topic } => {
                debug!(%topic, "WalletConnect event: session_delete");
                if self.connection(&topic).is_none() {
                    error!(%topic, "WalletConnect event 'session_delete' received for unknown topic");
                    return;
                }
                self.on_disconnect(&topic);
            }
        }
    }

    /// Remove the connection of `topic`, notifying the delegate if it was
    /// still there.
    fn on_disconnect(&self, topic: &str) {
        let removed = self.connections.borrow_mut().remove(topic);
        if let Some(connection) = removed {
            let connection: Rc<dyn WalletConnection> = connection;
            self.delegate.on_disconnected(&connection);
        }
    }

    async fn pair(&self, chain_id: &str) -> Result<Option<Session>, Error> {
        let Pairing { uri, approval } = self.client.connect(chain_id, &self.namespace).await?;
        let Some(uri) = uri else {
            // existing pairing, nothing to show
            return approval.await.map(Some);
        };

        let cancelled = self.modal.open(&uri);
        let outcome = select(approval, cancelled).await;
        self.modal.close();
        match outcome {
            Either::Left((session, _)) => session.map(Some),
            Either::Right(((), _)) => {
                debug!(%chain_id, "WalletConnect pairing cancelled");
                Ok(None)
            }
        }
    }
}

#[async_trait(?Send)]
impl<C: SignClient> WalletConnector for WalletConnectConnector<C> {
    fn id(&self) -> ConnectorId {
        self.id
    }

    async fn connect(&self) -> Result<Option<Rc<dyn WalletConnection>>, Error> {
        let chain_id = self.network.chain_id();
        let Some(session) = self.pair(&chain_id).await? else {
            return Ok(None);
        };

        let topic = session.topic.clone();
        let connection = Rc::new(WalletConnectConnection {
            connector: self.this.clone(),
            connector_id: self.id,
            chain_id,
            session: RefCell::new(session),
        });
        self.connections
            .borrow_mut()
            .insert(topic, Rc::clone(&connection));

        let account = connection.connected_account();
        let connection: Rc<dyn WalletConnection> = connection;
        self.delegate.on_connected(&connection, account.as_deref());
        Ok(Some(connection))
    }

    fn connections(&self) -> Vec<Rc<dyn WalletConnection>> {
        self.connections
            .borrow()
            .values()
            .map(|connection| Rc::clone(connection) as Rc<dyn WalletConnection>)
            .collect()
    }

    async fn disconnect(&self) -> Result<(), Error> {
        let connections: Vec<_> = self.connections.borrow().values().cloned().collect();
        let results = join_all(connections.iter().map(|c| c.disconnect())).await;
        self.client.release();
        results.into_iter().collect()
    }
}

/// A WalletConnect session with a mobile wallet.
pub struct WalletConnectConnection<C: SignClient> {
    connector: Weak<WalletConnectConnector<C>>,
    connector_id: ConnectorId,
    chain_id: String,
    session: RefCell<Session>,
}

impl<C: SignClient> WalletConnectConnection<C> {
    pub fn topic(&self) -> String {
        self.session.borrow().topic.clone()
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    fn owner(&self) -> Result<Rc<WalletConnectConnector<C>>, Error> {
        self.connector.upgrade().ok_or(Error::Disconnected)
    }
}

#[async_trait(?Send)]
impl<C: SignClient> WalletConnection for WalletConnectConnection<C> {
    fn key(&self) -> ConnectionKey {
        ConnectionKey {
            connector: self.connector_id,
            session: self.topic(),
        }
    }

    fn connector(&self) -> Option<Rc<dyn WalletConnector>> {
        self.connector
            .upgrade()
            .map(|connector| connector as Rc<dyn WalletConnector>)
    }

    fn connected_account(&self) -> Option<String> {
        self.session.borrow().connected_account()
    }

    async fn ping(&self) -> Result<(), Error> {
        self.owner()?.client.ping(&self.topic()).await
    }

    async fn sign_and_send_transaction(
        &self,
        account_address: &str,
        transaction_type: AccountTransactionType,
        payload: AccountTransactionPayload,
        typed_params: Option<&TypedParameters>,
    ) -> Result<String, Error> {
        let connector = self.owner()?;
        let payload = serialize_payload_parameters(
            connector.codec.as_ref(),
            transaction_type,
            payload,
            typed_params,
        )?;
        let params = json!({
            "type": transaction_type.to_string(),
            "sender": account_address,
            "payload": payload.to_json()?,
            "schema": typed_params.map(|typed| &typed.schema),
        });

        let result = connector
            .client
            .request(
                &self.topic(),
                &self.chain_id,
                "sign_and_send_transaction",
                params,
            )
            .await;
        match result {
            Ok(result) => serde_json::from_value::<SignAndSendTransactionResult>(result)
                .map(|result| result.hash)
                .map_err(|error| Error::Decode(error.to_string())),
            Err(Error::Backend(BackendError {
                code: Some(REJECTED_IN_WALLET_CODE),
                ..
            })) => Err(Error::Rejected),
            Err(error) => Err(error),
        }
    }

    async fn sign_message(
        &self,
        _account_address: &str,
        message: &SignableMessage,
    ) -> Result<AccountTransactionSignature, Error> {
        let SignableMessage::String(message) = message else {
            return Err(Error::UnsupportedMessage("signing binary messages"));
        };
        let connector = self.owner()?;
        let signature = connector
            .client
            .request(
                &self.topic(),
                &self.chain_id,
                "sign_message",
                json!({ "message": message }),
            )
            .await?;
        serde_json::from_value(signature).map_err(|error| Error::Decode(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), Error> {
        let Some(connector) = self.connector.upgrade() else {
            return Ok(());
        };
        let topic = self.topic();
        if connector.connection(&topic).is_none() {
            return Ok(());
        }
        // an expired session is gone on the wallet's side too
        if let Err(error) = connector
            .client
            .disconnect(&topic, &DisconnectReason::user_disconnecting())
            .await
        {
            warn!(%topic, %error, "couldn't close WalletConnect session");
        }
        connector.on_disconnect(&topic);
        Ok(())
    }
}
