use std::{cell::RefCell, rc::Rc};

use crate::connection::{ConnectionKey, WalletConnection, WalletConnectionDelegate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DelegateEvent {
    ChainChanged(ConnectionKey, String),
    AccountChanged(ConnectionKey, Option<String>),
    Connected(ConnectionKey, Option<String>),
    Disconnected(ConnectionKey),
}

/// Delegate keeping every notification it receives.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    events: RefCell<Vec<DelegateEvent>>,
}

impl RecordingDelegate {
    pub(crate) fn take(&self) -> Vec<DelegateEvent> {
        self.events.take()
    }
}

impl WalletConnectionDelegate for RecordingDelegate {
    fn on_chain_changed(&self, connection: &Rc<dyn WalletConnection>, genesis_hash: &str) {
        self.events.borrow_mut().push(DelegateEvent::ChainChanged(
            connection.key(),
            genesis_hash.to_owned(),
        ));
    }

    fn on_account_changed(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>) {
        self.events.borrow_mut().push(DelegateEvent::AccountChanged(
            connection.key(),
            address.map(str::to_owned),
        ));
    }

    fn on_connected(&self, connection: &Rc<dyn WalletConnection>, address: Option<&str>) {
        self.events.borrow_mut().push(DelegateEvent::Connected(
            connection.key(),
            address.map(str::to_owned),
        ));
    }

    fn on_disconnected(&self, connection: &Rc<dyn WalletConnection>) {
        self.events
            .borrow_mut()
            .push(DelegateEvent::Disconnected(connection.key()));
    }
}
