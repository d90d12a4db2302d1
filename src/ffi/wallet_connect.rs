use async_trait::async_trait;
use futures::{
    channel::oneshot,
    future::{FutureExt as _, LocalBoxFuture},
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::{cell::RefCell, collections::HashMap, rc::Rc};
use tracing::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use super::{WebSdkCodec, from_js_json, method, to_js};
use crate::{
    config::{RequiredNamespace, WalletConnectOptions},
    connection::WalletConnectionDelegate,
    error::Error,
    network::{Network, WALLET_CONNECT_SESSION_NAMESPACE},
    wallet_connect::{
        DisconnectReason, PairingModal, Pairing, Session, SessionEvent, SessionNamespace,
        SignClient, WalletConnectConnector,
    },
};

#[wasm_bindgen(module = "@walletconnect/sign-client")]
extern "C" {
    #[derive(Clone)]
    #[wasm_bindgen(js_name = "default")]
    pub type SignClientJs;

    #[wasm_bindgen(static_method_of = SignClientJs, js_class = "default", catch)]
    pub async fn init(options: JsValue) -> Result<SignClientJs, JsValue>;

    /// Resolves to `{ uri, approval }` where `approval` is a function
    /// returning a promise for the session.
    #[wasm_bindgen(method, catch)]
    pub async fn connect(this: &SignClientJs, params: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub async fn request(this: &SignClientJs, params: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub async fn ping(this: &SignClientJs, params: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch)]
    pub async fn disconnect(this: &SignClientJs, params: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method)]
    pub fn on(this: &SignClientJs, event: &str, handler: &js_sys::Function);

    #[wasm_bindgen(method, js_name = "removeListener")]
    pub fn remove_listener(this: &SignClientJs, event: &str, handler: &js_sys::Function);
}

#[wasm_bindgen(module = "@walletconnect/qrcode-modal")]
extern "C" {
    pub type QrCodeModalJs;

    #[wasm_bindgen(thread_local_v2, js_name = "default")]
    static QR_CODE_MODAL: QrCodeModalJs;

    /// `on_close` is invoked when the user closes the modal.
    #[wasm_bindgen(method)]
    pub fn open(this: &QrCodeModalJs, uri: &str, on_close: &JsValue);

    #[wasm_bindgen(method)]
    pub fn close(this: &QrCodeModalJs);
}

const SESSION_EVENT: &str = "session_event";
const SESSION_UPDATE: &str = "session_update";
const SESSION_DELETE: &str = "session_delete";

/// The QR code modal of WalletConnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrCodeModal;

impl PairingModal for QrCodeModal {
    fn open(&self, uri: &str) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        let on_close = Closure::once_into_js(move || {
            // the pairing may have completed already
            let _ = sender.send(());
        });
        QR_CODE_MODAL.with(|modal| modal.open(uri, &on_close));
        async move {
            if receiver.await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
        .boxed_local()
    }

    fn close(&self) {
        QR_CODE_MODAL.with(|modal| modal.close());
    }
}

#[derive(Deserialize)]
struct EventPayload {
    topic: String,
    params: EventParams,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventParams {
    chain_id: String,
    event: NamedEvent,
}

#[derive(Deserialize)]
struct NamedEvent {
    name: String,
    #[serde(default)]
    data: JsonValue,
}

#[derive(Deserialize)]
struct UpdatePayload {
    topic: String,
    params: UpdateParams,
}

#[derive(Deserialize)]
struct UpdateParams {
    namespaces: HashMap<String, SessionNamespace>,
}

#[derive(Deserialize)]
struct DeletePayload {
    topic: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Event,
    Update,
    Delete,
}

impl EventKind {
    fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            SESSION_EVENT => Ok(Self::Event),
            SESSION_UPDATE => Ok(Self::Update),
            SESSION_DELETE => Ok(Self::Delete),
            _ => Err(Error::Decode(format!("unknown WalletConnect event `{name}`"))),
        }
    }
}

fn decode_event(name: &str, payload: JsValue) -> Result<SessionEvent, Error> {
    match EventKind::from_name(name)? {
        EventKind::Event => {
            let EventPayload { topic, params } = from_js_json(payload)?;
            Ok(SessionEvent::Event {
                topic,
                chain_id: params.chain_id,
                name: params.event.name,
                data: params.event.data,
            })
        }
        EventKind::Update => {
            let UpdatePayload { topic, params } = from_js_json(payload)?;
            Ok(SessionEvent::Update {
                topic,
                namespaces: params.namespaces,
            })
        }
        EventKind::Delete => {
            let DeletePayload { topic } = from_js_json(payload)?;
            Ok(SessionEvent::Delete { topic })
        }
    }
}

/// The WalletConnect v2 sign client.
pub struct WalletConnectClient {
    client: SignClientJs,
    listeners: RefCell<Vec<(&'static str, Closure<dyn Fn(JsValue)>)>>,
}

impl WalletConnectClient {
    pub async fn init(options: &WalletConnectOptions) -> Result<Self, Error> {
        let client = SignClientJs::init(to_js(options)?)
            .await
            .map_err(Error::from_js)?;
        Ok(Self {
            client,
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Initialize a client from `options` and set up a connector around it
    /// for connecting to wallets on `network`.
    ///
    /// [`CONCORDIUM_WALLET_CONNECT_PROJECT_ID`] may be used as project ID by
    /// dApps without a WalletConnect Cloud project of their own.
    ///
    /// [`CONCORDIUM_WALLET_CONNECT_PROJECT_ID`]: crate::config::CONCORDIUM_WALLET_CONNECT_PROJECT_ID
    pub async fn connector(
        options: &WalletConnectOptions,
        delegate: Rc<dyn WalletConnectionDelegate>,
        network: Network,
    ) -> Result<Rc<WalletConnectConnector<Self>>, Error> {
        let client = Self::init(options).await?;
        Ok(WalletConnectConnector::new(
            client,
            Box::new(QrCodeModal),
            Box::new(WebSdkCodec),
            delegate,
            network,
            RequiredNamespace::default(),
        ))
    }
}

async fn approve(approval: js_sys::Function) -> Result<Session, Error> {
    let promise = approval.call0(&JsValue::UNDEFINED).map_err(Error::from_js)?;
    let session = JsFuture::from(js_sys::Promise::resolve(&promise))
        .await
        .map_err(Error::from_js)?;
    from_js_json(session)
}

#[async_trait(?Send)]
impl SignClient for WalletConnectClient {
    async fn connect(&self, chain_id: &str, namespace: &RequiredNamespace) -> Result<Pairing, Error> {
        let params = to_js(&json!({
            "requiredNamespaces": {
                WALLET_CONNECT_SESSION_NAMESPACE: {
                    "methods": namespace.methods,
                    "chains": [chain_id],
                    "events": namespace.events,
                },
            },
        }))?;
        let result = self.client.connect(params).await.map_err(Error::from_js)?;
        let uri = js_sys::Reflect::get(&result, &JsValue::from_str("uri"))
            .ok()
            .and_then(|uri| uri.as_string());
        let approval = method(&result, "approval")
            .ok_or_else(|| Error::Decode("pairing without approval".to_owned()))?;
        Ok(Pairing {
            uri,
            approval: approve(approval).boxed_local(),
        })
    }

    async fn request(
        &self,
        topic: &str,
        chain_id: &str,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue, Error> {
        let request = to_js(&json!({
            "topic": topic,
            "request": { "method": method, "params": params },
            "chainId": chain_id,
        }))?;
        let result = self.client.request(request).await.map_err(Error::from_js)?;
        from_js_json(result)
    }

    async fn ping(&self, topic: &str) -> Result<(), Error> {
        self.client
            .ping(to_js(&json!({ "topic": topic }))?)
            .await
            .map_err(Error::from_js)?;
        Ok(())
    }

    async fn disconnect(&self, topic: &str, reason: &DisconnectReason) -> Result<(), Error> {
        self.client
            .disconnect(to_js(&json!({ "topic": topic, "reason": reason }))?)
            .await
            .map_err(Error::from_js)?;
        Ok(())
    }

    fn subscribe(&self, handler: Rc<dyn Fn(SessionEvent)>) {
        let mut listeners = self.listeners.borrow_mut();
        for name in [SESSION_EVENT, SESSION_UPDATE, SESSION_DELETE] {
            let handler = Rc::clone(&handler);
            let listener = Closure::<dyn Fn(JsValue)>::new(move |payload: JsValue| {
                match decode_event(name, payload) {
                    Ok(event) => handler(event),
                    Err(error) => error!(event = name, %error, "couldn't decode WalletConnect event"),
                }
            });
            self.client.on(name, listener.as_ref().unchecked_ref());
            listeners.push((name, listener));
        }
        debug!("subscribed to WalletConnect session events");
    }

    fn release(&self) {
        for (name, listener) in self.listeners.borrow_mut().drain(..) {
            self.client
                .remove_listener(name, listener.as_ref().unchecked_ref());
        }
    }
}
