//! Connected-client registry: who is online and how to reach them.
//!
//! One entry per live connection, inserted at accept and removed when the
//! connection's handler task exits. Delivery goes through each client's
//! outbound channel; the connection task owns the socket and does the
//! actual encoding, so registry sends never block and never fail loudly.

use std::collections::HashMap;

use slither_protocol::{ClientClass, ClientEntry, ClientId, SessionId, Slot, WireMessage};
use tokio::sync::mpsc;

/// Everything the server tracks about one live connection.
pub(crate) struct ClientHandle {
    pub(crate) class: ClientClass,
    /// Writer half of the connection: messages pushed here are encoded
    /// and sent by the connection's own task.
    pub(crate) outbound: mpsc::UnboundedSender<WireMessage>,
    /// Non-embedded clients validate by acknowledging the handshake;
    /// embedded clients by passing tile-size negotiation.
    pub(crate) validated: bool,
    pub(crate) tile_size: Option<i64>,
    pub(crate) slot: Option<Slot>,
    pub(crate) session: Option<SessionId>,
}

/// All connected clients, keyed by their gateway-assigned identity.
pub(crate) struct Registry {
    clients: HashMap<ClientId, ClientHandle>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: ClientId, handle: ClientHandle) {
        self.clients.insert(id, handle);
    }

    pub(crate) fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        self.clients.remove(&id)
    }

    pub(crate) fn get(&self, id: ClientId) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientHandle> {
        self.clients.get_mut(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ClientId, &ClientHandle)> {
        self.clients.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    /// Sends to every connected client. Gone receivers are skipped; their
    /// entries disappear when the owning connection task cleans up.
    pub(crate) fn broadcast(&self, msg: &WireMessage) {
        for handle in self.clients.values() {
            let _ = handle.outbound.send(msg.clone());
        }
    }

    /// Sends to every connected client of one class.
    pub(crate) fn broadcast_to_class(&self, class: ClientClass, msg: &WireMessage) {
        for handle in self.clients.values().filter(|h| h.class == class) {
            let _ = handle.outbound.send(msg.clone());
        }
    }

    /// Rows for a `client_list` reply.
    pub(crate) fn client_list(&self) -> Vec<ClientEntry> {
        self.clients
            .iter()
            .map(|(&id, handle)| ClientEntry {
                id,
                class: handle.class,
                slot: handle.slot,
                session_id: handle.session,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(class: ClientClass) -> (ClientHandle, mpsc::UnboundedReceiver<WireMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ClientHandle {
            class,
            outbound: tx,
            validated: false,
            tile_size: None,
            slot: None,
            session: None,
        };
        (handle, rx)
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let mut registry = Registry::new();
        let (web, mut web_rx) = handle(ClientClass::Web);
        let (esp, mut esp_rx) = handle(ClientClass::Embedded);
        registry.insert(ClientId(1), web);
        registry.insert(ClientId(2), esp);

        registry.broadcast(&WireMessage::Ping);

        assert_eq!(web_rx.try_recv().unwrap(), WireMessage::Ping);
        assert_eq!(esp_rx.try_recv().unwrap(), WireMessage::Ping);
    }

    #[test]
    fn test_broadcast_to_class_filters() {
        let mut registry = Registry::new();
        let (web, mut web_rx) = handle(ClientClass::Web);
        let (esp, mut esp_rx) = handle(ClientClass::Embedded);
        registry.insert(ClientId(1), web);
        registry.insert(ClientId(2), esp);

        registry.broadcast_to_class(ClientClass::Embedded, &WireMessage::Ping);

        assert!(web_rx.try_recv().is_err());
        assert_eq!(esp_rx.try_recv().unwrap(), WireMessage::Ping);
    }

    #[test]
    fn test_client_list_reflects_assignment() {
        let mut registry = Registry::new();
        let (web, _web_rx) = handle(ClientClass::Web);
        registry.insert(ClientId(7), web);
        if let Some(h) = registry.get_mut(ClientId(7)) {
            h.slot = Some(Slot::ONE);
            h.session = Some(SessionId(3));
        }

        let list = registry.client_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, ClientId(7));
        assert_eq!(list[0].class, ClientClass::Web);
        assert_eq!(list[0].slot, Some(Slot::ONE));
        assert_eq!(list[0].session_id, Some(SessionId(3)));
    }

    #[test]
    fn test_broadcast_survives_dropped_receiver() {
        let mut registry = Registry::new();
        let (web, web_rx) = handle(ClientClass::Web);
        let (esp, mut esp_rx) = handle(ClientClass::Embedded);
        registry.insert(ClientId(1), web);
        registry.insert(ClientId(2), esp);
        drop(web_rx);

        registry.broadcast(&WireMessage::Ping);
        assert_eq!(esp_rx.try_recv().unwrap(), WireMessage::Ping);
    }
}
