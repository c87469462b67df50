use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::join_path;
use crate::last_segment;
use crate::parent_path;
use crate::ConnectionState;
use crate::CoordinationClient;
use crate::CreateMode;
use crate::ServiceError;
use crate::ServiceResult;
use crate::SessionEvent;

pub type SessionId = u64;

#[derive(Debug)]
struct Node {
    data: Bytes,
    ephemeral_owner: Option<SessionId>,
    children: BTreeSet<String>,
    /// Next suffix handed to a sequential child
    next_sequence: u64,
}

impl Node {
    fn new(
        data: Bytes,
        ephemeral_owner: Option<SessionId>,
    ) -> Self {
        Self {
            data,
            ephemeral_owner,
            children: BTreeSet::new(),
            next_sequence: 1,
        }
    }
}

#[derive(Debug)]
struct SessionSlot {
    events: mpsc::UnboundedSender<SessionEvent>,
    connected: bool,
    child_watches: HashSet<String>,
    data_watches: HashSet<String>,
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<String, Node>,
    sessions: HashMap<SessionId, SessionSlot>,
    next_session: SessionId,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Bytes::new(), None));
        Self {
            nodes,
            sessions: HashMap::new(),
            next_session: 1,
        }
    }

    fn open_session(
        &mut self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionId {
        let id = self.next_session;
        self.next_session += 1;
        self.sessions.insert(
            id,
            SessionSlot {
                events,
                connected: true,
                child_watches: HashSet::new(),
                data_watches: HashSet::new(),
            },
        );
        id
    }

    fn check_session(
        &self,
        id: SessionId,
    ) -> ServiceResult<()> {
        match self.sessions.get(&id) {
            Some(slot) if slot.connected => Ok(()),
            Some(_) => Err(ServiceError::ConnectionLoss),
            None => Err(ServiceError::SessionExpired),
        }
    }

    fn session_mut(
        &mut self,
        id: SessionId,
    ) -> ServiceResult<&mut SessionSlot> {
        self.sessions.get_mut(&id).ok_or(ServiceError::SessionExpired)
    }

    fn fire_children(
        &mut self,
        path: &str,
    ) {
        for slot in self.sessions.values_mut() {
            if slot.child_watches.remove(path) {
                let _ = slot.events.send(SessionEvent::children_changed(path));
            }
        }
    }

    fn fire_data(
        &mut self,
        path: &str,
    ) {
        for slot in self.sessions.values_mut() {
            if slot.data_watches.remove(path) {
                let _ = slot.events.send(SessionEvent::data_changed(path));
            }
        }
    }

    fn create(
        &mut self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        owner: SessionId,
    ) -> ServiceResult<String> {
        let parent = parent_path(path).ok_or_else(|| ServiceError::NodeExists(path.to_string()))?;
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| ServiceError::NoNode(path.to_string()))?;
        if parent_node.ephemeral_owner.is_some() {
            return Err(ServiceError::Other(format!(
                "ephemeral node {parent} can not have children"
            )));
        }

        let actual = if mode.is_sequential() {
            let sequence = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{path}{sequence:010}")
        } else {
            path.to_string()
        };

        if self.nodes.contains_key(&actual) {
            return Err(ServiceError::NodeExists(actual));
        }

        let ephemeral_owner = mode.is_ephemeral().then_some(owner);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.insert(last_segment(&actual).to_string());
        }
        self.nodes.insert(actual.clone(), Node::new(data, ephemeral_owner));
        trace!(path = %actual, ?mode, "Node created");

        self.fire_children(parent);
        Ok(actual)
    }

    fn delete(
        &mut self,
        path: &str,
    ) -> ServiceResult<()> {
        let parent = parent_path(path)
            .ok_or_else(|| ServiceError::Other("the root node can not be deleted".to_string()))?;
        match self.nodes.get(path) {
            None => return Err(ServiceError::NoNode(path.to_string())),
            Some(node) if !node.children.is_empty() => {
                return Err(ServiceError::NotEmpty(path.to_string()))
            }
            Some(_) => {}
        }

        self.nodes.remove(path);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.remove(last_segment(path));
        }
        trace!(path, "Node deleted");

        self.fire_data(path);
        self.fire_children(path);
        self.fire_children(parent);
        Ok(())
    }

    /// Drop a session and every ephemeral node it owns.
    fn end_session(
        &mut self,
        id: SessionId,
    ) -> Option<mpsc::UnboundedSender<SessionEvent>> {
        let slot = self.sessions.remove(&id)?;

        let mut owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(id))
            .map(|(path, _)| path.clone())
            .collect();
        owned.sort();
        for path in owned {
            let _ = self.delete(&path);
        }
        Some(slot.events)
    }
}

/// In-process hierarchical coordination service.
///
/// Every [`MemoryCoordinationService::connect`] opens an independent session
/// on the same tree, which makes multi-participant scenarios (competing lock
/// acquirers, ephemeral cleanup on expiry) reproducible without a server.
#[derive(Debug, Clone)]
pub struct MemoryCoordinationService {
    tree: Arc<Mutex<Tree>>,
}

impl Default for MemoryCoordinationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationService {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
        }
    }

    /// Open a session. `Connected` is already queued on the returned receiver.
    pub fn connect(&self) -> (Arc<MemorySession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = self.tree.lock().open_session(events_tx.clone());
        let _ = events_tx.send(SessionEvent::State(ConnectionState::Connected));
        debug!(session = id, "Memory session opened");

        let session = Arc::new(MemorySession {
            tree: self.tree.clone(),
            session_id: AtomicU64::new(id),
            events: events_tx,
            closed: AtomicBool::new(false),
        });
        (session, events_rx)
    }

    /// Expire `session`: its ephemeral nodes are removed and `Expired` is
    /// delivered. The session stays unusable until it reconnects.
    pub fn expire_session(
        &self,
        session: &MemorySession,
    ) {
        let id = session.id();
        let events = self.tree.lock().end_session(id);
        if let Some(events) = events {
            info!(session = id, "Memory session expired");
            let _ = events.send(SessionEvent::State(ConnectionState::Expired));
        }
    }

    /// Drop the connection of `session` without expiring it.
    pub fn disconnect(
        &self,
        session: &MemorySession,
    ) {
        self.set_connected(session, false, ConnectionState::Disconnected);
    }

    /// Restore a connection dropped by [`Self::disconnect`].
    pub fn restore(
        &self,
        session: &MemorySession,
    ) {
        self.set_connected(session, true, ConnectionState::Connected);
    }

    fn set_connected(
        &self,
        session: &MemorySession,
        connected: bool,
        state: ConnectionState,
    ) {
        let mut tree = self.tree.lock();
        if let Some(slot) = tree.sessions.get_mut(&session.id()) {
            slot.connected = connected;
            let _ = slot.events.send(SessionEvent::State(state));
        }
    }

    pub fn node_exists(
        &self,
        path: &str,
    ) -> bool {
        self.tree.lock().nodes.contains_key(path)
    }

    /// Child names of `path`, sorted; empty if the node is absent.
    pub fn children_of(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.tree
            .lock()
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn child_count(
        &self,
        path: &str,
    ) -> usize {
        self.tree.lock().nodes.get(path).map_or(0, |node| node.children.len())
    }

    pub fn data_of(
        &self,
        path: &str,
    ) -> Option<Bytes> {
        self.tree.lock().nodes.get(path).map(|node| node.data.clone())
    }
}

/// One participant's session on a [`MemoryCoordinationService`]
#[derive(Debug)]
pub struct MemorySession {
    tree: Arc<Mutex<Tree>>,
    session_id: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn id(&self) -> SessionId {
        self.session_id.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> ServiceResult<String> {
        let id = self.id();
        let mut tree = self.tree.lock();
        tree.check_session(id)?;
        tree.create(path, data, mode, id)
    }

    async fn delete(
        &self,
        path: &str,
    ) -> ServiceResult<()> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id())?;
        tree.delete(path)
    }

    async fn exists(
        &self,
        path: &str,
    ) -> ServiceResult<bool> {
        let tree = self.tree.lock();
        tree.check_session(self.id())?;
        Ok(tree.nodes.contains_key(path))
    }

    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> ServiceResult<Vec<String>> {
        let id = self.id();
        let mut tree = self.tree.lock();
        tree.check_session(id)?;
        let children: Vec<String> = match tree.nodes.get(path) {
            Some(node) => node.children.iter().cloned().collect(),
            None => return Err(ServiceError::NoNode(path.to_string())),
        };
        if watch {
            tree.session_mut(id)?.child_watches.insert(path.to_string());
        }
        Ok(children)
    }

    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> ServiceResult<Bytes> {
        let id = self.id();
        let mut tree = self.tree.lock();
        tree.check_session(id)?;
        let data = match tree.nodes.get(path) {
            Some(node) => node.data.clone(),
            None => return Err(ServiceError::NoNode(path.to_string())),
        };
        if watch {
            tree.session_mut(id)?.data_watches.insert(path.to_string());
        }
        Ok(data)
    }

    async fn set_data(
        &self,
        path: &str,
        data: Bytes,
    ) -> ServiceResult<()> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id())?;
        match tree.nodes.get_mut(path) {
            Some(node) => node.data = data,
            None => return Err(ServiceError::NoNode(path.to_string())),
        }
        tree.fire_data(path);
        Ok(())
    }

    async fn reconnect(&self) -> ServiceResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ServiceError::Other("session closed".to_string()));
        }

        let mut tree = self.tree.lock();
        let old = self.id();
        if tree.sessions.contains_key(&old) {
            return Ok(());
        }
        let id = tree.open_session(self.events.clone());
        self.session_id.store(id, Ordering::Release);
        let _ = self.events.send(SessionEvent::State(ConnectionState::Connected));
        info!(old, new = id, "Memory session replaced");
        Ok(())
    }

    async fn close(&self) -> ServiceResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let events = self.tree.lock().end_session(self.id());
        if let Some(events) = events {
            let _ = events.send(SessionEvent::State(ConnectionState::Closed));
        }
        debug!(session = self.id(), "Memory session closed");
        Ok(())
    }
}

/// Path of the `n`th sequential child named `prefix` under `parent`.
pub fn sequential_path(
    parent: &str,
    prefix: &str,
    n: u64,
) -> String {
    join_path(parent, &format!("{prefix}{n:010}"))
}
