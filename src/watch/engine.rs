//! Watch multiplexing engine
//!
//! Turns the service's one-shot triggers into durable per-path subscriptions.
//!
//! ```text
//! raw trigger ──> on_child_trigger(path)
//!                   │ get_children(path, watch = true)   re-arm + re-read
//!                   ▼
//!                 diff against snapshot ──> Created / Deleted
//!                   │
//!                   ▼
//!                 ListenerPool (affinity = subscribed path) ──> Listener
//! ```
//!
//! Every re-read arms the next trigger, so a subscription stays live until it
//! is removed. Watches do not survive a session replacement; after recovery
//! [`WatchEngine::on_reconnect_recovered`] re-reads (and so re-arms) every
//! subscription and re-creates every stubborn node.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::commit_round;
use super::unseen_children;
use super::ChildInterest;
use super::ChildSubscription;
use super::EventKind;
use super::Listener;
use super::ListenerPool;
use super::StateListener;
use super::WatchEvent;
use crate::is_valid_node_path;
use crate::join_path;
use crate::ConnectionState;
use crate::CoordinationClient;
use crate::CreateMode;
use crate::Error;
use crate::Result;
use crate::ServiceError;

/// Data subscription record
#[derive(Clone)]
struct DataSubscription {
    listener: Arc<dyn Listener>,
    /// Parent path when created as a side effect of child-data tracking
    parent: Option<String>,
}

impl DataSubscription {
    fn affinity_key<'a>(
        &'a self,
        path: &'a str,
    ) -> &'a str {
        self.parent.as_deref().unwrap_or(path)
    }
}

/// Ephemeral node re-created after every session recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubbornNode {
    pub path: String,
    pub data: Bytes,
}

pub struct WatchEngine {
    client: Arc<dyn CoordinationClient>,

    /// Child subscriptions keyed by watched parent path
    children: DashMap<String, Arc<ChildSubscription>>,

    /// Data subscriptions keyed by node path
    data: DashMap<String, DataSubscription>,

    stubborn: DashMap<String, StubbornNode>,

    /// User state callbacks, one per state value
    states: DashMap<ConnectionState, Arc<dyn StateListener>>,

    /// Internal session-expiry hooks keyed by owner (lock directory)
    expiry_hooks: DashMap<String, Arc<dyn StateListener>>,

    pool: ListenerPool,
}

impl std::fmt::Debug for WatchEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchEngine")
            .field("children", &self.children.len())
            .field("data", &self.data.len())
            .field("stubborn", &self.stubborn.len())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl WatchEngine {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        listener_pool_size: usize,
    ) -> Self {
        Self {
            client,
            children: DashMap::new(),
            data: DashMap::new(),
            stubborn: DashMap::new(),
            states: DashMap::new(),
            expiry_hooks: DashMap::new(),
            pool: ListenerPool::new(listener_pool_size),
        }
    }

    /// Subscribe to the children of `path`.
    ///
    /// Existing children are reported as `Created` directly to `listener`
    /// before this returns. Later changes go through the listener pool.
    /// On failure the subscription is not kept.
    pub async fn subscribe_children(
        &self,
        path: &str,
        listener: Arc<dyn Listener>,
        interest: ChildInterest,
    ) -> Result<()> {
        let sub = Arc::new(ChildSubscription::new(path, listener, interest));
        self.children.insert(path.to_string(), sub.clone());

        if let Err(e) = self.refresh_children(&sub, true).await {
            self.children.remove_if(path, |_, current| Arc::ptr_eq(current, &sub));
            return Err(e);
        }
        debug!(path, ?interest, "Child subscription registered");
        Ok(())
    }

    /// Subscribe to the payload of `path`.
    ///
    /// The current payload is delivered as a `DataChanged` event.
    pub async fn subscribe_data(
        &self,
        path: &str,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        self.data.insert(
            path.to_string(),
            DataSubscription {
                listener: listener.clone(),
                parent: None,
            },
        );

        if let Err(e) = self.refresh_data(path, true).await {
            self.data.remove_if(path, |_, current| Arc::ptr_eq(&current.listener, &listener));
            return Err(e);
        }
        debug!(path, "Data subscription registered");
        Ok(())
    }

    /// Remove interest in `path`.
    ///
    /// With `children` or `child_data` set the child subscription is dropped
    /// together with the per-child data subscriptions it created; otherwise
    /// the data subscription of `path` is dropped. A fired trigger for a
    /// removed subscription is ignored.
    pub fn unsubscribe(
        &self,
        path: &str,
        children: bool,
        child_data: bool,
    ) {
        if children || child_data {
            if let Some((_, removed)) = self.children.remove(path) {
                // Marked before the sweep so a refresh that tracks a child
                // after the sweep sees it and undoes the entry.
                removed.mark_removed();
                self.data.retain(|_, sub| sub.parent.as_deref() != Some(path));
                debug!(path, "Child subscription removed");
            }
        } else if self.data.remove_if(path, |_, sub| sub.parent.is_none()).is_some() {
            debug!(path, "Data subscription removed");
        }
    }

    /// Raw child trigger for `path`: re-arm, re-read and diff.
    pub async fn on_child_trigger(
        &self,
        path: &str,
    ) -> Result<()> {
        let sub = match self.children.get(path) {
            Some(entry) => entry.value().clone(),
            None => {
                trace!(path, "Child trigger without subscription");
                return Ok(());
            }
        };
        self.refresh_children(&sub, false).await
    }

    /// Raw data trigger for `path`: re-arm, re-read and report.
    pub async fn on_data_trigger(
        &self,
        path: &str,
    ) -> Result<()> {
        self.refresh_data(path, false).await
    }

    /// Re-arm every subscription and re-create every stubborn node.
    ///
    /// A failure on one path does not stop the others; the first failure is
    /// returned after the sweep.
    pub async fn on_reconnect_recovered(&self) -> Result<()> {
        let mut first_error = None;

        let data_paths: Vec<String> = self.data.iter().map(|entry| entry.key().clone()).collect();
        for path in data_paths {
            match self.refresh_data(&path, false).await {
                Ok(()) => debug!(path, "Relisten data node"),
                Err(e) => {
                    warn!(path, "Relisten data node failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let subs: Vec<Arc<ChildSubscription>> =
            self.children.iter().map(|entry| entry.value().clone()).collect();
        for sub in subs {
            match self.refresh_children(&sub, false).await {
                Ok(()) => debug!(path = %sub.path, "Relisten child node"),
                Err(e) => {
                    warn!(path = %sub.path, "Relisten child node failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let nodes: Vec<StubbornNode> =
            self.stubborn.iter().map(|entry| entry.value().clone()).collect();
        for node in nodes {
            match self.client.create(&node.path, node.data.clone(), CreateMode::Ephemeral).await {
                Ok(_) => debug!(path = %node.path, "Recreated stubborn node"),
                Err(ServiceError::NodeExists(_)) => {
                    debug!(path = %node.path, "Stubborn node still present")
                }
                Err(e) => {
                    warn!(path = %node.path, "Recreating stubborn node failed: {}", e);
                    first_error.get_or_insert(Error::operation("create", node.path.clone(), e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remember an ephemeral node to re-create after session recovery.
    pub fn register_stubborn(
        &self,
        path: &str,
        data: Bytes,
    ) -> Result<()> {
        if !is_valid_node_path(path) {
            return Err(Error::InvalidRegistration(format!(
                "stubborn node path must be an absolute node path, got {path:?}"
            )));
        }
        self.stubborn.insert(
            path.to_string(),
            StubbornNode {
                path: path.to_string(),
                data,
            },
        );
        debug!(path, "Stubborn node registered");
        Ok(())
    }

    pub fn remove_stubborn(
        &self,
        path: &str,
    ) -> Option<StubbornNode> {
        self.stubborn.remove(path).map(|(_, node)| node)
    }

    pub fn stubborn_nodes(&self) -> Vec<StubbornNode> {
        self.stubborn.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Register the callback for `state`, replacing any previous one.
    pub fn listen_state(
        &self,
        state: ConnectionState,
        listener: Arc<dyn StateListener>,
    ) {
        self.states.insert(state, listener);
    }

    pub fn unlisten_state(
        &self,
        state: ConnectionState,
    ) {
        self.states.remove(&state);
    }

    pub(crate) fn register_expiry_hook(
        &self,
        key: &str,
        hook: Arc<dyn StateListener>,
    ) {
        self.expiry_hooks.insert(key.to_string(), hook);
    }

    pub(crate) fn remove_expiry_hook(
        &self,
        key: &str,
    ) {
        self.expiry_hooks.remove(key);
    }

    /// Forward a connection state change to its callback.
    ///
    /// `Expired` also runs every internal expiry hook.
    pub fn notify_state(
        &self,
        state: ConnectionState,
    ) {
        if state == ConnectionState::Expired {
            let hooks: Vec<Arc<dyn StateListener>> =
                self.expiry_hooks.iter().map(|entry| entry.value().clone()).collect();
            for hook in hooks {
                hook.on_state(state);
            }
        }

        let listener = self.states.get(&state).map(|entry| entry.value().clone());
        if let Some(listener) = listener {
            listener.on_state(state);
        }
    }

    pub fn child_subscription_count(&self) -> usize {
        self.children.len()
    }

    pub fn data_subscription_count(&self) -> usize {
        self.data.len()
    }

    pub fn has_data_subscription(
        &self,
        path: &str,
    ) -> bool {
        self.data.contains_key(path)
    }

    /// Child names currently believed to exist under a subscribed `path`.
    pub async fn known_children(
        &self,
        path: &str,
    ) -> Option<Vec<String>> {
        let sub = self.children.get(path).map(|entry| entry.value().clone())?;
        let snapshot = sub.snapshot.lock().await;
        let mut names: Vec<String> = snapshot.keys().cloned().collect();
        names.sort();
        Some(names)
    }

    /// Stop the listener pool. Queued callbacks are dropped.
    pub fn shutdown(&self) {
        self.pool.stop();
    }

    async fn refresh_children(
        &self,
        sub: &Arc<ChildSubscription>,
        init: bool,
    ) -> Result<()> {
        let mut snapshot = sub.snapshot.lock().await;

        let fresh = match self.client.get_children(&sub.path, true).await {
            Ok(children) => children,
            Err(ServiceError::NoNode(_)) if !init => {
                self.retire(sub, &mut snapshot);
                return Ok(());
            }
            Err(e) => return Err(Error::operation("get_children", sub.path.clone(), e)),
        };

        // Payloads are fetched before the snapshot is touched so a failed
        // read leaves the previous round intact.
        let unseen = unseen_children(&snapshot, &fresh);
        let mut admitted = Vec::with_capacity(unseen.len());
        let mut payloads = Vec::with_capacity(unseen.len());
        for name in unseen {
            if sub.interest.child_data {
                let child_path = join_path(&sub.path, &name);
                match self.client.get_data(&child_path, true).await {
                    Ok(data) => payloads.push(data),
                    Err(ServiceError::NoNode(_)) => {
                        trace!(path = %child_path, "Child vanished before its payload was read");
                        continue;
                    }
                    Err(e) => return Err(Error::operation("get_data", child_path, e)),
                }
            } else {
                payloads.push(Bytes::new());
            }
            admitted.push(name);
        }

        if sub.is_removed() {
            trace!(path = %sub.path, "Subscription removed during refresh, results dropped");
            return Ok(());
        }
        let diff = commit_round(&mut snapshot, &fresh, &admitted);

        for (name, payload) in diff.created.iter().zip(payloads) {
            let child_path = join_path(&sub.path, name);
            if sub.interest.child_data {
                self.track_child_data(&child_path, sub);
            }
            let event = WatchEvent::new(child_path, EventKind::Created, payload);
            if init {
                sub.listener.on_event(&event);
            } else {
                self.pool.submit(&sub.path, sub.listener.clone(), event);
            }
            debug!(path = %sub.path, child = %name, "Child change, type: node-create");
        }

        for name in &diff.deleted {
            let child_path = join_path(&sub.path, name);
            if sub.interest.child_data {
                self.untrack_child_data(&child_path, &sub.path);
            }
            self.pool.submit(
                &sub.path,
                sub.listener.clone(),
                WatchEvent::new(child_path, EventKind::Deleted, Bytes::new()),
            );
            debug!(path = %sub.path, child = %name, "Child change, type: node-delete");
        }

        Ok(())
    }

    /// Watched parent disappeared: report every known child as deleted and
    /// drop the subscription.
    fn retire(
        &self,
        sub: &Arc<ChildSubscription>,
        snapshot: &mut std::collections::HashMap<String, bool>,
    ) {
        let mut names: Vec<String> = snapshot.drain().map(|(name, _)| name).collect();
        names.sort();
        for name in names {
            let child_path = join_path(&sub.path, &name);
            self.untrack_child_data(&child_path, &sub.path);
            self.pool.submit(
                &sub.path,
                sub.listener.clone(),
                WatchEvent::new(child_path, EventKind::Deleted, Bytes::new()),
            );
        }
        sub.mark_removed();
        self.children.remove_if(&sub.path, |_, current| Arc::ptr_eq(current, sub));
        info!(path = %sub.path, "Watched parent removed, child subscription dropped");
    }

    async fn refresh_data(
        &self,
        path: &str,
        initial: bool,
    ) -> Result<()> {
        let sub = match self.data.get(path) {
            Some(entry) => entry.value().clone(),
            None => {
                trace!(path, "Data trigger without subscription");
                return Ok(());
            }
        };

        match self.client.get_data(path, true).await {
            Ok(data) => {
                self.pool.submit(
                    sub.affinity_key(path),
                    sub.listener.clone(),
                    WatchEvent::new(path, EventKind::DataChanged, data),
                );
                debug!(path, "Node data change");
                Ok(())
            }
            // Per-child deletions are reported by the parent's diff.
            Err(ServiceError::NoNode(_)) if !initial => {
                if sub.parent.is_none() {
                    self.pool.submit(
                        path,
                        sub.listener.clone(),
                        WatchEvent::new(path, EventKind::Deleted, Bytes::new()),
                    );
                    debug!(path, "Watched node deleted");
                }
                Ok(())
            }
            Err(e) => Err(Error::operation("get_data", path, e)),
        }
    }

    fn track_child_data(
        &self,
        child_path: &str,
        sub: &ChildSubscription,
    ) {
        let derived = DataSubscription {
            listener: sub.listener.clone(),
            parent: Some(sub.path.clone()),
        };
        // A direct subscription on the same node takes precedence.
        self.data
            .entry(child_path.to_string())
            .and_modify(|existing| {
                if existing.parent.is_some() {
                    *existing = derived.clone();
                }
            })
            .or_insert(derived);

        if sub.is_removed() {
            self.data.remove_if(child_path, |_, current| {
                current.parent.as_deref() == Some(sub.path.as_str())
                    && Arc::ptr_eq(&current.listener, &sub.listener)
            });
        }
    }

    fn untrack_child_data(
        &self,
        child_path: &str,
        parent: &str,
    ) {
        self.data.remove_if(child_path, |_, sub| sub.parent.as_deref() == Some(parent));
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        self.pool.stop();
    }
}
