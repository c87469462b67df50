use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use super::CreateMode;
use super::ServiceResult;

/// Facade over the remote hierarchical coordination service.
///
/// Implementations own the transport: connection establishment, RPC retries
/// and raw watch delivery. Fired watches and session state changes are pushed
/// onto the session's event stream as [`super::SessionEvent`]s.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Create a node and return its actual path.
    ///
    /// For sequential modes the returned path carries the generated suffix.
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
    ) -> ServiceResult<String>;

    async fn delete(
        &self,
        path: &str,
    ) -> ServiceResult<()>;

    async fn exists(
        &self,
        path: &str,
    ) -> ServiceResult<bool>;

    /// List child names. `watch` arms a one-shot child trigger on `path`.
    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> ServiceResult<Vec<String>>;

    /// Read the payload. `watch` arms a one-shot data trigger on `path`.
    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> ServiceResult<Bytes>;

    async fn set_data(
        &self,
        path: &str,
        data: Bytes,
    ) -> ServiceResult<()>;

    /// Replace an expired session with a fresh one.
    async fn reconnect(&self) -> ServiceResult<()>;

    /// End the session; its ephemeral nodes go away.
    async fn close(&self) -> ServiceResult<()>;
}

/// Create `path` and every missing ancestor as persistent, empty nodes.
///
/// Nodes that already exist are left untouched.
pub async fn ensure_path(
    client: &dyn CoordinationClient,
    path: &str,
) -> ServiceResult<()> {
    for node in crate::ancestors_inclusive(path) {
        if client.exists(&node).await? {
            continue;
        }
        match client.create(&node, Bytes::new(), CreateMode::Persistent).await {
            Ok(_) | Err(super::ServiceError::NodeExists(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
