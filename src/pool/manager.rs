//! Connection manager trait.

use async_trait::async_trait;

/// Opens, checks and closes the native handles a pool hands out.
///
/// `close` may be called more than once for the same connection (a leaked
/// checkout is closed by the pool, then again when its holder releases it)
/// and must tolerate that.
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Opens a fresh connection.
    async fn connect(&self) -> anyhow::Result<Self::Connection>;

    /// Liveness check run before an idle connection is handed out again.
    async fn is_valid(&self, conn: &Self::Connection) -> anyhow::Result<()>;

    async fn close(&self, conn: &Self::Connection);
}
