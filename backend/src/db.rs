use std::sync::Arc;

use assignment::store::sqlite_store::SqliteStore;

/// Connect and migrate; one store serves every persistence trait.
pub async fn connect(database_url: &str) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(database_url).await?;
    tracing::info!(database_url, "database ready");
    Ok(Arc::new(store))
}
