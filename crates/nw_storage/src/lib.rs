use async_trait::async_trait;
use nw_core::{ArticleStore, Error, Result};
use std::sync::Arc;
use tracing::{error, info};

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: ArticleStore + Sized + 'static {
    fn get_error_message() -> &'static str;

    /// Opens the backend, creating whatever schema it needs.
    async fn open(url: Option<&str>) -> Result<Self>;
}

async fn open_backend<T: StorageBackend>(url: Option<&str>) -> Result<Arc<dyn ArticleStore>> {
    match T::open(url).await {
        Ok(storage) => Ok(Arc::new(storage)),
        Err(e) => {
            error!(error = %e, hint = T::get_error_message(), "Failed to open storage backend");
            Err(e)
        }
    }
}

/// Builds the store named by `kind` (`memory` or `sqlite`).
pub async fn create_storage(kind: &str, url: Option<&str>) -> Result<Arc<dyn ArticleStore>> {
    let storage = match kind {
        "memory" => open_backend::<InMemoryStorage>(url).await?,
        #[cfg(feature = "sqlite")]
        "sqlite" => open_backend::<SQLiteStorage>(url).await?,
        other => {
            return Err(Error::Storage(format!(
                "Unknown storage backend: {} (available: {})",
                other,
                available_backends().join(", ")
            )))
        }
    };
    info!(backend = kind, "Storage backend ready");
    Ok(storage)
}

pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["memory"];
    if cfg!(feature = "sqlite") {
        backends.push("sqlite");
    }
    backends
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend};
}

#[cfg(test)]
mod tests {
    use super::*;
    use nw_core::Article;

    #[tokio::test]
    async fn test_create_memory_storage() {
        let storage = create_storage("memory", None).await.unwrap();
        let summary = storage.upsert_batch(&[Article::new("a", "A")]).await.unwrap();
        assert_eq!(summary.upserted, 1);
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let err = create_storage("mongo", None).await.err().unwrap();
        assert!(err.to_string().contains("Unknown storage backend: mongo"));
    }
}
