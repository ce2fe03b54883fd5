use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::info;

/// Process-wide, lazily loaded model handle.
///
/// The first caller pays the cold start, every later caller gets the same `Arc`. A failed load
/// leaves the cell empty so the next request tries again. Once loaded, the model is never
/// invalidated for the lifetime of the process.
pub struct ModelCell<M> {
    inner: OnceCell<Arc<M>>,
}

impl<M> Default for ModelCell<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCell<M> {
    pub const fn new() -> Self {
        Self {
            inner: OnceCell::const_new(),
        }
    }

    /// Return the loaded model, running `loader` if nobody did it before.
    /// Concurrent callers wait on the same initialization.
    pub async fn get_or_load<F, Fut, E>(&self, loader: F) -> Result<Arc<M>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, E>>,
    {
        self.inner
            .get_or_try_init(|| async move {
                let started = Instant::now();
                let model = loader().await?;
                info!("Model loaded in {:.2?} (cold start)", started.elapsed());
                Ok(Arc::new(model))
            })
            .await
            .map(Arc::clone)
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.inner.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loads_only_once() {
        let cell = ModelCell::<String>::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let model = cell
                .get_or_load(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(String::from("anysplat"))
                })
                .await
                .unwrap();
            assert_eq!(model.as_str(), "anysplat");
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cell.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cell = ModelCell::<u32>::new();

        let first = cell.get_or_load(|| async { Err::<u32, _>("weights missing") }).await;
        assert_eq!(first.unwrap_err(), "weights missing");
        assert!(!cell.is_loaded());

        let second = cell.get_or_load(|| async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(*second, 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_load() {
        let cell = Arc::new(ModelCell::<usize>::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let loads = Arc::clone(&loads);
                tokio::spawn(async move {
                    cell.get_or_load(|| async {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok::<_, ()>(loads.fetch_add(1, Ordering::SeqCst))
                    })
                    .await
                    .unwrap()
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(*task.await.unwrap(), 0);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
