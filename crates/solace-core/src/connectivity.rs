use async_trait::async_trait;

/// Answers "can we reach the provider right now?" before a request is made.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}
