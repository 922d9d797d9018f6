//! Cooperative cancellation for profile runs.

use std::sync::Arc;

use tokio::sync::watch;

/// Clonable cancellation signal shared between a run and its controller.
///
/// Cancelling is sticky: once fired, every clone reports cancelled and every
/// pending [`cancelled`](CancelToken::cancelled) future resolves.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self { tx: Arc::new(tx), rx }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the token has been cancelled.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
      // The sender lives as long as any clone, so this only happens during teardown.
      std::future::pending::<()>().await;
    }
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}
