use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A single-assignment result cell.
///
/// Any number of racing tasks may call [Settlement::settle]; the first value is delivered to the
/// receiver and every later call is a no-op.
#[derive(Debug)]
pub struct Settlement<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Mutex::new(Some(tx)) }, rx)
    }

    /// Delivers `value` if nothing was settled before. Returns whether this call won.
    pub fn settle(&self, value: T) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // the receiver may already be gone, the cell is settled either way
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_writer_wins() {
        let (settlement, rx) = Settlement::new();
        assert!(!settlement.is_settled());
        assert!(settlement.settle("disconnected"));
        assert!(!settlement.settle("signature"));
        assert!(settlement.is_settled());
        assert_eq!(rx.await.unwrap(), "disconnected");
    }
}
