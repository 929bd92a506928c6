//! Queued delivery: commit first, deliver from a worker thread.
//!
//! The sender side is itself a [`DeliveryChannel`], so the engine commits,
//! enqueues, and returns immediately while the worker performs the real
//! delivery. Worker-side failures stay on the worker (logged, no retry).

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use tracing::warn;

use super::{DeliveryChannel, DeliveryError, Notification};

/// Enqueueing end of the worker. `deliver` never blocks on downstream
/// channels.
pub struct QueueChannel {
    tx: Mutex<mpsc::Sender<Notification>>,
}

impl DeliveryChannel for QueueChannel {
    fn name(&self) -> &str {
        "queue"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| DeliveryError::Unreachable("queue sender poisoned".into()))?;
        tx.send(notification.clone())
            .map_err(|_| DeliveryError::Unreachable("notification worker stopped".into()))
    }
}

/// Background worker that drains the queue into the real delivery channels.
pub struct NotificationWorker {
    handle: Option<thread::JoinHandle<()>>,
}

impl NotificationWorker {
    /// Spawn a worker over the given downstream channels. Returns the
    /// enqueueing channel and the worker handle.
    pub fn spawn(channels: Vec<Box<dyn DeliveryChannel>>) -> (QueueChannel, NotificationWorker) {
        let (tx, rx) = mpsc::channel::<Notification>();

        let handle = thread::spawn(move || {
            for notification in rx.iter() {
                for channel in &channels {
                    if let Err(e) = channel.deliver(&notification) {
                        warn!(
                            channel = channel.name(),
                            recipient = %notification.recipient,
                            error = %e,
                            "queued delivery failed"
                        );
                    }
                }
            }
        });

        (
            QueueChannel { tx: Mutex::new(tx) },
            NotificationWorker {
                handle: Some(handle),
            },
        )
    }

    /// Wait for the worker to drain. The queue closes once every
    /// `QueueChannel` has been dropped.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        seen: Mutex<Vec<Notification>>,
    }

    impl DeliveryChannel for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn make_notification(recipient: &str) -> Notification {
        Notification {
            recipient: recipient.into(),
            topic: "emergency_e1".into(),
            event: "status_update".into(),
            payload: serde_json::json!({"status": "dispatched"}),
        }
    }

    #[test]
    fn test_worker_drains_queue() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let (queue, worker) = NotificationWorker::spawn(vec![Box::new(recording.clone())]);

        queue.deliver(&make_notification("u1")).unwrap();
        queue.deliver(&make_notification("u2")).unwrap();

        drop(queue);
        worker.join();

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].recipient, "u1");
        assert_eq!(seen[1].recipient, "u2");
    }

    struct Failing;

    impl DeliveryChannel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
            Err(DeliveryError::Unreachable("down".into()))
        }
    }

    #[test]
    fn test_failing_channel_does_not_stop_worker() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let (queue, worker) =
            NotificationWorker::spawn(vec![Box::new(Failing), Box::new(recording.clone())]);

        queue.deliver(&make_notification("u1")).unwrap();
        queue.deliver(&make_notification("u2")).unwrap();

        drop(queue);
        worker.join();

        // The failing channel never blocked delivery on the healthy one
        assert_eq!(recording.seen.lock().unwrap().len(), 2);
    }
}
