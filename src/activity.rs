use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::{PhotoId, PinId};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    SearchStarted { pin_id: PinId, page: i64 },
    SearchFinished { pin_id: PinId, photos: usize },
    SearchFailed { pin_id: PinId, message: String },
    DownloadsStarted { photos: usize },
    ImageStored { photo_id: PhotoId, pin_id: PinId },
    DownloadsFinished { downloaded: usize, failed: usize },
}

/// Outstanding network work, shared by every clone of the repository.
///
/// Callers use [`DownloadActivity::is_busy`] to keep "new collection" and delete
/// actions disabled while a fetch or image batch is in flight.
#[derive(Clone)]
pub struct DownloadActivity {
    outstanding: Arc<AtomicU64>,
    events: broadcast::Sender<ActivityEvent>,
}

impl DownloadActivity {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            outstanding: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding() > 0
    }

    pub fn emit(&self, event: ActivityEvent) {
        let _ = self.events.send(event);
    }

    /// Counts an operation as outstanding until the guard drops.
    pub fn begin(&self) -> ActivityGuard {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl Default for DownloadActivity {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ActivityGuard {
    outstanding: Arc<AtomicU64>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_outstanding() {
        let activity = DownloadActivity::new();
        assert!(!activity.is_busy());

        let first = activity.begin();
        let second = activity.clone().begin();
        assert_eq!(activity.outstanding(), 2);

        drop(first);
        assert!(activity.is_busy());
        drop(second);
        assert!(!activity.is_busy());
    }

    #[test]
    fn test_events_reach_subscribers() {
        let activity = DownloadActivity::new();
        let mut events = activity.subscribe();

        activity.emit(ActivityEvent::DownloadsStarted { photos: 3 });
        assert_eq!(
            events.try_recv().unwrap(),
            ActivityEvent::DownloadsStarted { photos: 3 }
        );
    }
}
