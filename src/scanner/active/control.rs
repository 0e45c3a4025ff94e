use std::sync::Arc;
use tokio::sync::watch;

/// Run state of an active scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Paused,
    Stopped,
}

/// Cooperative pause/stop handle shared by every task of a scan
#[derive(Clone)]
pub struct ScanControl {
    state: Arc<watch::Sender<ScanState>>,
}

impl ScanControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ScanState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn pause(&self) {
        self.state.send_if_modified(|state| {
            let pausing = *state == ScanState::Running;
            if pausing {
                *state = ScanState::Paused;
            }
            pausing
        });
    }

    pub fn resume(&self) {
        self.state.send_if_modified(|state| {
            let resuming = *state == ScanState::Paused;
            if resuming {
                *state = ScanState::Running;
            }
            resuming
        });
    }

    /// Stop for good; work ends at the next checkpoint
    pub fn stop(&self) {
        self.state.send_replace(ScanState::Stopped);
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ScanState::Stopped
    }

    /// Wait out a pause. Returns false once the scan is stopped.
    pub async fn checkpoint(&self) -> bool {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ScanState::Running => return true,
                ScanState::Stopped => return false,
                ScanState::Paused => {
                    if rx.changed().await.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

impl Default for ScanControl {
    fn default() -> Self {
        Self::new()
    }
}
