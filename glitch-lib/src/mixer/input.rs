//! Where the mixer gets its next track from.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::error::SourceError;
use crate::track::TrackRequest;

/// Outcome of one attempt to obtain a track.
#[derive(Debug)]
pub enum Acquired {
    Track(TrackRequest),
    /// No more tracks will ever arrive.
    Ended,
    /// Nothing arrived within the wait.
    Idle,
}

/// Supplier of tracks for the mixer.
///
/// `acquire` may block for at most `wait` so the caller can re-check its
/// stop flag between attempts.
pub trait TrackSource: Send {
    fn acquire(&mut self, wait: Duration) -> Result<Acquired, SourceError>;
}

enum InboxItem {
    Track(TrackRequest),
    End,
}

/// Channel-fed track source. Tracks arrive in the order they were sent.
pub struct TrackInbox {
    receiver: Receiver<InboxItem>,
    ended: bool,
}

/// Sending half of a [`TrackInbox`].
#[derive(Clone)]
pub struct InboxSender {
    sender: Sender<InboxItem>,
}

/// Create a connected inbox pair.
pub fn inbox() -> (InboxSender, TrackInbox) {
    let (sender, receiver) = mpsc::channel();
    (
        InboxSender { sender },
        TrackInbox {
            receiver,
            ended: false,
        },
    )
}

impl InboxSender {
    pub fn send(&self, request: TrackRequest) -> Result<(), SourceError> {
        self.sender
            .send(InboxItem::Track(request))
            .map_err(|_| SourceError::Closed)
    }

    /// Mark the input as finished. Tracks sent earlier are still delivered.
    pub fn end(&self) -> Result<(), SourceError> {
        self.sender.send(InboxItem::End).map_err(|_| SourceError::Closed)
    }

    /// Send every request in order followed by the end marker.
    pub fn enqueue_all(
        &self,
        requests: impl IntoIterator<Item = TrackRequest>,
    ) -> Result<(), SourceError> {
        for request in requests {
            self.send(request)?;
        }
        self.end()
    }
}

impl TrackSource for TrackInbox {
    fn acquire(&mut self, wait: Duration) -> Result<Acquired, SourceError> {
        if self.ended {
            return Ok(Acquired::Ended);
        }
        match self.receiver.recv_timeout(wait) {
            Ok(InboxItem::Track(request)) => Ok(Acquired::Track(request)),
            Ok(InboxItem::End) | Err(RecvTimeoutError::Disconnected) => {
                self.ended = true;
                Ok(Acquired::Ended)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Acquired::Idle),
        }
    }
}
