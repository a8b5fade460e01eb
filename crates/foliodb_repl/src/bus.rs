//! The transport seam for replies.

use std::sync::Arc;

use foliodb_protocol::ChangesResponse;
use parking_lot::Mutex;

/// Sends replies to the peer over the framed transport.
///
/// Implementations are invoked only from within the replication worker's
/// mailbox and must not block on replies arriving through the same mailbox.
pub trait MessageBus: Send + Sync {
    /// Sends a full changes response for request `number`.
    fn respond(&self, number: u64, response: ChangesResponse);

    /// Acknowledges request `number` with an empty response.
    fn respond_ack(&self, number: u64);

    /// Rejects request `number` with a protocol error.
    fn respond_error(&self, number: u64, code: u16, message: &str);
}

impl<B: MessageBus + ?Sized> MessageBus for Arc<B> {
    fn respond(&self, number: u64, response: ChangesResponse) {
        (**self).respond(number, response);
    }

    fn respond_ack(&self, number: u64) {
        (**self).respond_ack(number);
    }

    fn respond_error(&self, number: u64, code: u16, message: &str) {
        (**self).respond_error(number, code, message);
    }
}

/// A reply captured by [`RecordingBus`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Full response.
    Response(ChangesResponse),
    /// Empty acknowledgement.
    Ack,
    /// Protocol error.
    Error {
        /// Status code.
        code: u16,
        /// Error message.
        message: String,
    },
}

/// A message bus that records replies, for testing.
#[derive(Debug, Default)]
pub struct RecordingBus {
    replies: Mutex<Vec<(u64, Reply)>>,
}

impl RecordingBus {
    /// Creates an empty recording bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded replies in send order.
    pub fn replies(&self) -> Vec<(u64, Reply)> {
        self.replies.lock().clone()
    }

    /// Returns the number of recorded replies.
    pub fn reply_count(&self) -> usize {
        self.replies.lock().len()
    }
}

impl MessageBus for RecordingBus {
    fn respond(&self, number: u64, response: ChangesResponse) {
        self.replies.lock().push((number, Reply::Response(response)));
    }

    fn respond_ack(&self, number: u64) {
        self.replies.lock().push((number, Reply::Ack));
    }

    fn respond_error(&self, number: u64, code: u16, message: &str) {
        self.replies.lock().push((
            number,
            Reply::Error {
                code,
                message: message.to_string(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_bus_preserves_order() {
        let bus = RecordingBus::new();
        bus.respond_ack(1);
        bus.respond_error(2, 400, "bad");
        bus.respond(3, ChangesResponse::new(20));

        let replies = bus.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], (1, Reply::Ack));
        assert_eq!(
            replies[1],
            (
                2,
                Reply::Error {
                    code: 400,
                    message: "bad".into()
                }
            )
        );
        assert!(matches!(replies[2], (3, Reply::Response(_))));
    }
}
