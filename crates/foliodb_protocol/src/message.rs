//! Inbound change-advertisement messages.

use serde_json::Value;

/// Wire profile of an inbound change-advertisement message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// The peer advertises revisions it already stores.
    Changes,
    /// The peer proposes revisions it would like to push (conflict-free
    /// mode).
    ProposeChanges,
}

impl Profile {
    /// Returns the profile name used on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Profile::Changes => "changes",
            Profile::ProposeChanges => "proposeChanges",
        }
    }

    /// Parses a wire profile name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "changes" => Some(Profile::Changes),
            "proposeChanges" => Some(Profile::ProposeChanges),
            _ => None,
        }
    }
}

/// A framed change-advertisement message, as delivered by the transport.
///
/// The body is kept as raw JSON; per-profile parsing happens when the
/// message is handled so a malformed batch can be answered with a protocol
/// error instead of being dropped in the framing layer.
#[derive(Debug, Clone)]
pub struct ChangesRequest {
    /// Message profile.
    pub profile: Profile,
    /// The transport's request number, echoed in the response.
    pub number: u64,
    /// The peer does not expect a response.
    pub no_reply: bool,
    /// Raw JSON body.
    pub body: Value,
}

impl ChangesRequest {
    /// Creates a request expecting a reply.
    pub fn new(profile: Profile, number: u64, body: Value) -> Self {
        Self {
            profile,
            number,
            no_reply: false,
            body,
        }
    }

    /// Marks the request as not expecting a reply.
    #[must_use]
    pub fn with_no_reply(mut self) -> Self {
        self.no_reply = true;
        self
    }
}
