//! Responses to change-advertisement messages.
//!
//! The response body is a positional JSON array: the slot for an entry
//! holds `0` (or is absent) when the revision is not requested, an array of
//! ancestor revision IDs when it is, or a nonzero status code when it is
//! rejected. Trailing zeros are omitted by the emitter; the decoder treats
//! absent positions as `0`.

use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// Headers and body of a reply to `changes` / `proposeChanges`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesResponse {
    /// Maximum revision-history depth this side retains.
    pub max_history: u32,
    /// This side accepts blob (attachment) transfers.
    pub blobs: bool,
    /// This side accepts deltas; announced once per session.
    pub deltas: bool,
    /// Positional JSON array body.
    pub body: String,
}

impl ChangesResponse {
    /// Creates a response with an empty body and no capability headers.
    pub fn new(max_history: u32) -> Self {
        Self {
            max_history,
            blobs: false,
            deltas: false,
            body: "[]".into(),
        }
    }

    /// Sets the blob-support header.
    #[must_use]
    pub fn with_blobs(mut self, blobs: bool) -> Self {
        self.blobs = blobs;
        self
    }

    /// Sets the delta-support header.
    #[must_use]
    pub fn with_deltas(mut self, deltas: bool) -> Self {
        self.deltas = deltas;
        self
    }
}

/// Streaming writer for the positional response array.
///
/// Skipped slots between the previous item and the written position are
/// filled with literal zeros, and commas are managed explicitly so that raw
/// ancestor fragments can be spliced in verbatim.
#[derive(Debug, Default)]
pub struct ResponseBody {
    buf: String,
    items_written: usize,
}

impl ResponseBody {
    /// Creates an empty body.
    pub fn new() -> Self {
        Self {
            buf: String::from("["),
            items_written: 0,
        }
    }

    /// Writes a raw JSON fragment at `index`, zero-filling skipped slots.
    ///
    /// Positions must be written in increasing order.
    pub fn write_raw_at(&mut self, index: usize, fragment: &str) {
        if self.items_written > 0 {
            self.buf.push(',');
        }
        while self.items_written < index {
            self.buf.push_str("0,");
            self.items_written += 1;
        }
        self.buf.push_str(fragment);
        self.items_written += 1;
    }

    /// Writes an integer status at `index`, zero-filling skipped slots.
    pub fn write_status_at(&mut self, index: usize, status: u16) {
        self.write_raw_at(index, &status.to_string());
    }

    /// Returns the number of slots written so far, including zero fill.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.items_written == 0
    }

    /// Closes the array and returns the body text.
    pub fn finish(mut self) -> String {
        self.buf.push(']');
        self.buf
    }
}

/// One decoded slot of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSlot {
    /// The revision was not requested (slot `0` or absent).
    NotRequested,
    /// The revision was requested; the receiver's candidate ancestor
    /// revision IDs.
    Ancestors(Vec<String>),
    /// The revision was rejected with a status code.
    Status(u16),
}

/// Decodes a response body, padding absent trailing positions to `len`.
pub fn decode_response_body(body: &str, len: usize) -> ProtocolResult<Vec<ResponseSlot>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ProtocolError::invalid_body(format!("malformed response body: {e}")))?;
    let Some(items) = value.as_array() else {
        return Err(ProtocolError::invalid_body("response body must be an array"));
    };
    if items.len() > len {
        return Err(ProtocolError::invalid_body(
            "response body has more slots than the request",
        ));
    }
    let mut slots = Vec::with_capacity(len);
    for item in items {
        let slot = match item {
            Value::Number(n) => match n.as_u64() {
                Some(0) => ResponseSlot::NotRequested,
                Some(code) if code <= u64::from(u16::MAX) => ResponseSlot::Status(code as u16),
                _ => {
                    return Err(ProtocolError::invalid_body(
                        "response slot is not a valid status",
                    ))
                }
            },
            Value::Array(revs) => {
                let revs = revs
                    .iter()
                    .map(|r| {
                        r.as_str().map(str::to_string).ok_or_else(|| {
                            ProtocolError::invalid_body("ancestor revision must be a string")
                        })
                    })
                    .collect::<ProtocolResult<Vec<String>>>()?;
                ResponseSlot::Ancestors(revs)
            }
            _ => {
                return Err(ProtocolError::invalid_body(
                    "response slot must be a number or an array",
                ))
            }
        };
        slots.push(slot);
    }
    slots.resize(len, ResponseSlot::NotRequested);
    Ok(slots)
}
