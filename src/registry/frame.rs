//! Identifier and payload types for group routing
//!
//! This module defines the keys used to address groups and members, and the
//! frames that are fanned out to group members.

use bytes::Bytes;

/// Identifier of a group (e.g. "room1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Create a new group id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a member, unique within its group by convention
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(String);

impl MemberId {
    /// Create a new member id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of payload carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text
    Text,
    /// Opaque bytes
    Binary,
}

/// A payload to be delivered to group members
///
/// Cheap to clone: every recipient shares the same `Bytes` allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload kind
    pub kind: FrameKind,
    /// Payload data (zero-copy via reference counting)
    pub data: Bytes,
}

impl Frame {
    /// Create a text frame
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Text,
            data: Bytes::from(text.into()),
        }
    }

    /// Create a binary frame
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Binary,
            data: data.into(),
        }
    }

    /// Create a text frame prefixed with the sender's id, as `"<sender>: <text>"`
    pub fn attributed(sender: &MemberId, text: &str) -> Self {
        Self::text(format!("{}: {}", sender, text))
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn to_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributed_frame() {
        let frame = Frame::attributed(&MemberId::new("alice"), "hi");

        assert_eq!(frame.kind, FrameKind::Text);
        assert_eq!(frame.to_text_lossy(), "alice: hi");
        assert_eq!(frame.len(), 9);
    }

    #[test]
    fn test_binary_frame_shares_allocation() {
        let frame = Frame::binary(Bytes::from_static(&[0xde, 0xad]));
        let clone = frame.clone();

        assert_eq!(frame.kind, FrameKind::Binary);
        assert_eq!(frame.data.as_ptr(), clone.data.as_ptr());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(GroupId::from("room1").to_string(), "room1");
        assert_eq!(MemberId::from(String::from("bob")).as_str(), "bob");
    }
}
