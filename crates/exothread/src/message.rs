//! Opaque message payloads.
//!
//! The handle never looks inside a message. Serializing across whatever boundary
//! a registry implements (thread, process, network) is the registry's job.

/// An owned, opaque message buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Message(Vec<u8>);

impl Message {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns true for a payload with no content.
    ///
    /// Empty payloads arriving on a worker's topic are never delivered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Views the payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}
