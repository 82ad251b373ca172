//! Frame and header types.
//!
//! A [`Frame`] is a command, an ordered header list, and an opaque body.
//! A frame with no command, no headers and no body is the heartbeat
//! sentinel.
//!
//! # Example
//!
//! ```
//! use stompwire::protocol::Frame;
//!
//! let frame = Frame::new("SEND")
//!     .with_header("destination", "/queue/a")
//!     .with_body("hello");
//!
//! assert_eq!(frame.command(), Some("SEND"));
//! assert_eq!(frame.header("destination"), Some("/queue/a"));
//! assert_eq!(frame.body(), b"hello");
//! ```

use bytes::Bytes;

use super::wire_format::headers::CONTENT_LENGTH;

/// Ordered header list.
///
/// Setting an existing name replaces its value at the same position.
/// Lookup is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, overwriting an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a header value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Check if a header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

/// A protocol frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    command: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Frame {
    /// Create a frame with the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// The heartbeat sentinel: no command, no headers, no body.
    pub fn heartbeat() -> Self {
        Self::default()
    }

    /// Build a frame from its parts.
    pub fn from_parts(command: Option<String>, headers: Headers, body: Bytes) -> Self {
        Self {
            command,
            headers,
            body,
        }
    }

    /// Check if this is the heartbeat sentinel.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.command.is_none() && self.headers.is_empty() && self.body.is_empty()
    }

    #[inline]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    #[inline]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Look up a header value.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Set a header, overwriting an existing value in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Builder form of [`set_header`](Self::set_header).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Remove a header, returning its value.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(name)
    }

    /// Body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get a clone of the body as Bytes (cheap, zero-copy).
    #[inline]
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Body as UTF-8 text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Builder form of [`set_body`](Self::set_body).
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parsed `content-length` header, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.header(CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// Split the frame into its parts.
    pub fn into_parts(self) -> (Option<String>, Headers, Bytes) {
        (self.command, self.headers, self.body)
    }
}
