//! Heart-beat negotiation.
//!
//! Each side declares `outgoing,incoming` in milliseconds, where `0` means
//! that direction is disabled. [`HeartbeatValues::combine`] yields the
//! cadence actually used on this side.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A declared or negotiated heart-beat pair, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HeartbeatValues {
    /// How often this side sends (0 = never).
    pub outgoing: u32,
    /// How often this side expects to receive (0 = never).
    pub incoming: u32,
}

impl HeartbeatValues {
    /// Heart-beats disabled in both directions.
    pub const DISABLED: HeartbeatValues = HeartbeatValues {
        outgoing: 0,
        incoming: 0,
    };

    pub fn new(outgoing: u32, incoming: u32) -> Self {
        Self { outgoing, incoming }
    }

    /// Parse a `heart-beat` header value.
    ///
    /// Missing or blank input parses as `(0,0)`, `"x"` as `(x,0)` and
    /// `",y"` as `(0,y)`. Components that are not numbers count as `0`.
    ///
    /// # Example
    ///
    /// ```
    /// use stompwire::protocol::HeartbeatValues;
    ///
    /// assert_eq!(HeartbeatValues::parse(Some("100,200")), HeartbeatValues::new(100, 200));
    /// assert_eq!(HeartbeatValues::parse(Some(",5")), HeartbeatValues::new(0, 5));
    /// assert_eq!(HeartbeatValues::parse(None), HeartbeatValues::DISABLED);
    /// ```
    pub fn parse(value: Option<&str>) -> Self {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return Self::DISABLED,
        };
        let (outgoing, incoming) = match value.split_once(',') {
            Some((out, inc)) => (parse_component(out), parse_component(inc)),
            None => (parse_component(value), 0),
        };
        Self { outgoing, incoming }
    }

    /// Combine our declaration with the peer's.
    ///
    /// We send at `max(self.outgoing, peer.incoming)` unless either is 0,
    /// and expect to receive at `max(self.incoming, peer.outgoing)` unless
    /// either is 0.
    pub fn combine(&self, peer: &HeartbeatValues) -> HeartbeatValues {
        HeartbeatValues {
            outgoing: negotiate(self.outgoing, peer.incoming),
            incoming: negotiate(self.incoming, peer.outgoing),
        }
    }

    /// Send interval, `None` when disabled.
    pub fn outgoing_interval(&self) -> Option<Duration> {
        (self.outgoing > 0).then(|| Duration::from_millis(u64::from(self.outgoing)))
    }

    /// Receive interval, `None` when disabled.
    pub fn incoming_interval(&self) -> Option<Duration> {
        (self.incoming > 0).then(|| Duration::from_millis(u64::from(self.incoming)))
    }
}

#[inline]
fn negotiate(mine: u32, theirs: u32) -> u32 {
    if mine == 0 || theirs == 0 {
        0
    } else {
        mine.max(theirs)
    }
}

fn parse_component(text: &str) -> u32 {
    text.trim().parse().unwrap_or(0)
}

impl fmt::Display for HeartbeatValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing, self.incoming)
    }
}

impl FromStr for HeartbeatValues {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(Some(s)))
    }
}
