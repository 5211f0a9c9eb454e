//! Stream closure codes.

use std::fmt;

/// WebSocket closure status code.
///
/// Only [`CloseCode::NORMAL`] marks a deliberate, client-initiated teardown.
/// Every other code (including the locally synthesized
/// [`CloseCode::ABNORMAL`] for dropped transports and timeouts) is treated as
/// a network-induced drop and feeds the reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// Normal closure (1000).
    pub const NORMAL: Self = Self(1000);

    /// Endpoint going away (1001).
    pub const GOING_AWAY: Self = Self(1001);

    /// Close frame carried no status (1005). Never sent on the wire.
    pub const NO_STATUS: Self = Self(1005);

    /// Closed without a close frame (1006). Never sent on the wire.
    pub const ABNORMAL: Self = Self(1006);

    /// Wrap a raw status code.
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Raw status code.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// True for the deliberate-close code that must not trigger a reconnect.
    pub fn is_deliberate(self) -> bool {
        self == Self::NORMAL
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_normal_closure_is_deliberate() {
        assert!(CloseCode::NORMAL.is_deliberate());
        assert!(!CloseCode::GOING_AWAY.is_deliberate());
        assert!(!CloseCode::ABNORMAL.is_deliberate());
        assert!(!CloseCode::NO_STATUS.is_deliberate());
        assert!(!CloseCode::new(4000).is_deliberate());
    }
}
