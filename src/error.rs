//! Protocol error types
//!
//! `XError` is what a request handler reports back to the offending client as
//! a 32-byte error packet. `RequestError` adds the one outcome that ends the
//! connection instead.

use thiserror::Error;

/// Core protocol error, carrying the bad resource id or value where the wire
/// format has one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum XError {
    #[error("bad request")]
    Request,
    #[error("bad value {0:#x}")]
    Value(u32),
    #[error("bad window {0:#x}")]
    Window(u32),
    #[error("bad pixmap {0:#x}")]
    Pixmap(u32),
    #[error("bad atom {0}")]
    Atom(u32),
    #[error("bad cursor {0:#x}")]
    Cursor(u32),
    #[error("bad font {0:#x}")]
    Font(u32),
    #[error("bad match")]
    Match,
    #[error("bad drawable {0:#x}")]
    Drawable(u32),
    #[error("bad access")]
    Access,
    #[error("allocation failed")]
    Alloc,
    #[error("bad colormap {0:#x}")]
    Colormap(u32),
    #[error("bad graphics context {0:#x}")]
    GContext(u32),
    #[error("bad id choice {0:#x}")]
    IdChoice(u32),
    #[error("bad name")]
    Name,
    #[error("bad length")]
    Length,
    #[error("not implemented")]
    Implementation,
}

impl XError {
    /// Error code as sent in byte 1 of the error packet.
    pub fn code(&self) -> u8 {
        match self {
            XError::Request => 1,
            XError::Value(_) => 2,
            XError::Window(_) => 3,
            XError::Pixmap(_) => 4,
            XError::Atom(_) => 5,
            XError::Cursor(_) => 6,
            XError::Font(_) => 7,
            XError::Match => 8,
            XError::Drawable(_) => 9,
            XError::Access => 10,
            XError::Alloc => 11,
            XError::Colormap(_) => 12,
            XError::GContext(_) => 13,
            XError::IdChoice(_) => 14,
            XError::Name => 15,
            XError::Length => 16,
            XError::Implementation => 17,
        }
    }

    /// The `bad value` field of the error packet.
    pub fn bad_value(&self) -> u32 {
        match *self {
            XError::Value(v)
            | XError::Window(v)
            | XError::Pixmap(v)
            | XError::Atom(v)
            | XError::Cursor(v)
            | XError::Font(v)
            | XError::Drawable(v)
            | XError::Colormap(v)
            | XError::GContext(v)
            | XError::IdChoice(v) => v,
            _ => 0,
        }
    }
}

/// Failure of a single request handler.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Reported to the client; the connection stays open.
    #[error(transparent)]
    Protocol(#[from] XError),
    /// The connection cannot continue and moves to `Closed`.
    #[error("fatal connection error: {0}")]
    Fatal(String),
}

/// Successful outcome of a request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The request was consumed, including any reply or error it produced.
    Handled,
    /// Not enough write buffer space; retry later without consuming input.
    WouldBlock,
}

pub type RequestResult = std::result::Result<Flow, RequestError>;

/// Logs and panics on an internal invariant violation. The release profile
/// aborts on panic, so these never unwind in production.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        tracing::error!($($arg)*);
        panic!($($arg)*)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(XError::Request.code(), 1);
        assert_eq!(XError::Window(7).code(), 3);
        assert_eq!(XError::GContext(1).code(), 13);
        assert_eq!(XError::Length.code(), 16);
        assert_eq!(XError::Implementation.code(), 17);
    }

    #[test]
    fn test_bad_value() {
        assert_eq!(XError::Window(0x200001).bad_value(), 0x200001);
        assert_eq!(XError::Match.bad_value(), 0);
        assert_eq!(XError::Value(42).bad_value(), 42);
    }

    #[test]
    fn test_protocol_conversion() {
        let err: RequestError = XError::Access.into();
        assert!(matches!(err, RequestError::Protocol(XError::Access)));
    }
}
