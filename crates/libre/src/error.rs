use std::error::Error as StdError;
use std::fmt;

/// Facade-level error: a [`ErrorKind`] plus the boxed engine error that
/// produced it. Engine crates each keep their own `thiserror` enum; this
/// wrapper is what code calling across engine boundaries deals with, the
/// way `ezk::Error` wraps per-node errors for its own callers.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Box<dyn StdError + Send + Sync>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
    Stun,
    Ice,
    Bfcp,
    Rtmp,
    SipEvent,
    Transport,
    Crypto,
    Buf,
    Config,
    NotInitialized,
}

impl Error {
    pub fn new<E: StdError + Send + Sync + 'static>(kind: ErrorKind, error: E) -> Self {
        Self { kind, source: Box::new(error) }
    }

    pub fn msg(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, source: Box::<dyn StdError + Send + Sync>::from(msg.into()) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.source)
    }
}

macro_rules! wrap_engine_error {
    ($engine_error:ty, $kind:expr) => {
        impl From<$engine_error> for Error {
            fn from(err: $engine_error) -> Self {
                Error::new($kind, err)
            }
        }
    };
}

wrap_engine_error!(libre_stun::Error, ErrorKind::Stun);
wrap_engine_error!(libre_ice::Error, ErrorKind::Ice);
wrap_engine_error!(libre_bfcp::Error, ErrorKind::Bfcp);
wrap_engine_error!(libre_rtmp::Error, ErrorKind::Rtmp);
wrap_engine_error!(libre_sip_event::Error, ErrorKind::SipEvent);
wrap_engine_error!(libre_transport::Error, ErrorKind::Transport);
wrap_engine_error!(libre_crypto::Error, ErrorKind::Crypto);
wrap_engine_error!(libre_buf::Error, ErrorKind::Buf);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert_with_the_right_kind() {
        let err: Error = libre_stun::Error::BadMessage("short header").into();
        assert_eq!(err.kind(), ErrorKind::Stun);
        assert!(err.to_string().contains("short header"));
    }

    #[test]
    fn buffer_errors_convert_to_buf_not_crypto() {
        let err: Error = libre_buf::Error::Underrun { wanted: 4, available: 1 }.into();
        assert_eq!(err.kind(), ErrorKind::Buf);
    }
}
