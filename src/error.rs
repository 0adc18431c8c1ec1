/// Portable socket error code.
///
/// Every native error from either backend lands on exactly one of these.
/// `None` is the code for "no error" (what a clean `SO_ERROR` reads as);
/// it is never carried by an `Err`. Codes the mapping table does not know
/// become `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorCode {
    #[error("no error")]
    None,

    #[error("operation in progress")]
    Again,

    #[error("operation would block")]
    WouldBlock,

    #[error("bad descriptor")]
    BadDescriptor,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("bad address")]
    Fault,

    #[error("interrupted by signal")]
    Interrupted,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("no buffer space available")]
    NoBufferSpace,

    #[error("out of memory")]
    OutOfMemory,

    #[error("not connected")]
    NotConnected,

    #[error("not a socket")]
    NotASocket,

    #[error("permission denied")]
    AccessDenied,

    #[error("address family not supported")]
    AddressFamilyNotSupported,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("protocol not supported")]
    ProtocolNotSupported,

    #[error("unknown socket error")]
    Unknown,
}

impl ErrorCode {
    /// Maps a native error number (`errno` or `WSAGetLastError`).
    #[inline]
    pub fn from_raw_os_error(code: i32) -> Self {
        crate::sys::map_error(code)
    }

    /// Reads the calling thread's last native error.
    #[inline]
    pub fn last_os_error() -> Self {
        Self::from_raw_os_error(errno())
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == ErrorCode::None
    }

    /// `Again` or `WouldBlock`: no progress possible right now.
    #[inline]
    pub fn is_would_block(self) -> bool {
        matches!(self, ErrorCode::Again | ErrorCode::WouldBlock)
    }

    /// Outcomes a non-blocking tick loop retries instead of closing on.
    #[inline]
    pub fn is_retry(self) -> bool {
        self.is_would_block() || self == ErrorCode::Interrupted
    }

    fn kind(self) -> std::io::ErrorKind {
        use std::io::ErrorKind;
        match self {
            ErrorCode::Again | ErrorCode::WouldBlock => ErrorKind::WouldBlock,
            ErrorCode::ConnectionRefused => ErrorKind::ConnectionRefused,
            ErrorCode::Interrupted => ErrorKind::Interrupted,
            ErrorCode::InvalidArgument | ErrorCode::Fault => ErrorKind::InvalidInput,
            ErrorCode::OutOfMemory | ErrorCode::NoBufferSpace => ErrorKind::OutOfMemory,
            ErrorCode::NotConnected => ErrorKind::NotConnected,
            ErrorCode::AccessDenied => ErrorKind::PermissionDenied,
            ErrorCode::AddressFamilyNotSupported | ErrorCode::ProtocolNotSupported => {
                ErrorKind::Unsupported
            }
            _ => ErrorKind::Other,
        }
    }
}

/// Name resolution error, a taxonomy separate from [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ResolveError {
    #[error("no error")]
    None,

    #[error("temporary failure in name resolution")]
    Again,

    #[error("bad value for resolution flags")]
    BadFlags,

    #[error("non-recoverable failure in name resolution")]
    Fail,

    #[error("address family not supported")]
    Family,

    #[error("memory allocation failure")]
    Memory,

    #[error("no address associated with name")]
    NoData,

    #[error("name or service not known")]
    NoName,

    #[error("service not supported for socket type")]
    Service,

    #[error("socket type not supported")]
    SockType,

    #[error("unknown resolution error")]
    Unknown,
}

impl ResolveError {
    /// Maps a native `getaddrinfo` return value.
    #[inline]
    pub fn from_raw(code: i32) -> Self {
        crate::sys::map_resolve_error(code)
    }
}

/// Failures that end an entity's setup.
///
/// Raised by socket creation and listener init/start. Never retried here;
/// the caller decides whether they are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("socket() failed: {code}")]
    Create { code: ErrorCode },

    #[error("resolving {host}:{service} failed: {source}")]
    Resolve {
        host: String,
        service: String,
        #[source]
        source: ResolveError,
    },

    #[error("bind({host}:{service}) failed on all {attempts} candidates: {last}")]
    Bind {
        host: String,
        service: String,
        attempts: usize,
        last: ErrorCode,
    },

    #[error("setsockopt({option}) failed: {code}")]
    Configure { option: &'static str, code: ErrorCode },

    #[error("listen(backlog={backlog}) failed: {code}")]
    Listen { backlog: u32, code: ErrorCode },

    #[error("switching to non-blocking mode failed: {code}")]
    NonBlocking { code: ErrorCode },

    #[error("listener setup thread panicked")]
    SetupPanicked,
}

impl ProvisionError {
    /// The portable code behind this failure, if one exists.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ProvisionError::Create { code }
            | ProvisionError::Configure { code, .. }
            | ProvisionError::Listen { code, .. }
            | ProvisionError::NonBlocking { code } => Some(*code),
            ProvisionError::Bind { last, .. } => Some(*last),
            ProvisionError::Resolve { .. } | ProvisionError::SetupPanicked => None,
        }
    }
}

/// Returns the calling thread's last native socket error number.
#[inline]
pub fn errno() -> i32 {
    crate::sys::last_error()
}

impl From<ErrorCode> for std::io::Error {
    fn from(code: ErrorCode) -> Self {
        std::io::Error::new(code.kind(), code)
    }
}

impl From<ProvisionError> for std::io::Error {
    fn from(err: ProvisionError) -> Self {
        let kind = match &err {
            ProvisionError::Resolve { .. } => std::io::ErrorKind::NotFound,
            ProvisionError::SetupPanicked => std::io::ErrorKind::Other,
            other => other.code().map_or(std::io::ErrorKind::Other, ErrorCode::kind),
        };
        std::io::Error::new(kind, err)
    }
}
