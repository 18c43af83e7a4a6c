//! Stream error domains and the NetServices code table.
//!
//! Engines report failures as a `(domain, code)` pair. The pair is the stable,
//! matchable shape; the `Display` output is for diagnostics only.

use std::fmt;

/// Origin of a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// `errno`-style codes.
    Posix,
    /// Carbon/CoreServices `OSStatus` codes.
    OsStatus,
    /// `netdb.h` resolver codes.
    NetDb,
    /// Service registration codes, see [`NetServicesCode`].
    NetServices,
    /// SystemConfiguration framework codes.
    SystemConfiguration,
    /// Any domain not listed above, carrying the raw identifier.
    Custom(i32),
}

impl ErrorDomain {
    /// Raw domain identifier of the platform custom domain.
    pub const RAW_CUSTOM: i32 = -1;
    /// Raw domain identifier of the POSIX domain.
    pub const RAW_POSIX: i32 = 1;
    /// Raw domain identifier of the OSStatus domain.
    pub const RAW_OS_STATUS: i32 = 2;
    /// Raw domain identifier of the NetServices domain.
    pub const RAW_NET_SERVICES: i32 = 10;
    /// Raw domain identifier of the NetDB domain.
    pub const RAW_NET_DB: i32 = 12;
    /// Raw domain identifier of the SystemConfiguration domain.
    pub const RAW_SYSTEM_CONFIGURATION: i32 = 13;

    /// Classify a raw domain identifier. Unknown values become [`ErrorDomain::Custom`].
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            Self::RAW_POSIX => Self::Posix,
            Self::RAW_OS_STATUS => Self::OsStatus,
            Self::RAW_NET_DB => Self::NetDb,
            Self::RAW_NET_SERVICES => Self::NetServices,
            Self::RAW_SYSTEM_CONFIGURATION => Self::SystemConfiguration,
            other => Self::Custom(other),
        }
    }

    /// The raw identifier this domain is reported with.
    pub fn raw(&self) -> i32 {
        match self {
            Self::Posix => Self::RAW_POSIX,
            Self::OsStatus => Self::RAW_OS_STATUS,
            Self::NetDb => Self::RAW_NET_DB,
            Self::NetServices => Self::RAW_NET_SERVICES,
            Self::SystemConfiguration => Self::RAW_SYSTEM_CONFIGURATION,
            Self::Custom(raw) => *raw,
        }
    }

    /// Short name used in formatted errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Posix => "POSIX",
            Self::OsStatus => "OSStatus",
            Self::NetDb => "NetDB",
            Self::NetServices => "NetServices",
            Self::SystemConfiguration => "SystemConfiguration",
            Self::Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codes defined within [`ErrorDomain::NetServices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NetServicesCode {
    /// Unclassified failure.
    Unknown = -72000,
    /// The instance name is already in use within domain and type.
    Collision = -72001,
    /// The service could not be found.
    NotFound = -72002,
    /// An operation is already running on this service.
    InProgress = -72003,
    /// An argument was rejected.
    BadArgument = -72004,
    /// The operation was cancelled.
    Cancel = -72005,
    /// The operation is invalid in the current state.
    Invalid = -72006,
    /// The operation timed out.
    Timeout = -72007,
}

impl NetServicesCode {
    /// Map a raw code. Unrecognized values map to [`NetServicesCode::Unknown`].
    pub fn from_code(code: i32) -> Self {
        match code {
            -72001 => Self::Collision,
            -72002 => Self::NotFound,
            -72003 => Self::InProgress,
            -72004 => Self::BadArgument,
            -72005 => Self::Cancel,
            -72006 => Self::Invalid,
            -72007 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Raw code value.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable name shown in parentheses by [`StreamError`]'s `Display`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Collision => "collision",
            Self::NotFound => "not found",
            Self::InProgress => "in progress",
            Self::BadArgument => "bad argument",
            Self::Cancel => "cancel",
            Self::Invalid => "invalid",
            Self::Timeout => "timeout",
        }
    }
}

/// An error reported by the discovery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamError {
    domain: ErrorDomain,
    code: i32,
}

impl StreamError {
    /// Create an error from a domain and a domain-specific code.
    pub fn new(domain: ErrorDomain, code: i32) -> Self {
        Self { domain, code }
    }

    /// Create an error from raw identifiers as an engine reports them.
    pub fn from_raw(domain: i32, code: i32) -> Self {
        Self::new(ErrorDomain::from_raw(domain), code)
    }

    /// Create a NetServices-domain error.
    pub fn net_services(code: NetServicesCode) -> Self {
        Self::new(ErrorDomain::NetServices, code.code())
    }

    /// Create a POSIX-domain error from an `errno` value.
    pub fn posix(errno: i32) -> Self {
        Self::new(ErrorDomain::Posix, errno)
    }

    /// The error domain.
    pub fn domain(&self) -> ErrorDomain {
        self.domain
    }

    /// The domain-specific code.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The classified code, if this error belongs to the NetServices domain.
    pub fn net_services_code(&self) -> Option<NetServicesCode> {
        match self.domain {
            ErrorDomain::NetServices => Some(NetServicesCode::from_code(self.code)),
            _ => None,
        }
    }

    /// True if this is a NetServices collision.
    pub fn is_collision(&self) -> bool {
        self.net_services_code() == Some(NetServicesCode::Collision)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.net_services_code() {
            Some(ns) => write!(f, "{}: {} ({})", self.domain, self.code, ns.name()),
            None => write!(f, "{}: {}", self.domain, self.code),
        }
    }
}

impl std::error::Error for StreamError {}
