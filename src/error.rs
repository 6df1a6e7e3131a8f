// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;
use tokio::sync::mpsc;

use crate::commands::{DispatcherToTransportCmd, SchedulerToDispatcherCmd, TransportToDispatcherCmd};

/// Represent the types of errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error.
    DecodeError,

    /// Send packet error.
    SendError,

    /// Config file is malformed or fails a validation rule.
    ConfigError,

    /// Logger backend failed to initialize.
    LoggerError,

    /// Session not found in the session registry.
    SessionNotFound,

    /// Topic alias space for a session is exhausted.
    RegistryFull,

    /// A subscription filter violates a configured limit.
    LimitExceeded,

    /// A session's outbound queue is full; message diverted to dead-letter.
    QueueFull,

    /// A message arrived that is not valid for the session's current state.
    ProtocolViolation,

    /// mpsc channel error.
    ChannelError,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Error {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Error { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<sngw_codec::EncodeError> for Error {
    fn from(err: sngw_codec::EncodeError) -> Self {
        Error::from_string(ErrorKind::EncodeError, format!("{err:?}"))
    }
}

impl From<sngw_codec::DecodeError> for Error {
    fn from(err: sngw_codec::DecodeError) -> Self {
        Error::from_string(ErrorKind::DecodeError, format!("{err:?}"))
    }
}

macro_rules! convert_send_error {
    ($cmd_type: ident) => {
        impl From<mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: mpsc::error::SendError<$cmd_type>) -> Self {
                Error::from_string(
                    ErrorKind::ChannelError,
                    format!("{} channel error: {}", stringify!($cmd_type), err),
                )
            }
        }
    };
}

convert_send_error!(DispatcherToTransportCmd);
convert_send_error!(TransportToDispatcherCmd);
convert_send_error!(SchedulerToDispatcherCmd);
