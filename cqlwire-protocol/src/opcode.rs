//! Frame opcodes.

use std::fmt;

/// Message type carried in the opcode byte of every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Credentials = 0x04,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl Opcode {
    /// Returns the wire byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes an opcode byte, returning `None` for unassigned values.
    pub fn from_u8(byte: u8) -> Option<Self> {
        let op = match byte {
            0x00 => Opcode::Error,
            0x01 => Opcode::Startup,
            0x02 => Opcode::Ready,
            0x03 => Opcode::Authenticate,
            0x04 => Opcode::Credentials,
            0x05 => Opcode::Options,
            0x06 => Opcode::Supported,
            0x07 => Opcode::Query,
            0x08 => Opcode::Result,
            0x09 => Opcode::Prepare,
            0x0A => Opcode::Execute,
            0x0B => Opcode::Register,
            0x0C => Opcode::Event,
            0x0D => Opcode::Batch,
            0x0E => Opcode::AuthChallenge,
            0x0F => Opcode::AuthResponse,
            0x10 => Opcode::AuthSuccess,
            _ => return None,
        };
        Some(op)
    }

    /// Returns whether a client may send this opcode.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Opcode::Startup
                | Opcode::Credentials
                | Opcode::Options
                | Opcode::Query
                | Opcode::Prepare
                | Opcode::Execute
                | Opcode::Register
                | Opcode::Batch
                | Opcode::AuthResponse
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Error => "ERROR",
            Opcode::Startup => "STARTUP",
            Opcode::Ready => "READY",
            Opcode::Authenticate => "AUTHENTICATE",
            Opcode::Credentials => "CREDENTIALS",
            Opcode::Options => "OPTIONS",
            Opcode::Supported => "SUPPORTED",
            Opcode::Query => "QUERY",
            Opcode::Result => "RESULT",
            Opcode::Prepare => "PREPARE",
            Opcode::Execute => "EXECUTE",
            Opcode::Register => "REGISTER",
            Opcode::Event => "EVENT",
            Opcode::Batch => "BATCH",
            Opcode::AuthChallenge => "AUTH_CHALLENGE",
            Opcode::AuthResponse => "AUTH_RESPONSE",
            Opcode::AuthSuccess => "AUTH_SUCCESS",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes() {
        for byte in 0x00..=0x10u8 {
            let op = Opcode::from_u8(byte).unwrap();
            assert_eq!(op.as_u8(), byte);
        }
        assert_eq!(Opcode::from_u8(0x11), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_request_opcodes() {
        assert!(Opcode::Startup.is_request());
        assert!(Opcode::Options.is_request());
        assert!(Opcode::Query.is_request());
        assert!(Opcode::AuthResponse.is_request());

        // Server-to-client only
        assert!(!Opcode::Ready.is_request());
        assert!(!Opcode::Result.is_request());
        assert!(!Opcode::Supported.is_request());
        assert!(!Opcode::Error.is_request());
        assert!(!Opcode::AuthSuccess.is_request());
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(Opcode::AuthChallenge.to_string(), "AUTH_CHALLENGE");
        assert_eq!(Opcode::Query.to_string(), "QUERY");
    }
}
