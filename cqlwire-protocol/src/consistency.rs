//! Consistency levels and their wire codes.

use crate::error::DecodeError;
use std::fmt;

/// Replica acknowledgment threshold requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    Serial,
    LocalSerial,
    LocalOne,
}

impl ConsistencyLevel {
    /// All levels, in wire-code order.
    pub const ALL: [ConsistencyLevel; 11] = [
        ConsistencyLevel::Any,
        ConsistencyLevel::One,
        ConsistencyLevel::Two,
        ConsistencyLevel::Three,
        ConsistencyLevel::Quorum,
        ConsistencyLevel::All,
        ConsistencyLevel::LocalQuorum,
        ConsistencyLevel::EachQuorum,
        ConsistencyLevel::Serial,
        ConsistencyLevel::LocalSerial,
        ConsistencyLevel::LocalOne,
    ];

    /// Decodes a wire code. Unknown codes are an error, never a default.
    pub fn from_wire(code: u16) -> Result<Self, DecodeError> {
        let level = match code {
            0x0000 => ConsistencyLevel::Any,
            0x0001 => ConsistencyLevel::One,
            0x0002 => ConsistencyLevel::Two,
            0x0003 => ConsistencyLevel::Three,
            0x0004 => ConsistencyLevel::Quorum,
            0x0005 => ConsistencyLevel::All,
            0x0006 => ConsistencyLevel::LocalQuorum,
            0x0007 => ConsistencyLevel::EachQuorum,
            0x0008 => ConsistencyLevel::Serial,
            0x0009 => ConsistencyLevel::LocalSerial,
            0x000A => ConsistencyLevel::LocalOne,
            other => return Err(DecodeError::InvalidConsistency(other)),
        };
        Ok(level)
    }

    /// Returns the wire code.
    pub fn to_wire(self) -> u16 {
        match self {
            ConsistencyLevel::Any => 0x0000,
            ConsistencyLevel::One => 0x0001,
            ConsistencyLevel::Two => 0x0002,
            ConsistencyLevel::Three => 0x0003,
            ConsistencyLevel::Quorum => 0x0004,
            ConsistencyLevel::All => 0x0005,
            ConsistencyLevel::LocalQuorum => 0x0006,
            ConsistencyLevel::EachQuorum => 0x0007,
            ConsistencyLevel::Serial => 0x0008,
            ConsistencyLevel::LocalSerial => 0x0009,
            ConsistencyLevel::LocalOne => 0x000A,
        }
    }

    /// Returns whether this is a serial (lightweight transaction) level.
    pub fn is_serial(self) -> bool {
        matches!(self, ConsistencyLevel::Serial | ConsistencyLevel::LocalSerial)
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
        };
        f.write_str(name)
    }
}
