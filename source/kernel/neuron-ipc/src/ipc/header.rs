// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! IPC message header definition.

use bitflags::bitflags;
use static_assertions::{assert_eq_align, assert_eq_size};
use thiserror::Error;

use crate::rights::Disposition;

bitflags! {
    /// Flags describing what travels alongside the inline body.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HeaderBits: u16 {
        /// One or more rights are attached.
        const COMPLEX = 1 << 0;
        /// A reply right is attached.
        const REPLY = 1 << 1;
    }
}

/// Header carried by every message.
///
/// The header is exactly 16 bytes. `remote` and `local` hold the disposition
/// wire codes of the destination and reply rights (0 when absent).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    bits: u16,
    pub remote: u8,
    pub local: u8,
    pub size: u32,
    pub id: i32,
    pub rights: u16,
    reserved: u16,
}

assert_eq_size!(MessageHeader, [u8; 16]);
assert_eq_align!(MessageHeader, u32);

/// Reasons a raw header is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("unknown header bits {0:#06x}")]
    UnknownBits(u16),
    #[error("invalid disposition code {0}")]
    InvalidDisposition(u8),
    #[error("reply flag does not match the reply disposition")]
    ReplyMismatch,
    #[error("reserved field is not zero")]
    Reserved,
}

impl MessageHeader {
    /// Creates a new header with all fields initialised.
    pub const fn new(
        bits: HeaderBits,
        remote: u8,
        local: u8,
        size: u32,
        id: i32,
        rights: u16,
    ) -> Self {
        Self { bits: bits.bits(), remote, local, size, id, rights, reserved: 0 }
    }

    pub const fn bits(&self) -> HeaderBits {
        HeaderBits::from_bits_truncate(self.bits)
    }

    /// Disposition the sender applied to the destination right.
    pub const fn remote_disposition(&self) -> Option<Disposition> {
        Disposition::from_code(self.remote)
    }

    /// Disposition applied to the reply right, if one was attached.
    pub const fn local_disposition(&self) -> Option<Disposition> {
        Disposition::from_code(self.local)
    }

    /// Serialises the header to little-endian bytes.
    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..2].copy_from_slice(&self.bits.to_le_bytes());
        bytes[2] = self.remote;
        bytes[3] = self.local;
        bytes[4..8].copy_from_slice(&self.size.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.id.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.rights.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.reserved.to_le_bytes());
        bytes
    }

    /// Deserialises and validates a little-endian header.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Result<Self, HeaderError> {
        let [b0, b1, remote, local, s0, s1, s2, s3, i0, i1, i2, i3, r0, r1, z0, z1] = bytes;
        let bits = u16::from_le_bytes([b0, b1]);
        if HeaderBits::from_bits(bits).is_none() {
            return Err(HeaderError::UnknownBits(bits));
        }
        if Disposition::from_code(remote).is_none() {
            return Err(HeaderError::InvalidDisposition(remote));
        }
        if local != 0 && Disposition::from_code(local).is_none() {
            return Err(HeaderError::InvalidDisposition(local));
        }
        let header = Self {
            bits,
            remote,
            local,
            size: u32::from_le_bytes([s0, s1, s2, s3]),
            id: i32::from_le_bytes([i0, i1, i2, i3]),
            rights: u16::from_le_bytes([r0, r1]),
            reserved: u16::from_le_bytes([z0, z1]),
        };
        if header.bits().contains(HeaderBits::REPLY) != (local != 0) {
            return Err(HeaderError::ReplyMismatch);
        }
        if header.reserved != 0 {
            return Err(HeaderError::Reserved);
        }
        Ok(header)
    }
}
