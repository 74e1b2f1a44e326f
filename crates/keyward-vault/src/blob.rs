// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store blob codec.
//!
//! Layout (big-endian integers):
//!
//! ```text
//! magic "KWDB" | version u32 | signature [16] | sequence u32
//! | idle_timeout_secs u32 | lock_on_sleep u8
//! | public_len u32 | public (ACL section)
//! | private_len u32 | private (salt, KDF params, sealed working keys)
//! ```
//!
//! Everything before `private_len` is authenticated as associated data when
//! the private section is sealed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use keyward_core::{KeywardError, StoreParams, StoreSignature};
use keyward_core::types::STORE_SIGNATURE_LEN;

pub const STORE_BLOB_MAGIC: [u8; 4] = *b"KWDB";
pub const STORE_BLOB_VERSION: u32 = 1;

/// Decoded blob framing. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBlob {
    pub signature: StoreSignature,
    pub sequence: u32,
    pub params: StoreParams,
    pub public: Bytes,
    pub private: Bytes,
}

impl StoreBlob {
    /// Parse a blob. The version is checked before anything past it is read.
    pub fn decode(data: &[u8]) -> Result<Self, KeywardError> {
        let mut buf = data;
        let magic = take_array::<4>(&mut buf, "magic")?;
        if magic != STORE_BLOB_MAGIC {
            return Err(malformed("bad magic"));
        }
        let version = take_u32(&mut buf, "version")?;
        if version != STORE_BLOB_VERSION {
            return Err(KeywardError::IncompatibleBlobFormat { version });
        }
        let signature = StoreSignature(take_array::<STORE_SIGNATURE_LEN>(&mut buf, "signature")?);
        let sequence = take_u32(&mut buf, "sequence")?;
        let idle_timeout_secs = take_u32(&mut buf, "idle timeout")?;
        let lock_on_sleep = match take_array::<1>(&mut buf, "lock on sleep")?[0] {
            0 => false,
            1 => true,
            other => return Err(malformed(&format!("lock-on-sleep flag {other}"))),
        };
        let public = take_section(&mut buf, "public section")?;
        let private = take_section(&mut buf, "private section")?;
        if buf.has_remaining() {
            return Err(malformed("trailing bytes"));
        }
        Ok(Self {
            signature,
            sequence,
            params: StoreParams {
                idle_timeout_secs,
                lock_on_sleep,
            },
            public,
            private,
        })
    }

    /// Read only the version and signature, e.g. to find a live store for a blob.
    pub fn peek_identity(data: &[u8]) -> Result<StoreSignature, KeywardError> {
        let mut buf = data;
        let magic = take_array::<4>(&mut buf, "magic")?;
        if magic != STORE_BLOB_MAGIC {
            return Err(malformed("bad magic"));
        }
        let version = take_u32(&mut buf, "version")?;
        if version != STORE_BLOB_VERSION {
            return Err(KeywardError::IncompatibleBlobFormat { version });
        }
        Ok(StoreSignature(take_array::<STORE_SIGNATURE_LEN>(
            &mut buf,
            "signature",
        )?))
    }

    /// Authenticated header: everything up to the private section.
    pub fn associated_data(
        signature: &StoreSignature,
        sequence: u32,
        params: &StoreParams,
        public: &[u8],
    ) -> BytesMut {
        let mut out = BytesMut::with_capacity(4 + 4 + STORE_SIGNATURE_LEN + 13 + 4 + public.len());
        out.put_slice(&STORE_BLOB_MAGIC);
        out.put_u32(STORE_BLOB_VERSION);
        out.put_slice(&signature.0);
        out.put_u32(sequence);
        out.put_u32(params.idle_timeout_secs);
        out.put_u8(u8::from(params.lock_on_sleep));
        put_section(&mut out, public);
        out
    }

    pub fn header(&self) -> BytesMut {
        Self::associated_data(&self.signature, self.sequence, &self.params, &self.public)
    }

    pub fn encode(&self) -> Bytes {
        let mut out = self.header();
        out.reserve(4 + self.private.len());
        put_section(&mut out, &self.private);
        out.freeze()
    }
}

fn section_len(section: &[u8]) -> u32 {
    // Sections are an ACL and a few sealed keys; far below 4 GiB.
    u32::try_from(section.len()).unwrap_or(u32::MAX)
}

fn malformed(what: &str) -> KeywardError {
    KeywardError::MalformedBlob(format!("store blob: {what}"))
}

/// Append a length-prefixed section.
pub(crate) fn put_section(out: &mut BytesMut, section: &[u8]) {
    out.put_u32(section_len(section));
    out.put_slice(section);
}

pub(crate) fn take_u32(buf: &mut &[u8], field: &str) -> Result<u32, KeywardError> {
    if buf.remaining() < 4 {
        return Err(KeywardError::MalformedBlob(format!("truncated at {field}")));
    }
    Ok(buf.get_u32())
}

pub(crate) fn take_array<const N: usize>(
    buf: &mut &[u8],
    field: &str,
) -> Result<[u8; N], KeywardError> {
    if buf.remaining() < N {
        return Err(KeywardError::MalformedBlob(format!("truncated at {field}")));
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

pub(crate) fn take_section(buf: &mut &[u8], field: &str) -> Result<Bytes, KeywardError> {
    let len = take_u32(buf, field)? as usize;
    if buf.remaining() < len {
        return Err(KeywardError::MalformedBlob(format!("truncated {field}")));
    }
    Ok(buf.copy_to_bytes(len))
}
