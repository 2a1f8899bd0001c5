use super::{EntityKind, ManagedEntity};
use crate::metadata::MetadataDocument;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::str::FromStr;

/// On-chain `uint256` token index, stored big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenIndex([u8; 32]);

impl TokenIndex {
    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    fn from_decimal(digits: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        for ch in digits.chars() {
            let digit = ch
                .to_digit(10)
                .with_context(|| format!("invalid decimal digit {ch:?} in token index"))?;
            let mut carry = digit;
            for byte in bytes.iter_mut().rev() {
                let value = u32::from(*byte) * 10 + carry;
                *byte = (value & 0xff) as u8;
                carry = value >> 8;
            }
            if carry != 0 {
                bail!("token index {digits} does not fit in 256 bits");
            }
        }
        Ok(Self(bytes))
    }

    fn from_hex(digits: &str) -> Result<Self> {
        if digits.len() > 64 {
            bail!("token index 0x{digits} does not fit in 256 bits");
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .with_context(|| format!("invalid hex token index 0x{digits}"))?;
        Ok(Self(bytes))
    }
}

impl From<u64> for TokenIndex {
    fn from(value: u64) -> Self {
        Self::from(u128::from(value))
    }
}

impl From<u128> for TokenIndex {
    fn from(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[16..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl FromStr for TokenIndex {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            bail!("token index cannot be empty");
        }
        match value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
        {
            Some(digits) if !digits.is_empty() => Self::from_hex(digits),
            Some(_) => bail!("token index {value} has no hex digits"),
            None => Self::from_decimal(value),
        }
    }
}

impl fmt::Display for TokenIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut remaining = self.0;
        let mut digits = Vec::new();
        while remaining.iter().any(|byte| *byte != 0) {
            let mut rem = 0u32;
            for byte in remaining.iter_mut() {
                let value = (rem << 8) | u32::from(*byte);
                *byte = (value / 10) as u8;
                rem = value % 10;
            }
            digits.push(char::from(b'0' + rem as u8));
        }
        if digits.is_empty() {
            return f.write_str("0");
        }
        let text: String = digits.into_iter().rev().collect();
        f.write_str(&text)
    }
}

/// Token-level entity whose pointer is `tokenURI(numeric_id)` on its contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntity {
    pub id: String,
    pub contract_id: String,
    pub numeric_id: TokenIndex,
    pub token_uri: Option<String>,
    pub updated_at: Option<u64>,
    pub metadata: Option<MetadataDocument>,
}

impl TokenEntity {
    pub fn new(contract_id: impl Into<String>, numeric_id: impl Into<TokenIndex>) -> Self {
        let contract_id = contract_id.into();
        let numeric_id = numeric_id.into();
        Self {
            id: format!("{contract_id}-{numeric_id}"),
            contract_id,
            numeric_id,
            token_uri: None,
            updated_at: None,
            metadata: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = Some(uri.into());
        self
    }

    /// Replaces the whole document, attributes included.
    pub fn apply_metadata(&mut self, metadata: MetadataDocument) {
        self.metadata = Some(metadata);
    }
}

impl ManagedEntity for TokenEntity {
    const KIND: EntityKind = EntityKind::Token;

    fn id(&self) -> &str {
        &self.id
    }

    fn pointer(&self) -> Option<&str> {
        self.token_uri.as_deref()
    }

    fn set_pointer(&mut self, pointer: String, updated_at: u64) {
        self.token_uri = Some(pointer);
        self.updated_at = Some(updated_at);
    }

    fn has_document(&self) -> bool {
        self.metadata.is_some()
    }

    fn last_updated_at(&self) -> Option<u64> {
        self.updated_at
    }
}
