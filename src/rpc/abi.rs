//! Minimal Solidity ABI support for the two pointer getters: encoding a call
//! with `uint256` arguments and decoding a single dynamic `string` return.

use crate::entities::TokenIndex;
use anyhow::{bail, ensure, Context, Result};

const WORD: usize = 32;

/// `contractURI()`
pub const CONTRACT_URI_SELECTOR: [u8; 4] = [0xe8, 0xa3, 0xd4, 0x85];
/// `tokenURI(uint256)`
pub const TOKEN_URI_SELECTOR: [u8; 4] = [0xc8, 0x7b, 0x56, 0xdd];

pub fn encode_contract_uri() -> String {
    encode_call(CONTRACT_URI_SELECTOR, &[])
}

pub fn encode_token_uri(index: &TokenIndex) -> String {
    encode_call(TOKEN_URI_SELECTOR, &[index.to_be_bytes()])
}

/// Hex calldata (`0x` prefixed) for `selector` followed by static words.
pub fn encode_call(selector: [u8; 4], words: &[[u8; WORD]]) -> String {
    let mut data = Vec::with_capacity(4 + words.len() * WORD);
    data.extend_from_slice(&selector);
    for word in words {
        data.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(data))
}

/// Decodes the hex result of an `eth_call` returning `(string)`.
pub fn decode_string(result: &str) -> Result<String> {
    let trimmed = result.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        bail!("eth_call returned no data");
    }

    let bytes = hex::decode(digits).context("eth_call result is not valid hex")?;
    let offset = read_length(&bytes, 0).context("failed to read string offset")?;
    let length = read_length(&bytes, offset).context("failed to read string length")?;
    let start = offset
        .checked_add(WORD)
        .context("string offset overflows")?;
    let end = start.checked_add(length).context("string length overflows")?;
    ensure!(
        end <= bytes.len(),
        "string of {length} bytes exceeds the {} byte result",
        bytes.len()
    );

    String::from_utf8(bytes[start..end].to_vec()).context("string is not valid UTF-8")
}

fn read_length(bytes: &[u8], position: usize) -> Result<usize> {
    let end = position.checked_add(WORD).context("word position overflows")?;
    ensure!(end <= bytes.len(), "word at byte {position} is out of bounds");

    let word = &bytes[position..end];
    let (high, low) = word.split_at(WORD - 8);
    ensure!(
        high.iter().all(|byte| *byte == 0),
        "word at byte {position} is too large"
    );

    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).context("word does not fit in usize")
}

#[cfg(test)]
pub(crate) fn encode_string_result(value: &str) -> String {
    let mut data = Vec::new();
    let mut offset = [0u8; WORD];
    offset[WORD - 1] = WORD as u8;
    data.extend_from_slice(&offset);

    let mut length = [0u8; WORD];
    length[WORD - 8..].copy_from_slice(&(value.len() as u64).to_be_bytes());
    data.extend_from_slice(&length);

    data.extend_from_slice(value.as_bytes());
    let padding = (WORD - value.len() % WORD) % WORD;
    data.extend(std::iter::repeat(0u8).take(padding));
    format!("0x{}", hex::encode(data))
}
