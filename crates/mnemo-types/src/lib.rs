pub mod chunk_id;
pub mod file_id;
pub mod snapshot_id;

use thiserror::Error;

/// Error returned when parsing a 40-hex identifier fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} id '{input}': expected 40 hex characters")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
}

pub(crate) fn decode_hex_id(kind: &'static str, input: &str) -> Result<[u8; 20], ParseIdError> {
    let mut out = [0u8; 20];
    if input.len() != 40 || hex::decode_to_slice(input, &mut out).is_err() {
        return Err(ParseIdError {
            kind,
            input: input.to_string(),
        });
    }
    Ok(out)
}
