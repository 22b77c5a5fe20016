/// Pre-connect attribute id for bearer-token SQL authentication.
pub const SQL_COPT_SS_ACCESS_TOKEN: i32 = 1256;

/// UTF-16LE token bytes prefixed with their byte length as a little-endian `u32`.
pub fn encode_access_token(token: &str) -> Vec<u8> {
    let body: Vec<u8> = token.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let len = u32::try_from(body.len()).unwrap_or(u32::MAX);

    let mut encoded = Vec::with_capacity(body.len() + 4);
    encoded.extend_from_slice(&len.to_le_bytes());
    encoded.extend_from_slice(&body);
    encoded
}

/// Inverse of [`encode_access_token`]; `None` if the framing is inconsistent.
pub fn decode_access_token(bytes: &[u8]) -> Option<String> {
    let (prefix, body) = bytes.split_first_chunk::<4>()?;
    let len = usize::try_from(u32::from_le_bytes(*prefix)).ok()?;
    if len != body.len() || len % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
