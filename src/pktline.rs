use crate::object::FormatError;

/// Encode `payload` as one pkt-line: a 4-hex-digit length prefix (counting
/// itself) followed by the payload.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 4;
    let mut out = format!("{len:04x}").into_bytes();
    out.extend_from_slice(payload);
    out
}

pub const FLUSH: &[u8] = b"0000";

/// One decoded pkt-line: either a flush (`0000`) or a payload slice.
pub enum PktLine<'a> {
    Flush,
    Data(&'a [u8]),
}

/// Read a single pkt-line from the front of `data`. Returns the decoded
/// line and the number of bytes consumed from `data`.
pub fn read(data: &[u8]) -> Result<(PktLine<'_>, usize), FormatError> {
    if data.len() < 4 {
        return Err(FormatError::BadHeader("truncated pkt-line length".into()));
    }
    let len_str = std::str::from_utf8(&data[..4])
        .map_err(|_| FormatError::BadHeader("pkt-line length is not ASCII hex".into()))?;
    let len = usize::from_str_radix(len_str, 16)
        .map_err(|_| FormatError::BadHeader(format!("bad pkt-line length '{len_str}'")))?;

    if len == 0 {
        return Ok((PktLine::Flush, 4));
    }
    if len < 4 {
        return Err(FormatError::BadHeader(format!("pkt-line length {len} is below the 4-byte minimum")));
    }
    if data.len() < len {
        return Err(FormatError::BadHeader("pkt-line payload runs past end of input".into()));
    }

    Ok((PktLine::Data(&data[4..len]), len))
}

/// Read every pkt-line in `data` up to (and consuming) the first flush,
/// or to the end of input if no flush is present.
pub fn read_all(mut data: &[u8]) -> Result<Vec<Vec<u8>>, FormatError> {
    let mut lines = Vec::new();
    while !data.is_empty() {
        let (line, consumed) = read(data)?;
        data = &data[consumed..];
        match line {
            PktLine::Flush => break,
            PktLine::Data(payload) => lines.push(payload.to_vec()),
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_read_round_trips() {
        let encoded = encode(b"want deadbeef\n");
        let (line, consumed) = read(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        match line {
            PktLine::Data(payload) => assert_eq!(payload, b"want deadbeef\n"),
            PktLine::Flush => panic!("expected data"),
        }
    }

    #[test]
    fn flush_packet_decodes_as_flush() {
        let (line, consumed) = read(FLUSH).unwrap();
        assert_eq!(consumed, 4);
        assert!(matches!(line, PktLine::Flush));
    }

    #[test]
    fn read_all_stops_at_flush() {
        let mut data = encode(b"one");
        data.extend_from_slice(&encode(b"two"));
        data.extend_from_slice(FLUSH);
        data.extend_from_slice(&encode(b"three"));

        let lines = read_all(&data).unwrap();
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
    }
}
