use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// A 20-byte object identity, rendered as 40 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; 20]);

impl Oid {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CodecError> {
        let bytes = hex_decode(hex_str)?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CodecError::ShortBuffer { wanted: 20 })?;
        Ok(Self(array))
    }

    pub fn to_hex(self) -> String {
        hex_encode(&self.0)
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Oid({})", self.to_hex())
    }
}

impl std::str::FromStr for Oid {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed zlib stream: {0}")]
    BadZlib(String),

    #[error("malformed hex input: {0}")]
    BadHex(#[from] hex::FromHexError),

    #[error("buffer too short, wanted at least {wanted} bytes")]
    ShortBuffer { wanted: usize },
}

/// SHA-1 digest of `bytes`.
pub fn sha1(bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn hex_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    Ok(hex::decode(s)?)
}

/// Compress `bytes` into a valid zlib stream at the default compression level.
pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut compress = Compress::new(Compression::default(), true);
    let mut out = Vec::with_capacity(bytes.len() + 32);

    loop {
        if out.capacity() - out.len() < 1024 {
            out.reserve(32 * 1024);
        }
        let before_in = compress.total_in();
        let status = compress
            .compress_vec(&bytes[before_in as usize..], &mut out, FlushCompress::Finish)
            .expect("in-memory zlib compression cannot fail");
        if status == Status::StreamEnd {
            break;
        }
    }

    out
}

/// Decompress a zlib stream that may be followed by unrelated bytes.
///
/// Returns the decompressed payload and the number of bytes of `input`
/// the zlib stream itself consumed; callers that walk concatenated
/// streams (the pack parser) rely on this to find the next record.
pub fn inflate(input: &[u8]) -> Result<(Vec<u8>, usize), CodecError> {
    let mut decompress = Decompress::new(true);
    let mut out = Vec::new();

    loop {
        if out.capacity() - out.len() < 1024 {
            out.reserve(32 * 1024);
        }

        let before_in = decompress.total_in();
        let before_out = decompress.total_out();
        let status = decompress
            .decompress_vec(&input[before_in as usize..], &mut out, FlushDecompress::None)
            .map_err(|e| CodecError::BadZlib(e.to_string()))?;

        if status == Status::StreamEnd {
            break;
        }
        if decompress.total_in() == before_in && decompress.total_out() == before_out {
            return Err(CodecError::BadZlib("unexpected end of zlib stream".into()));
        }
    }

    Ok((out, decompress.total_in() as usize))
}
