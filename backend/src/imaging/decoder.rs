use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const DEFAULT_MIN_IMAGE_BYTES: usize = 1000;

const DATA_URI_PREFIXES: [&str; 4] = [
    "data:image/jpeg;base64,",
    "data:image/jpg;base64,",
    "data:image/png;base64,",
    "data:image/webp;base64,",
];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Malformed(#[from] base64::DecodeError),
    #[error("Decoded image is empty")]
    Empty,
    #[error("Decoded image too small: {size} bytes (minimum {minimum})")]
    TooSmall { size: usize, minimum: usize },
}

#[derive(Debug)]
pub struct DecodedImage {
    bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ImageDecoder {
    min_bytes: usize,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_IMAGE_BYTES)
    }
}

impl ImageDecoder {
    pub fn new(min_bytes: usize) -> Self {
        Self { min_bytes }
    }

    /// Decodes a browser-captured frame. Only the size is checked, the bytes
    /// are not sniffed for an image format.
    pub fn decode(&self, input: &str) -> Result<DecodedImage, DecodeError> {
        let payload = strip_data_uri_prefix(input);
        let compact: String = payload
            .chars()
            .filter(|c| !matches!(c, ' ' | '\n' | '\r' | '\t'))
            .collect();

        let bytes = STANDARD.decode(compact.as_bytes())?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() < self.min_bytes {
            return Err(DecodeError::TooSmall {
                size: bytes.len(),
                minimum: self.min_bytes,
            });
        }

        Ok(DecodedImage { bytes })
    }
}

fn strip_data_uri_prefix(input: &str) -> &str {
    DATA_URI_PREFIXES
        .iter()
        .find_map(|prefix| input.strip_prefix(prefix))
        .unwrap_or(input)
}
