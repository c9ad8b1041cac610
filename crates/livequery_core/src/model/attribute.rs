//! Binary attribute codecs for typed values stored in blob fields.
//!
//! # Invariants
//! - `decode(encode(value)) == value` bit-for-bit, including non-finite
//!   channel values.
//! - Encoded payloads start with a one-byte format tag.

use crate::model::record::FieldValue;
use std::error::Error;
use std::fmt::{Display, Formatter};

const COLOR_FORMAT_TAG: u8 = 1;
const COLOR_PAYLOAD_LEN: usize = 1 + 4 * 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDecodeError {
    /// Field is not a blob (or is null).
    NotBlob,
    UnexpectedLength { expected: usize, actual: usize },
    UnknownFormatTag(u8),
}

impl Display for AttributeDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotBlob => write!(f, "attribute field does not hold a blob"),
            Self::UnexpectedLength { expected, actual } => write!(
                f,
                "attribute payload has {actual} bytes, expected {expected}"
            ),
            Self::UnknownFormatTag(tag) => write!(f, "unknown attribute format tag {tag}"),
        }
    }
}

impl Error for AttributeDecodeError {}

/// Encodes one typed attribute to bytes and back.
pub trait AttributeCodec {
    type Value;

    fn encode(&self, value: &Self::Value) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, AttributeDecodeError>;

    fn to_field(&self, value: &Self::Value) -> FieldValue {
        FieldValue::Blob(self.encode(value))
    }

    fn from_field(&self, field: &FieldValue) -> Result<Self::Value, AttributeDecodeError> {
        let bytes = field.as_blob().ok_or(AttributeDecodeError::NotBlob)?;
        self.decode(bytes)
    }
}

/// Colour in RGBA channels, each nominally in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Rgba {
    pub fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

/// Tag byte followed by four big-endian `f32` channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorAttributeCodec;

impl AttributeCodec for ColorAttributeCodec {
    type Value = Rgba;

    fn encode(&self, value: &Rgba) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(COLOR_PAYLOAD_LEN);
        bytes.push(COLOR_FORMAT_TAG);
        for channel in [value.red, value.green, value.blue, value.alpha] {
            bytes.extend_from_slice(&channel.to_bits().to_be_bytes());
        }
        bytes
    }

    fn decode(&self, bytes: &[u8]) -> Result<Rgba, AttributeDecodeError> {
        if bytes.len() != COLOR_PAYLOAD_LEN {
            return Err(AttributeDecodeError::UnexpectedLength {
                expected: COLOR_PAYLOAD_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[0] != COLOR_FORMAT_TAG {
            return Err(AttributeDecodeError::UnknownFormatTag(bytes[0]));
        }

        let mut channels = [0f32; 4];
        for (index, chunk) in bytes[1..].chunks_exact(4).enumerate() {
            let raw = [chunk[0], chunk[1], chunk[2], chunk[3]];
            channels[index] = f32::from_bits(u32::from_be_bytes(raw));
        }
        Ok(Rgba::new(channels[0], channels[1], channels[2], channels[3]))
    }
}
