pub mod decoder;

pub use decoder::{DecodeError, DecodedImage, ImageDecoder};
