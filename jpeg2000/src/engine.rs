use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::options::{DecoderParameters, EncoderParameters};
use jp2::FileFormat;
use std::path::Path;

/// One decoded component, copied out of the engine's own buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedComponent {
    pub width: u32,
    pub height: u32,
    pub precision: u8,
    pub signed: bool,
    pub dx: u32,
    pub dy: u32,
    // Row-major, width * height samples
    pub data: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedImage {
    pub components: Vec<DecodedComponent>,
}

/// Planar samples handed to an engine for compression.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentImage {
    pub rows: usize,
    pub cols: usize,
    pub precision: u8,
    pub signed: bool,
    // One row-major plane of rows * cols samples per component
    pub components: Vec<Vec<i32>>,
}

/// Compression and decompression of whole files.
///
/// Parameters arrive validated. Messages produced while the call runs go to
/// `sink`; a failed call returns [`crate::Error::Engine`].
pub trait CodecEngine {
    fn decode(
        &self,
        path: &Path,
        format: FileFormat,
        parameters: &DecoderParameters,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<DecodedImage>;

    fn encode(
        &self,
        path: &Path,
        format: FileFormat,
        parameters: &EncoderParameters,
        image: &ComponentImage,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<()>;
}
