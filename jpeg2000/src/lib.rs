//! Reading and writing JPEG 2000 imagery.
//!
//! Container and codestream metadata come from the `jp2` and `jpc` parsers.
//! Compression is delegated to a [`CodecEngine`], with an OpenJPEG backed
//! engine available behind the `openjpeg` feature.

mod diagnostics;
mod engine;
mod error;
mod geometry;
mod image;
mod jp2k;
#[cfg(feature = "openjpeg")]
mod openjpeg;
mod options;

pub use diagnostics::{DiagnosticSink, LogSink};
pub use engine::{CodecEngine, ComponentImage, DecodedComponent, DecodedImage};
pub use error::{Error, Result};
pub use geometry::{ComponentGeometry, Geometry, SampleType};
pub use image::{ImageData, Sample};
pub use jp2::FileFormat;
pub use jp2k::Jp2k;
#[cfg(feature = "openjpeg")]
pub use openjpeg::OpenJpeg;
pub use options::{
    Colorspace, DecodeArea, DecoderParameters, EncoderParameters, QualityLayers, ReadOptions,
    Reduce, WriteOptions,
};
