use jp2::JP2Error;
use jpc::CodestreamError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotJP2Format(String),
    #[error("error decoding jp2 container: {0}")]
    BoxParse(JP2Error),
    #[error("error decoding jpc codestream: {0}")]
    MarkerParse(CodestreamError),
    #[error("components must all have the same subsampling factors: {0}")]
    MixedSubsampling(String),
    #[error("components must all have the same sample type: {0}")]
    MixedPrecision(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid decode area: {0}")]
    DecodeArea(String),
    #[error("codec engine failure: {0}")]
    Engine(String),
    #[error("unsupported precision of {precision} bits")]
    UnsupportedPrecision { precision: u8 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<JP2Error> for Error {
    fn from(error: JP2Error) -> Self {
        match error {
            JP2Error::NotJP2Format { .. } => Error::NotJP2Format(error.to_string()),
            JP2Error::Io(e) => Error::Io(e),
            error => Error::BoxParse(error),
        }
    }
}

impl From<CodestreamError> for Error {
    fn from(error: CodestreamError) -> Self {
        match error {
            CodestreamError::Io(e) => Error::Io(e),
            error => Error::MarkerParse(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
