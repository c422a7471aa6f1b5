//! Coverage artifact exchange: the archive codec used on both sides of the
//! wire, the JSON envelope served by the collection endpoint, and the
//! subprocess contract of the coverage merge toolchain.

pub mod codec;
pub mod envelope;
pub mod toolchain;

use miette::Diagnostic;

pub use codec::{DecodeOptions, DecodeReport, Decoder, decode, encode};
pub use envelope::{COVEROUT_PATH, CoveroutResponse, ErrorResponse, LEGACY_COVEROUT_PATH};
pub use toolchain::{BoxFuture, CoverageToolchain, GoCovdata, ToolchainError};

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    #[diagnostic(code(codec::invalid_encoding))]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("decoded payload is not a valid zip archive: {0}")]
    #[diagnostic(code(codec::invalid_archive))]
    InvalidArchive(#[source] zip::result::ZipError),
    #[error("filepath is tainted: {entry}")]
    #[diagnostic(
        code(codec::path_tainted),
        help("archive entries must stay inside the destination directory")
    )]
    PathTainted { entry: String },
    #[error("too large archive content, maximum is {max_size} bytes")]
    #[diagnostic(code(codec::content_too_large))]
    ContentTooLarge { max_size: u64 },
    #[error("archive contains multiple entrypoints (`{first}` and `{second}`)")]
    #[diagnostic(code(codec::ambiguous_entrypoint))]
    AmbiguousEntrypoint { first: String, second: String },
    #[error("failed to write archive: {0}")]
    #[diagnostic(code(codec::archive_write))]
    ArchiveWrite(#[source] zip::result::ZipError),
    #[error("io error: {0}")]
    #[diagnostic(code(codec::io_error))]
    Io(#[from] std::io::Error),
}
