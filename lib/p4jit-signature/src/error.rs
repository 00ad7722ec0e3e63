use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("no definition of `{0}` found in the source (only declarations or call sites, or no match at all)")]
    NotFound(String),

    #[error("extracted prototype did not parse as C: {0}")]
    Unparseable(String),

    #[error("signature needs {slots} argument slots but the wrapper's io[] array only holds {max}")]
    TooWide { slots: u32, max: u32 },
}

pub type Result<T> = std::result::Result<T, SignatureError>;
