/// Failures while decoding, mixing or encoding audio.
#[derive(Debug, thiserror::Error)]
pub enum MixError {
    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to encode mix: {0}")]
    Encode(#[source] hound::Error),

    #[error("Invalid mix input: {0}")]
    InvalidInput(String),
}
