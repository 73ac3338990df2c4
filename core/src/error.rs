use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("tone encoder produced no symbols")]
    EncoderFailure,

    #[error("tone index {0} outside the 8-FSK range")]
    InvalidTone(u8),

    #[error("waveform buffer too small: need {needed} samples, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("message empty after FT8 filtering")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, ChatError>;
