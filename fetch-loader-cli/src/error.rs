use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader error: {0}")]
    Loader(#[from] fetch_loader::LoaderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Broken pipe: consumer closed the connection")]
    BrokenPipe,
}

impl AppError {
    /// Maps a sink write failure, keeping a closed stdout distinct.
    pub fn from_write(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            AppError::BrokenPipe
        } else {
            AppError::Io(err)
        }
    }
}
