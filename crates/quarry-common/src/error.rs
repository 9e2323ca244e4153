use thiserror::Error;

/// Top-level error type for the QuarryDB storage engine.
///
/// Expected outcomes of an operation (page not resident, duplicate key,
/// buffer at capacity) are reported through `Option`/`bool` return values,
/// never through this type. An `Err` means the operation could not run at
/// all, almost always because the disk manager failed underneath it.
#[derive(Error, Debug)]
pub enum QuarryError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type QuarryResult<T> = Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: QuarryError = io_err.into();
        assert!(matches!(err, QuarryError::Io { .. }));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn display_formatting() {
        let err = QuarryError::Storage("buffer pool exhausted".to_string());
        assert_eq!(err.to_string(), "storage error: buffer pool exhausted");

        let err = QuarryError::Index("directory at maximum depth".to_string());
        assert_eq!(err.to_string(), "index error: directory at maximum depth");
    }

    #[test]
    fn result_alias_works() {
        fn returns_ok() -> QuarryResult<u32> {
            Ok(7)
        }
        fn returns_err() -> QuarryResult<u32> {
            Err(QuarryError::Internal("oops".into()))
        }
        assert_eq!(returns_ok().unwrap(), 7);
        assert!(returns_err().is_err());
    }
}
