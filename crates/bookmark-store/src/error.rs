use bookmark_api::ApiError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookmarkError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Remote(#[from] ApiError),
}

pub type BookmarkResult<T> = Result<T, BookmarkError>;
