pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::{RepositoryError, Result};
pub use sqlite::SqliteRepository;
pub use traits::Repository;
