pub mod direct_url;
pub mod error;
pub mod traits;

pub use direct_url::DirectUrlResolver;
pub use error::{ResolveError, Result};
pub use traits::{Progress, ProgressPhase, ProgressSink, Resolver};
