pub mod error;
pub mod key;

pub use error::{CacheError, ErrorKind, Result};
pub use key::{CacheKey, Namespace};
