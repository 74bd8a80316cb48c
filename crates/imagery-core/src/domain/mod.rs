//! Domain model (ids, task record, requests, listing, errors, ...).
//!
//! ここにある型は ports / app のどちらからも使われる。
//! 外部システムへの依存（ストア・キュー）は持たない。

pub mod errors;
pub mod ids;
pub mod image_kind;
pub mod list;
pub mod normalize;
pub mod request;
pub mod retry;
pub mod task;

pub use self::errors::{ErrorKind, ServiceError};
pub use self::ids::{ParseTaskIdError, TaskId};
pub use self::image_kind::{ImageKind, UnknownFormat};
pub use self::list::{ListQuery, ListRequest, ListingLimits, SortBy, SortOrder};
pub use self::normalize::{DEFAULT_MAX_DIMENSION, Normalized, normalize};
pub use self::request::{CreateRequest, Upload};
pub use self::retry::RetryStrategy;
pub use self::task::{ImageTask, Operation, TaskResult, TaskStatus};
