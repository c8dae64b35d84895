pub mod config;
pub mod domain;
pub mod errors;
pub mod rate_limit;
pub mod validation;

pub use domain::picklist::{Picklist, PicklistKind};
pub use domain::record::{parse_record_id, RecordId, RecordRef, UserIdentity};
pub use errors::{GatewayError, GatewayResult, UpstreamError};
pub use rate_limit::{Clock, CreatePermit, RateLimitPolicy, RateLimited, RateLimiter, SystemClock};
pub use validation::ValidationError;
