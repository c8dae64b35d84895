pub mod access;
pub mod client;
pub mod resolver;
pub mod soql;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use access::{AccessControlPolicy, AccessDecision, ACCESS_DENIED_REASON};
pub use client::{
    ClientBuildError, CreatedRecord, QueryResult, Record, SalesforceApi, SalesforceClient,
};
pub use resolver::IdentifierResolver;
pub use soql::CannedQuery;
