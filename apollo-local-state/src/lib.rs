//! Resolves the `@client` fields of GraphQL operations locally, and merges them with the
//! results of a forward link.

pub mod json_ext;

mod cache;
mod configuration;
mod context;
pub mod error;
mod execution;
pub mod graphql;
pub mod resolvers;
pub mod services;
mod spec;
pub mod store;
pub mod test_harness;

pub use configuration::Cache;
pub use configuration::CacheLimit;
pub use configuration::Configuration;
pub use configuration::ConfigurationError;
pub use configuration::Warnings;
pub use context::Context;
pub use error::LocalStateError;
pub use resolvers::ResolveInfo;
pub use resolvers::Resolver;
pub use resolvers::ResolverContext;
pub use resolvers::ResolverMap;
pub use resolvers::ResolverResult;
pub use resolvers::RootValue;
pub use services::LocalState;
pub use services::LocalStateLayer;
pub use services::LocalStateService;
pub use spec::Fragments;
pub use spec::SpecError;
pub use spec::parse_query;
pub use store::InMemoryStore;
pub use store::Store;
