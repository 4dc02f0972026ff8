//! Resolver module - the fallback state machine and request coalescing.

mod fallback_resolver;
mod resolver_merge;
mod resolver_model;
mod resolver_service;
mod resolver_state;


pub use fallback_resolver::{ResolverCore, ResolverSettings};
pub use resolver_merge::{merge_staged, StagedResults};
pub use resolver_model::{
    CacheSnapshot, Resolution, ResolutionStatus, ResolveRequest, SharedPriority,
};
pub use resolver_service::Resolver;
pub use resolver_state::ResolutionState;
