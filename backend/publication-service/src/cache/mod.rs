/// Ephemeral caching layer
///
/// - `EphemeralCache`: process-local TTL key/value store with prefix
///   invalidation and a background sweeper
/// - `PostCache`: typed read-path cache for published posts, following the
///   documented key scheme
///
/// Entries are never shared across instances; each process accepts its own
/// staleness window.
pub mod post_cache;
pub mod store;

pub use post_cache::PostCache;
pub use store::EphemeralCache;
