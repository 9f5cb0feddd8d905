use super::EphemeralCache;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::{CategoryCount, PageRequest, Post};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const LIST_PREFIX: &str = "posts:list:";
const SINGLE_PREFIX: &str = "posts:single:";
const CATEGORIES_KEY: &str = "posts:categories";
const VIEW_PREFIX: &str = "views:seen:";

/// Read-path cache for published posts.
///
/// Key scheme:
/// - `posts:list:{page}:{limit}:{category|all}` (list TTL)
/// - `posts:single:{id}` (single-post TTL)
/// - `posts:categories` (category aggregate TTL)
/// - `views:seen:{post_id}:{viewer_token}` (view window)
#[derive(Clone)]
pub struct PostCache {
    store: Arc<EphemeralCache>,
    single_ttl: Duration,
    list_ttl: Duration,
    category_ttl: Duration,
}

impl PostCache {
    pub fn new(store: Arc<EphemeralCache>, config: &CacheConfig) -> Self {
        Self {
            store,
            single_ttl: Duration::from_secs(config.single_post_ttl_secs),
            list_ttl: Duration::from_secs(config.list_ttl_secs),
            category_ttl: Duration::from_secs(config.category_ttl_secs),
        }
    }

    pub fn list_key(page: PageRequest, category: Option<&str>) -> String {
        format!(
            "{}{}:{}:{}",
            LIST_PREFIX,
            page.page,
            page.limit,
            category.unwrap_or("all")
        )
    }

    pub fn single_key(post_id: Uuid) -> String {
        format!("{}{}", SINGLE_PREFIX, post_id)
    }

    fn view_key(post_id: Uuid, viewer_token: &str) -> String {
        format!("{}{}:{}", VIEW_PREFIX, post_id, viewer_token)
    }

    fn lookup<T: serde::de::DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let hit = self.store.get(key);
        metrics::record_cache_event(namespace, if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    pub fn get_list(&self, page: PageRequest, category: Option<&str>) -> Option<Vec<Post>> {
        self.lookup("list", &Self::list_key(page, category))
    }

    pub fn put_list(&self, page: PageRequest, category: Option<&str>, posts: &[Post]) -> Result<()> {
        self.store
            .set(&Self::list_key(page, category), &posts, self.list_ttl)
    }

    pub fn get_single(&self, post_id: Uuid) -> Option<Post> {
        self.lookup("single", &Self::single_key(post_id))
    }

    pub fn put_single(&self, post: &Post) -> Result<()> {
        self.store
            .set(&Self::single_key(post.id), post, self.single_ttl)
    }

    pub fn get_categories(&self) -> Option<Vec<CategoryCount>> {
        self.lookup("categories", CATEGORIES_KEY)
    }

    pub fn put_categories(&self, counts: &[CategoryCount]) -> Result<()> {
        self.store.set(CATEGORIES_KEY, &counts, self.category_ttl)
    }

    /// Drop everything that may embed this post: its own entry, every
    /// listing page and the category aggregate.
    pub fn invalidate_post(&self, post_id: Uuid) {
        self.store.del(&Self::single_key(post_id));
        let pages = self.store.del_by_prefix(LIST_PREFIX);
        self.store.del(CATEGORIES_KEY);

        metrics::record_cache_event("posts", "invalidate");
        debug!(post_id = %post_id, list_pages = pages, "invalidated post cache entries");
    }

    /// Counter changes only stale the single-post entry
    pub fn invalidate_single(&self, post_id: Uuid) {
        self.store.del(&Self::single_key(post_id));
    }

    /// Claim a viewer token for `window`. True only for the first claim.
    pub fn claim_view(&self, post_id: Uuid, viewer_token: &str, window: Duration) -> bool {
        self.store
            .insert_if_absent(&Self::view_key(post_id, viewer_token), window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryCount;

    fn cache() -> PostCache {
        PostCache::new(EphemeralCache::new(), &CacheConfig::default())
    }

    #[test]
    fn test_key_scheme() {
        let id = Uuid::nil();
        assert_eq!(
            PostCache::list_key(PageRequest::new(2, 10), Some("sports")),
            "posts:list:2:10:sports"
        );
        assert_eq!(
            PostCache::list_key(PageRequest::default(), None),
            "posts:list:1:20:all"
        );
        assert_eq!(
            PostCache::single_key(id),
            "posts:single:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_invalidate_post_clears_aggregates() {
        let cache = cache();
        let counts = vec![CategoryCount {
            category: "campus".into(),
            count: 3,
        }];
        cache.put_categories(&counts).unwrap();
        cache.put_list(PageRequest::default(), None, &[]).unwrap();
        cache
            .put_list(PageRequest::new(2, 20), Some("campus"), &[])
            .unwrap();

        assert_eq!(cache.get_categories(), Some(counts));
        cache.invalidate_post(Uuid::new_v4());

        assert!(cache.get_categories().is_none());
        assert!(cache.get_list(PageRequest::default(), None).is_none());
        assert!(cache
            .get_list(PageRequest::new(2, 20), Some("campus"))
            .is_none());
    }

    #[test]
    fn test_view_claims_are_per_post_and_token() {
        let cache = cache();
        let window = Duration::from_secs(60);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(cache.claim_view(a, "token-1", window));
        assert!(!cache.claim_view(a, "token-1", window));
        assert!(cache.claim_view(a, "token-2", window));
        assert!(cache.claim_view(b, "token-1", window));
    }
}
