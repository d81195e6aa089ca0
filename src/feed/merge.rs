use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use crate::db::Repository;
use crate::error::MergeError;
use crate::models::Show;

use super::FeedSource;

/// Default number of feeds refreshed at the same time
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Outcome of refreshing every followed show
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Shows whose feed was fetched and merged
    pub refreshed: usize,
    /// Episodes stored across all shows
    pub new_episodes: usize,
    /// Feed URL and error message for each show that could not be refreshed
    pub failed: Vec<(String, String)>,
}

/// Brings fetched feed contents into the library, append-only.
pub struct MergeEngine<S> {
    repository: Repository,
    source: S,
    max_concurrent: usize,
}

impl<S: FeedSource> MergeEngine<S> {
    pub fn new(repository: Repository, source: S) -> Self {
        Self {
            repository,
            source,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Follow the feed at `feed_url` with everything it currently publishes.
    ///
    /// Any record already stored for the URL is removed first, so stale or
    /// duplicated rows are replaced by one fresh show.
    pub async fn create_show(&self, feed_url: &str) -> Result<(), MergeError> {
        let mut show = self.source.fetch_show(feed_url).await?;
        show.feed_url = feed_url.to_string();
        for episode in &mut show.episodes {
            episode.show_feed_url = feed_url.to_string();
        }

        self.repository.unfollow_show(feed_url).await?;
        self.repository.follow_show(show).await?;
        tracing::debug!("Created show {}", feed_url);
        Ok(())
    }

    /// Store the episodes the feed has published since `show` was last merged.
    ///
    /// Returns how many episodes were added. Stored episodes are kept as they
    /// are even when the feed dropped or edited them.
    pub async fn update_episodes(&self, show: &Show) -> Result<usize, MergeError> {
        let fetched = self.source.fetch_show(&show.feed_url).await?;

        let stored = self.repository.fetch_show(&show.feed_url).await?;
        let known: HashSet<String> = stored
            .as_ref()
            .unwrap_or(show)
            .episode_ids()
            .map(str::to_string)
            .collect();

        let new_episodes: Vec<_> = fetched
            .episodes
            .into_iter()
            .filter(|e| !known.contains(&e.id))
            .collect();
        if new_episodes.is_empty() {
            return Ok(0);
        }

        // Count what the store inserted, not what the feed offered
        let count = self
            .repository
            .add_new_episodes_counted(Show {
                episodes: new_episodes,
                ..show.clone()
            })
            .await?;
        tracing::debug!("Merged {} new episodes into {}", count, show.feed_url);
        Ok(count)
    }

    /// Refresh every followed show concurrently.
    ///
    /// A show that fails is logged and reported; it never stops the others.
    pub async fn refresh_feed(&self) -> Result<RefreshReport, MergeError> {
        let shows = self.repository.fetch_followed_shows().await?;

        let results: Vec<_> = stream::iter(shows)
            .map(|show| async move {
                let result = self.update_episodes(&show).await;
                (show.feed_url, result)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (feed_url, result) in results {
            match result {
                Ok(count) => {
                    report.refreshed += 1;
                    report.new_episodes += count;
                }
                Err(e) => {
                    tracing::warn!("Failed to refresh {}: {}", feed_url, e);
                    report.failed.push((feed_url, e.to_string()));
                }
            }
        }

        tracing::info!(
            "Refreshed {} shows, {} new episodes, {} failed",
            report.refreshed,
            report.new_episodes,
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, FetchError};
    use crate::models::fixtures::{episode, rebuild, show, swift_by_sundell, REBUILD_URL, SUNDELL_URL};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct MockFeedSource {
        feeds: HashMap<String, Show>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MockFeedSource {
        fn with(shows: Vec<Show>) -> Self {
            Self {
                feeds: shows.into_iter().map(|s| (s.feed_url.clone(), s)).collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl FeedSource for Arc<MockFeedSource> {
        async fn fetch_show(&self, feed_url: &str) -> Result<Show, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.feeds
                .get(feed_url)
                .cloned()
                .ok_or_else(|| FetchError::Unavailable {
                    feed_url: feed_url.to_string(),
                })
        }
    }

    fn rebuild_with_new_episode() -> Show {
        let mut show = rebuild();
        show.episodes.insert(0, episode(REBUILD_URL, "ep353", 27));
        show
    }

    #[tokio::test]
    async fn create_show_follows_everything_fetched() {
        let repo = Repository::open_in_memory().await.unwrap();
        let source = Arc::new(MockFeedSource::with(vec![rebuild()]));
        let engine = MergeEngine::new(repo.clone(), source);

        engine.create_show(REBUILD_URL).await.unwrap();
        assert_eq!(repo.fetch_show(REBUILD_URL).await.unwrap().unwrap(), rebuild());
    }

    #[tokio::test]
    async fn create_show_replaces_stale_records() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(show(REBUILD_URL, "Rebuild (old)", vec![episode(REBUILD_URL, "ep1", 1)]))
            .await
            .unwrap();
        let engine = MergeEngine::new(repo.clone(), Arc::new(MockFeedSource::with(vec![rebuild()])));

        engine.create_show(REBUILD_URL).await.unwrap();

        let shows = repo.fetch_followed_shows().await.unwrap();
        assert_eq!(shows, vec![rebuild()]);
    }

    #[tokio::test]
    async fn create_show_fetch_failure_leaves_library_untouched() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(rebuild()).await.unwrap();
        let engine = MergeEngine::new(repo.clone(), Arc::new(MockFeedSource::default()));

        let err = engine.create_show(REBUILD_URL).await.unwrap_err();
        assert!(matches!(err, MergeError::Fetch(FetchError::Unavailable { .. })));
        assert_eq!(repo.fetch_show(REBUILD_URL).await.unwrap().unwrap(), rebuild());
    }

    #[tokio::test]
    async fn update_episodes_appends_only_new_ids() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(rebuild()).await.unwrap();
        let engine = MergeEngine::new(
            repo.clone(),
            Arc::new(MockFeedSource::with(vec![rebuild_with_new_episode()])),
        );

        let stored = repo.fetch_show(REBUILD_URL).await.unwrap().unwrap();
        assert_eq!(engine.update_episodes(&stored).await.unwrap(), 1);
        assert_eq!(engine.update_episodes(&stored).await.unwrap(), 0);

        let stored = repo.fetch_show(REBUILD_URL).await.unwrap().unwrap();
        assert_eq!(stored.episodes.len(), 4);
        assert_eq!(stored.episodes[0].id, "ep353");
        assert_eq!(stored.episodes[1..], rebuild().episodes[..]);
    }

    #[tokio::test]
    async fn update_episodes_counts_repeated_feed_items_once() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(rebuild()).await.unwrap();
        let mut feed = rebuild_with_new_episode();
        feed.episodes.insert(0, episode(REBUILD_URL, "ep353", 27));
        let engine = MergeEngine::new(repo.clone(), Arc::new(MockFeedSource::with(vec![feed])));

        let stored = repo.fetch_show(REBUILD_URL).await.unwrap().unwrap();
        assert_eq!(engine.update_episodes(&stored).await.unwrap(), 1);
        assert_eq!(repo.fetch_show(REBUILD_URL).await.unwrap().unwrap().episodes.len(), 4);
    }

    #[tokio::test]
    async fn racing_updates_of_one_show_count_each_episode_once() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(rebuild()).await.unwrap();
        let engine = MergeEngine::new(
            repo.clone(),
            Arc::new(MockFeedSource::with(vec![rebuild_with_new_episode()])),
        );

        let stored = repo.fetch_show(REBUILD_URL).await.unwrap().unwrap();
        let (a, b) = tokio::join!(engine.update_episodes(&stored), engine.update_episodes(&stored));
        assert_eq!(a.unwrap() + b.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_episodes_for_unfollowed_show_fails() {
        let repo = Repository::open_in_memory().await.unwrap();
        let engine = MergeEngine::new(
            repo.clone(),
            Arc::new(MockFeedSource::with(vec![rebuild_with_new_episode()])),
        );

        let err = engine.update_episodes(&rebuild()).await.unwrap_err();
        assert!(matches!(
            err,
            MergeError::Database(DatabaseError::ShowNotFollowed { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_feed_tolerates_individual_failures() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.follow_show(rebuild()).await.unwrap();
        repo.follow_show(swift_by_sundell()).await.unwrap();
        repo.follow_show(show("https://gone.example.com/feed", "Gone", vec![]))
            .await
            .unwrap();

        let mut sundell = swift_by_sundell();
        sundell.episodes.insert(0, episode(SUNDELL_URL, "sbs-100", 25));
        let engine = MergeEngine::new(
            repo.clone(),
            Arc::new(MockFeedSource::with(vec![rebuild_with_new_episode(), sundell])),
        );

        let report = engine.refresh_feed().await.unwrap();
        assert_eq!(report.refreshed, 2);
        assert_eq!(report.new_episodes, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "https://gone.example.com/feed");

        let mut episodes = repo.followed_episodes_stream();
        let current = episodes.next().await.unwrap();
        assert_eq!(current.len(), 8);
        assert_eq!(current[0].id, "ep353");
        assert_eq!(current[1].id, "sbs-100");
    }

    #[tokio::test]
    async fn refresh_feed_bounds_concurrency() {
        let repo = Repository::open_in_memory().await.unwrap();
        let mut shows = Vec::new();
        for i in 0..6 {
            let url = format!("https://feed{i}.example.com/rss");
            let s = show(&url, &format!("Show {i}"), vec![episode(&url, "e1", 1)]);
            repo.follow_show(s.clone()).await.unwrap();
            shows.push(s);
        }

        let source = Arc::new(MockFeedSource::with(shows));
        let engine = MergeEngine::new(repo, Arc::clone(&source)).with_max_concurrent(2);
        let report = engine.refresh_feed().await.unwrap();

        assert_eq!(report.refreshed, 6);
        assert_eq!(report.new_episodes, 0);
        assert!(source.peak.load(Ordering::SeqCst) <= 2);
    }
}
