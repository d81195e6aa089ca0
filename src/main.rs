use std::path::Path;

use futures::StreamExt;

use podshelf::error::Result;
use podshelf::{Config, JsonSnapshotSource, MergeEngine, Repository};

const USAGE: &str = "usage: podshelf <shows | episodes | follow <feed-url> | unfollow <feed-url> | refresh | dedup>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);
    let feed_url = args.get(2).map(String::as_str);

    // Load configuration
    let config = Config::load()?;
    let repository = Repository::open(&config.db_path).await?;

    match (command, feed_url) {
        (Some("shows"), None) => {
            for show in repository.fetch_followed_shows().await? {
                println!("{} ({} episodes)  {}", show.title, show.episodes.len(), show.feed_url);
            }
        }

        (Some("episodes"), None) => {
            // The first snapshot is the current merged timeline
            let mut stream = repository.followed_episodes_stream();
            if let Some(episodes) = stream.next().await {
                for episode in episodes.iter() {
                    println!(
                        "{}  {}  [{}]",
                        episode.published_at.format("%Y-%m-%d"),
                        episode.title,
                        episode.show_feed_url
                    );
                }
            }
        }

        (Some("follow"), Some(url)) => {
            let engine = merge_engine(&config, repository)?;
            engine.create_show(url).await?;
            println!("Following {}", url);
        }

        (Some("unfollow"), Some(url)) => {
            repository.unfollow_show(url).await?;
            println!("Unfollowed {}", url);
        }

        (Some("refresh"), None) => {
            let engine = merge_engine(&config, repository)?;
            let report = engine.refresh_feed().await?;
            println!(
                "Refreshed {} shows, {} new episodes",
                report.refreshed, report.new_episodes
            );
            for (url, error) in report.failed {
                eprintln!("Failed {}: {}", url, error);
            }
        }

        (Some("dedup"), None) => {
            let report = repository.dedup_guard().delete().await?;
            println!(
                "Removed {} duplicate shows and {} duplicate episodes",
                report.shows_removed, report.episodes_removed
            );
        }

        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn merge_engine(config: &Config, repository: Repository) -> Result<MergeEngine<JsonSnapshotSource>> {
    let source = JsonSnapshotSource::load(Path::new(&config.snapshot_dir))?;
    Ok(MergeEngine::new(repository, source).with_max_concurrent(config.max_concurrent_refreshes))
}
