//! Command line ingestion: search the media platform or add videos.
//!
//! ```text
//! yj-ingest search <keywords...> [--max N]
//! yj-ingest add <url-or-id>...
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};

use yj_queue::RedisTaskQueue;
use yj_store::{FirestoreClient, FirestoreStore};
use yj_worker::{init_tracing, EventTrigger, VideoIngestor, DEFAULT_LOG_DIRECTIVE};
use yj_youtube::YouTubeClient;

const USAGE: &str = "usage: yj-ingest search <keywords...> [--max N] | yj-ingest add <url-or-id>...";

enum Command {
    Search { keywords: String, max_results: u32 },
    Add { references: Vec<String> },
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        bail!(USAGE);
    };

    match command.as_str() {
        "search" => {
            let mut keywords = Vec::new();
            let mut max_results = 25;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                if arg == "--max" {
                    let value = iter.next().context("--max needs a value")?;
                    max_results = value.parse().context("--max must be a number")?;
                } else {
                    keywords.push(arg.as_str());
                }
            }
            if keywords.is_empty() {
                bail!(USAGE);
            }
            Ok(Command::Search {
                keywords: keywords.join(" "),
                max_results,
            })
        }
        "add" if !rest.is_empty() => Ok(Command::Add {
            references: rest.to_vec(),
        }),
        _ => bail!(USAGE),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
    dotenvy::dotenv().ok();
    init_tracing(DEFAULT_LOG_DIRECTIVE);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let store = Arc::new(FirestoreStore::new(
        FirestoreClient::from_env().await.context("Firestore client")?,
    ));
    let media = Arc::new(YouTubeClient::from_env().context("YouTube client")?);

    match command {
        Command::Search {
            keywords,
            max_results,
        } => {
            // Search only reads, so it runs without a queue connection
            let queue = Arc::new(yj_queue::MemoryQueue::new());
            let ingestor = VideoIngestor::new(store, media, EventTrigger::new(queue));
            let results = ingestor.search(&keywords, max_results).await?;
            if results.is_empty() {
                println!("No new videos found for {:?}", keywords);
            }
            for detail in results {
                println!(
                    "{}\t{}\t{}",
                    detail.id,
                    detail.snippet.published_at.format("%Y-%m-%d"),
                    detail.snippet.title
                );
            }
        }
        Command::Add { references } => {
            let queue = Arc::new(RedisTaskQueue::from_env().context("task queue")?);
            queue.init().await.context("task queue init")?;
            let ingestor = VideoIngestor::new(store, media, EventTrigger::new(queue));
            let created = ingestor.add_videos(&references).await?;
            if created.is_empty() {
                println!("Nothing to add");
            }
            for video in created {
                println!("{}\t{}\t{}", video.key, video.external_id, video.title);
            }
        }
    }

    Ok(())
}
