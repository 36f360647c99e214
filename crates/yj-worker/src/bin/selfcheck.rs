use yj_queue::{QueueName, RedisTaskQueue};
use yj_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "yj-selfcheck: starting with max_concurrent_tasks={} max_attempts={}",
        config.max_concurrent_tasks, config.retry.max_attempts
    );
    ensure_env_present(&[
        "REDIS_URL",
        "GCP_PROJECT_ID",
        "GOOGLE_APPLICATION_CREDENTIALS",
        "YOUTUBE_API_KEY",
        "CLOUD_NATURAL_LANG_API_KEY",
    ])?;
    ensure_queue().await?;

    println!("yj-selfcheck: ok");
    Ok(())
}

async fn ensure_queue() -> anyhow::Result<()> {
    let queue = RedisTaskQueue::from_env()?;
    queue
        .init()
        .await
        .map_err(|e| anyhow::anyhow!("redis not reachable: {}", e))?;

    for name in QueueName::ALL {
        println!(
            "yj-selfcheck: queue {} pending={} dead={}",
            name,
            queue.len(name).await?,
            queue.dlq_len(name).await?
        );
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
