//! Privacy scan example: several users searched across several platforms,
//! each platform with its own quota, all answers cached by fingerprint.
//!
//! Run with: `RUST_LOG=ratecache=debug cargo run --example privacy_scan`

use ratecache::prelude::*;
use ratecache::{ResourceStats, SweeperHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
struct Profile {
    platform: &'static str,
    username: String,
    followers: u32,
}

/// Stand-in for a platform client call.
async fn fetch_profile(platform: &'static str, username: String) -> Result<Profile, String> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if username == "ghost" {
        return Err(format!("{}: user not found", platform));
    }
    let followers = username.bytes().map(u32::from).sum::<u32>() * 37;
    Ok(Profile {
        platform,
        username,
        followers,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Privacy Scan Example ===\n");

    // Demo-sized quotas; real deployments use per_hour(...) figures.
    let scheduler = SchedulerBuilder::new()
        .resource("twitter", BucketConfig::new(2.0, 2.0))
        .resource("reddit", BucketConfig::new(3.0, 3.0))
        .resource("github", BucketConfig::new(5.0, 5.0))
        .build();

    let cache: SharedCache<Profile> = Arc::new(TtlCache::new(
        CacheConfig::new(100, 60_000).with_sweep_interval_ms(5_000),
    ));
    let sweeper: SweeperHandle = cache.clone().start_sweeper();
    let fetcher = CachedFetcher::new(cache.clone(), scheduler.clone());

    let searches = [
        ("twitter", "alice", 5),
        ("twitter", "bob", 0),
        ("twitter", "carol", 0),
        ("twitter", "Alice", 5),
        ("reddit", "alice", 1),
        ("reddit", "ghost", 0),
        ("github", "octocat", 10),
        ("twitter", "dave", 0),
    ];

    let mut handles = Vec::new();
    for (platform, username, priority) in searches {
        let fetcher = fetcher.clone();
        handles.push(tokio::spawn(async move {
            let request = FetchRequest::for_subject(platform, username)
                .priority(priority)
                .ttl_with(|profile: &Profile| {
                    // Large accounts change slowly; keep them longer.
                    if profile.followers > 20_000 {
                        Duration::from_secs(600)
                    } else {
                        Duration::from_secs(60)
                    }
                });
            let subject = username.trim().to_lowercase();
            let result = fetcher
                .get_or_fetch(request, move || fetch_profile(platform, subject))
                .await;
            (platform, username, result)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((platform, username, Ok(profile))) => println!(
                "   {:<8} {:<8} ✅ {} followers ({}:{})",
                platform, username, profile.followers, profile.platform, profile.username
            ),
            Ok((platform, username, Err(err))) => {
                println!("   {:<8} {:<8} ❌ {}", platform, username, err)
            }
            Err(err) => println!("   task failed: {}", err),
        }
    }

    println!();
    for stats in scheduler.all_stats() {
        print_resource(&stats);
    }
    println!("{}", cache.stats().summary());

    sweeper.stop().await;
    info!("Scan finished");
}

fn print_resource(stats: &ResourceStats) {
    println!("{}\n", stats.summary());
}
