//! # Seed Data Generator
//!
//! Populates the database with a synthetic GPS track for development.
//!
//! ## Usage
//! ```bash
//! # Generate 5,000 samples (default)
//! cargo run -p geotrail-db --bin seed
//!
//! # Generate custom amount, one sample every 10 seconds
//! cargo run -p geotrail-db --bin seed -- --count 10000 --interval 10
//!
//! # Specify database path and also fill the upload queue
//! cargo run -p geotrail-db --bin seed -- --db ./data/geotrail.db --queue
//! ```
//!
//! ## Generated Track
//! A loop around a fixed center point, ending at the current time:
//! - Timestamps spaced `--interval` seconds apart
//! - Heading follows the direction of travel
//! - Every 50th sample has no heading (sensor without bearing)
//! - Accuracy cycles between 5 and 40 meters

use chrono::Utc;
use std::env;
use std::f64::consts::TAU;
use tracing::info;

use geotrail_core::{Fix, Sample};
use geotrail_db::{Database, DbConfig};

/// Center of the generated loop (Berlin, Tiergarten).
const CENTER: (f64, f64) = (52.5145, 13.3501);

/// Loop radius in degrees of latitude (~1.1 km).
const RADIUS_DEG: f64 = 0.01;

/// Samples per loop.
const LOOP_LEN: usize = 720;

/// Rows per insert transaction.
const CHUNK: usize = 500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 5000;
    let mut interval: i64 = 30;
    let mut db_path = String::from("./geotrail_dev.db");
    let mut also_queue = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(5000);
                    i += 1;
                }
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    interval = args[i + 1].parse().unwrap_or(30).max(1);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--queue" | "-q" => also_queue = true,
            "--help" | "-h" => {
                println!("Geotrail Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>       Number of samples to generate (default: 5000)");
                println!("  -i, --interval <S>    Seconds between samples (default: 30)");
                println!("  -d, --db <PATH>       Database file path (default: ./geotrail_dev.db)");
                println!("  -q, --queue           Also enqueue every sample for upload");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, count, interval, "Seeding synthetic track");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.locations().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} samples", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let first_ts = Utc::now().timestamp() - interval * count as i64;
    let track: Vec<Sample> = (0..count)
        .map(|n| track_point(n, first_ts + interval * n as i64, interval))
        .collect();

    for chunk in track.chunks(CHUNK) {
        db.locations().append_all(chunk).await?;
        if also_queue {
            for sample in chunk {
                db.upload_queue().enqueue(sample).await?;
            }
        }
        info!(done = db.locations().count().await?, "Chunk written");
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} samples in {:?}", count, elapsed);
    println!(
        "  Rate: {:.0} samples/second",
        count as f64 / elapsed.as_secs_f64()
    );

    if let Some(anchor) = db.locations().latest_anchor().await? {
        println!("  Latest anchor: {}", anchor);
    }
    println!("  Queued for upload: {}", db.upload_queue().count().await?);

    db.close().await;
    Ok(())
}

/// Returns the `n`th point on the loop.
fn track_point(n: usize, timestamp: i64, interval: i64) -> Sample {
    let angle = TAU * (n % LOOP_LEN) as f64 / LOOP_LEN as f64;
    let lat_scale = CENTER.0.to_radians().cos();

    let latitude = CENTER.0 + RADIUS_DEG * angle.sin();
    let longitude = CENTER.1 + RADIUS_DEG * angle.cos() / lat_scale;

    // Circumference in meters over the time for one loop.
    let speed = TAU * RADIUS_DEG * 111_320.0 / (LOOP_LEN as f64 * interval as f64);

    let fix = Fix::new(timestamp, latitude, longitude)
        .with_accuracy(5 + (n % 8) as u32 * 5)
        .with_speed(speed);

    let fix = if n % 50 == 49 {
        fix
    } else {
        // Counter-clockwise travel: bearing is the tangent direction.
        let bearing = (360.0 - angle.to_degrees()).rem_euclid(360.0);
        fix.with_heading(bearing)
    };

    fix.into_sample()
}
