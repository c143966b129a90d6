mod telemetry;

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use rand::Rng;
use std::time::{Duration, Instant};
use telemetry::{Batch, Event, Reading};
use tracing::{error, info, warn};

/// Pretends to be a handful of CO2 monitors uploading to the sensor API.
#[derive(Debug, Parser)]
#[command(name = "simulator")]
struct Args {
    #[arg(long, env = "API_URL", default_value = "http://localhost:5001")]
    api_url: String,

    #[arg(long, env = "DEVICES", default_value_t = 3)]
    devices: usize,

    /// Seconds between uploads; readings are spread evenly across it.
    #[arg(long, env = "INTERVAL_SECS", default_value_t = 10)]
    interval_secs: u64,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 6)]
    batch_size: usize,

    /// Rounds to run; 0 runs forever.
    #[arg(long, env = "ITERATIONS", default_value_t = 0)]
    iterations: u64,
}

/// Slowly drifting indoor climate for one device.
struct Room {
    name: String,
    co2: f64,
    temp: f64,
    humidity: f64,
}

impl Room {
    fn new(name: String, rng: &mut impl Rng) -> Self {
        Self {
            name,
            co2: rng.gen_range(450.0..900.0),
            temp: rng.gen_range(19.0..24.0),
            humidity: rng.gen_range(35.0..55.0),
        }
    }

    fn step(&mut self, rng: &mut impl Rng) {
        self.co2 = (self.co2 + rng.gen_range(-25.0..30.0)).clamp(400.0, 5000.0);
        self.temp = (self.temp + rng.gen_range(-0.2..0.2)).clamp(10.0, 35.0);
        self.humidity = (self.humidity + rng.gen_range(-0.5..0.5)).clamp(0.0, 100.0);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting sensor simulator");
    info!(
        "API: {}, Devices: {}, Interval: {}s, Batch size: {}",
        args.api_url, args.devices, args.interval_secs, args.batch_size
    );

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let base_url = args.api_url.trim_end_matches('/').to_string();
    let mut rng = rand::thread_rng();
    let mut rooms: Vec<Room> = (0..args.devices)
        .map(|i| Room::new(format!("sim-room-{}", i), &mut rng))
        .collect();

    let started = Instant::now();
    for room in &rooms {
        send_event(&client, &base_url, &room.name, "info", "Sensor started".to_string(), 0).await;
    }

    let interval = Duration::from_secs(args.interval_secs.max(1));
    let spacing = ChronoDuration::milliseconds(
        (interval.as_millis() / args.batch_size.max(1) as u128) as i64,
    );
    let mut round = 0u64;
    let mut stored = 0u64;

    loop {
        tokio::time::sleep(interval).await;
        round += 1;
        let now = Utc::now();
        let uptime = started.elapsed().as_secs();

        for room in rooms.iter_mut() {
            let readings: Vec<Reading> = (0..args.batch_size)
                .map(|i| {
                    room.step(&mut rng);
                    let age = spacing * (args.batch_size - 1 - i) as i32;
                    Reading {
                        co2: room.co2.round() as i32,
                        temp: (room.temp * 100.0).round() / 100.0,
                        humidity: (room.humidity * 100.0).round() / 100.0,
                        ts: (now - age).to_rfc3339(),
                    }
                })
                .collect();

            stored += send_batch(&client, &base_url, &room.name, &readings).await;

            if room.co2 > 2000.0 {
                let message = format!("CO2 high: {:.0} ppm", room.co2);
                send_event(&client, &base_url, &room.name, "warning", message, uptime).await;
            }
            if rng.gen_bool(0.02) {
                let correction = rng.gen_range(-40..40);
                let message = format!("Forced calibration successful, correction: {} ppm", correction);
                send_event(&client, &base_url, &room.name, "info", message, uptime).await;
                room.co2 = 440.0;
            }
        }

        if round % 10 == 0 {
            info!("Round {}: {} readings stored so far", round, stored);
        }
        if args.iterations > 0 && round >= args.iterations {
            break;
        }
    }

    info!("Simulator finished after {} rounds, {} readings stored", round, stored);
}

/// Uploads a batch; returns how many readings the API reports as stored.
async fn send_batch(client: &reqwest::Client, base_url: &str, device: &str, readings: &[Reading]) -> u64 {
    let body = Batch { device, readings };
    let response = match client
        .post(format!("{}/api/sensor/batch", base_url))
        .json(&body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("Batch upload for {} failed: {}", device, e);
            return 0;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        warn!("Batch upload for {} rejected ({}): {}", device, status, text);
        return 0;
    }

    match response.json::<serde_json::Value>().await {
        Ok(reply) => reply["stored"].as_u64().unwrap_or(0),
        Err(e) => {
            warn!("Unexpected batch reply for {}: {}", device, e);
            0
        }
    }
}

async fn send_event(
    client: &reqwest::Client,
    base_url: &str,
    device: &str,
    event_type: &str,
    message: String,
    uptime: u64,
) {
    let body = Event {
        device,
        event_type,
        message,
        uptime,
    };
    match client
        .post(format!("{}/api/sensor/log", base_url))
        .json(&body)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => warn!("Event for {} rejected: {}", device, response.status()),
        Err(e) => warn!("Event for {} failed: {}", device, e),
    }
}
