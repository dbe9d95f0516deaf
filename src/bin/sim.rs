use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use telemetry_relay::client::{PublisherConfig, TelemetryPublisher};
use telemetry_relay::model::{
    stability_index, FeatureVector, LinearModel, NullModel, OrientationModel,
};
use telemetry_relay::telemetry::{Orientation, Position, Velocity};
use telemetry_relay::TelemetryRecord;

/// Stream synthetic drone telemetry into a relay
#[derive(Parser, Debug)]
#[command(name = "telemetry-sim", version)]
struct Cli {
    /// Relay producer address
    #[arg(long, default_value = "127.0.0.1:8766", env = "SIM_RELAY_ADDR")]
    addr: SocketAddr,

    /// Records per second (1 to 1000)
    #[arg(long, default_value_t = 50.0, value_parser = parse_rate)]
    rate: f64,

    /// Stop after this many simulated seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Orientation-error model (JSON); zeros are sent without one
    #[arg(long, env = "SIM_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Insert a malformed line after every N records
    #[arg(long)]
    malformed_every: Option<u64>,
}

const MAX_RATE: f64 = 1000.0;

fn parse_rate(s: &str) -> Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (1.0..=MAX_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("rate must be between 1 and {MAX_RATE}"))
    }
}

/// Vehicle state at simulation time `t`
struct Sample {
    position: Position,
    orientation: Orientation,
    velocity: Velocity,
    gyro: [f64; 3],
    motors: [f64; 4],
}

fn sample(t: f64) -> Sample {
    let roll = 0.15 * (0.8 * t).sin();
    let pitch = 0.10 * (0.5 * t).cos();
    let yaw = (0.1 * t) % std::f64::consts::TAU;
    let hover = 68.5;
    Sample {
        position: Position {
            x: 5.0 * (0.2 * t).cos(),
            y: 5.0 * (0.2 * t).sin(),
            z: 1.0 + 0.2 * (0.3 * t).sin(),
        },
        orientation: Orientation { roll, pitch, yaw },
        velocity: Velocity {
            vx: -(0.2 * t).sin(),
            vy: (0.2 * t).cos(),
            vz: 0.06 * (0.3 * t).cos(),
        },
        gyro: [0.12 * (0.8 * t).cos(), -0.05 * (0.5 * t).sin(), 0.1],
        motors: [
            hover + 2.0 * roll,
            -(hover - 2.0 * roll),
            -(hover + 2.0 * pitch),
            hover - 2.0 * pitch,
        ],
    }
}

fn load_model(path: Option<&PathBuf>) -> Box<dyn OrientationModel> {
    match path {
        Some(path) => match LinearModel::from_json_file(path) {
            Ok(model) => {
                tracing::info!(path = %path.display(), "Loaded orientation model");
                Box::new(model)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load model, predicting zeros"
                );
                Box::new(NullModel)
            }
        },
        None => Box::new(NullModel),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_relay=info,telemetry_sim=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let model = load_model(cli.model.as_ref());
    let dt = 1.0 / cli.rate;

    let mut publisher = TelemetryPublisher::new(PublisherConfig::new(cli.addr));
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt));
    let mut t = 0.0;
    let mut sent = 0u64;

    tracing::info!(addr = %cli.addr, rate = cli.rate, "Streaming synthetic telemetry");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        t += dt;
        if cli.duration.is_some_and(|limit| t > limit) {
            break;
        }

        let s = sample(t);
        let stability = stability_index(s.orientation.roll, s.orientation.pitch);
        let features = FeatureVector::from_sensors(s.gyro, s.motors, stability);

        let mut record = TelemetryRecord::new(
            t,
            s.position,
            s.orientation,
            s.velocity,
            stability,
            model.predict(&features),
        )
        .with_extra("altitude", json!(s.position.z))
        .with_extra("motor_velocities", json!(s.motors));
        for (axis, rate) in ["gyro_x", "gyro_y", "gyro_z"].iter().zip(s.gyro) {
            record = record.with_extra(*axis, json!(rate));
        }

        if let Err(e) = publisher.send(&record).await {
            tracing::warn!(error = %e, "Send failed, retrying");
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        sent += 1;

        if cli.malformed_every.is_some_and(|n| n > 0 && sent % n == 0) {
            if let Err(e) = publisher.send_raw(b"{\"simulation_time\": oops}\n").await {
                tracing::warn!(error = %e, "Send failed");
            }
        }
    }

    if let Err(e) = publisher.disconnect().await {
        tracing::debug!(error = %e, "Disconnect failed");
    }
    tracing::info!(records = sent, "Simulation finished");
}
