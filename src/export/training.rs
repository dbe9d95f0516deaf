//! CSV exporter task

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::hub::{BroadcastHub, RemovalReason, Subscription, SubscriptionEvent};
use crate::telemetry::TelemetryRecord;

/// Column header, written once to an empty file
pub const CSV_HEADER: &str = "simulation_time,x,y,z,roll,pitch,yaw,vx,vy,vz,\
stability_index,roll_error,pitch_error,yaw_error";

/// One CSV line (with trailing newline) for a record
pub fn csv_row(record: &TelemetryRecord) -> String {
    let p = &record.position;
    let o = &record.orientation;
    let v = &record.velocity;
    let m = &record.ml_predictions;
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
        record.simulation_time,
        p.x,
        p.y,
        p.z,
        o.roll,
        o.pitch,
        o.yaw,
        v.vx,
        v.vy,
        v.vz,
        record.stability_index,
        m.roll_error,
        m.pitch_error,
        m.yaw_error
    )
}

/// Hub subscriber that appends records to a CSV file
pub struct TrainingExporter {
    path: PathBuf,
    writer: BufWriter<File>,
    subscription: Subscription,
    hub: Arc<BroadcastHub>,
}

impl TrainingExporter {
    /// Open (or create) `path` and register with the hub
    ///
    /// Only records published after this returns are exported.
    pub async fn open(hub: Arc<BroadcastHub>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let is_empty = file.metadata().await?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_empty {
            writer.write_all(CSV_HEADER.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        let subscription = hub.register(format!("export:{}", path.display())).await;
        tracing::info!(path = %path.display(), "Training export enabled");

        Ok(Self {
            path,
            writer,
            subscription,
            hub,
        })
    }

    /// Run the exporter on its own task
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Write rows until the hub removes the exporter or a write fails
    ///
    /// Returns the number of rows written.
    pub async fn run(mut self) -> u64 {
        let subscriber_id = self.subscription.id();
        let mut rows = 0u64;

        let stop = loop {
            match self.subscription.next_event().await {
                SubscriptionEvent::Delivery(delivery) => {
                    let Some(record) = delivery.record() else {
                        continue;
                    };
                    if let Err(e) = self.write_row(record).await {
                        tracing::error!(
                            path = %self.path.display(),
                            error = %e,
                            "Training export write failed, export stopped"
                        );
                        break None;
                    }
                    rows += 1;
                }
                SubscriptionEvent::Removed(RemovalReason::QueueFull) => {
                    break Some(RemovalReason::QueueFull)
                }
                SubscriptionEvent::Removed(reason) => {
                    // orderly stop: keep what was already queued
                    if let Err(e) = self.drain_backlog(&mut rows).await {
                        tracing::error!(
                            path = %self.path.display(),
                            error = %e,
                            "Training export write failed, export stopped"
                        );
                    }
                    break Some(reason);
                }
            }
        };

        if let Err(e) = self.writer.flush().await {
            tracing::error!(path = %self.path.display(), error = %e, "Training export flush failed");
        }
        self.hub.deregister(subscriber_id).await;

        match stop {
            Some(RemovalReason::QueueFull) => tracing::error!(
                path = %self.path.display(),
                rows = rows,
                "Training export fell behind and was evicted, export stopped"
            ),
            _ => tracing::info!(
                path = %self.path.display(),
                rows = rows,
                "Training export finished"
            ),
        }

        rows
    }

    async fn drain_backlog(&mut self, rows: &mut u64) -> std::io::Result<()> {
        while let Some(delivery) = self.subscription.try_recv() {
            if let Some(record) = delivery.record() {
                self.write_row(record).await?;
                *rows += 1;
            }
        }
        Ok(())
    }

    async fn write_row(&mut self, record: &TelemetryRecord) -> std::io::Result<()> {
        self.writer.write_all(csv_row(record).as_bytes()).await?;
        if self.subscription.pending() == 0 {
            self.writer.flush().await?;
        }
        Ok(())
    }
}
