//! Notification dispatch, cancellation, and ledger commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use pushhub_core::error::AppError;
use pushhub_core::types::{DeviceId, NotificationId};
use pushhub_entity::delivery::DeliveryLog;
use pushhub_entity::notification::DeliveryCounters;
use pushhub_worker::DeliveryLedger;

/// Arguments for notification commands
#[derive(Debug, Args)]
pub struct NotificationArgs {
    /// Notification subcommand
    #[command(subcommand)]
    pub command: NotificationCommand,
}

/// Notification subcommands
#[derive(Debug, Subcommand)]
pub enum NotificationCommand {
    /// Fan a due notification out now
    Dispatch { notification_id: String },
    /// Cancel a notification that has not been dispatched
    Cancel { notification_id: String },
    /// Show counters and per-device delivery rows
    Stats { notification_id: String },
    /// Recompute counters from the delivery log
    Reconcile { notification_id: String },
    /// Record that a device opened the notification
    Click {
        notification_id: String,
        device_id: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct DeliveryRow {
    device: String,
    status: String,
    attempts: i32,
    code: String,
    error: String,
}

impl From<&DeliveryLog> for DeliveryRow {
    fn from(log: &DeliveryLog) -> Self {
        Self {
            device: log.device_id.to_string(),
            status: log.status.to_string(),
            attempts: log.attempt_count,
            code: output::or_dash(log.status_code),
            error: output::or_dash(log.error_message.as_deref()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReconcileReport {
    notification_id: NotificationId,
    drifted: bool,
    before: DeliveryCounters,
    after: DeliveryCounters,
}

/// Execute notification commands
pub async fn execute(
    args: &NotificationArgs,
    env: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(env)?;
    let stores = super::connect_stores(&config).await?;
    let ledger = DeliveryLedger::new(stores.deliveries.clone());

    match &args.command {
        NotificationCommand::Dispatch { notification_id } => {
            let id: NotificationId = super::parse_id("notification", notification_id)?;
            let pipeline = super::build_pipeline(&config, &stores).await?;
            let summary = pipeline.dispatcher.dispatch(id).await?;
            output::print_item(&summary, format);
        }
        NotificationCommand::Cancel { notification_id } => {
            let id: NotificationId = super::parse_id("notification", notification_id)?;
            if stores.notifications.cancel(id).await? {
                output::print_success(&format!("Notification {id} cancelled"));
            } else {
                output::print_warning(&format!(
                    "Notification {id} is already dispatching or finished"
                ));
            }
        }
        NotificationCommand::Stats { notification_id } => {
            let id: NotificationId = super::parse_id("notification", notification_id)?;
            let notification = stores
                .notifications
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Notification {id} not found")))?;
            let entries = ledger.entries(id).await?;
            let rows: Vec<DeliveryRow> = entries.iter().map(DeliveryRow::from).collect();
            match format {
                OutputFormat::Json => output::print_item(
                    &serde_json::json!({
                        "id": notification.id,
                        "status": notification.status,
                        "totalTargets": notification.total_targets,
                        "counters": notification.counters(),
                        "deliveries": rows,
                    }),
                    format,
                ),
                OutputFormat::Table => {
                    println!("Notification {id} ({})", notification.status);
                    output::print_kv("Targets", &notification.total_targets.to_string());
                    output::print_kv("Sent", &notification.total_sent.to_string());
                    output::print_kv("Delivered", &notification.total_delivered.to_string());
                    output::print_kv("Failed", &notification.total_failed.to_string());
                    output::print_kv("Clicked", &notification.total_clicked.to_string());
                    output::print_list(&rows, format);
                }
            }
        }
        NotificationCommand::Reconcile { notification_id } => {
            let id: NotificationId = super::parse_id("notification", notification_id)?;
            let result = ledger.reconcile(id).await?;
            output::print_item(
                &ReconcileReport {
                    notification_id: id,
                    drifted: result.drifted(),
                    before: result.before,
                    after: result.after,
                },
                format,
            );
        }
        NotificationCommand::Click {
            notification_id,
            device_id,
        } => {
            let id: NotificationId = super::parse_id("notification", notification_id)?;
            let device: DeviceId = super::parse_id("device", device_id)?;
            if ledger.record_click(id, device, chrono::Utc::now()).await? {
                output::print_success("Click recorded");
            } else {
                output::print_warning("No successful delivery to overlay, or already clicked");
            }
        }
    }

    Ok(())
}
