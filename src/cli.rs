use clap::{Parser, Subcommand};

/// Notifier: deadline alerts for the brokerage back-office
#[derive(Parser)]
#[command(name = "notifier", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the notification server
    Serve {
        /// Port to bind (overrides NOTIFIER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a single deadline scan pass for one user and exit
    Scan {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        broker_id: Option<String>,
        /// admin | manager | broker
        #[arg(long, default_value = "broker")]
        role: String,
    },

    /// Inspect or clean up a user's notifications
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
}

#[derive(Subcommand)]
pub enum NotificationCommands {
    /// List visible notifications, newest first
    List {
        #[arg(long)]
        user_id: String,
    },
    /// Mark every visible notification as read
    ReadAll {
        #[arg(long)]
        user_id: String,
    },
    /// Dismiss every read notification
    ClearRead {
        #[arg(long)]
        user_id: String,
    },
}
