use clap::{Parser, Subcommand};

/// notify-gateway: real-time notification delivery for the admin dashboard
#[derive(Parser)]
#[command(name = "notify-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stream gateway
    Serve {
        /// Port to bind (default: NOTIFY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the in-memory development store
    Store {
        /// Port to bind (default: NOTIFY_STORE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Follow notifications live through the gateway, polling if the stream drops
    Watch {
        /// all, unread, or a notification type
        #[arg(short, long, default_value = "all")]
        filter: String,
    },

    /// List notifications in the store
    List,

    /// Mark one notification as read
    Read { id: i64 },

    /// Mark every notification as read
    ReadAll,

    /// Delete a notification
    Delete { id: i64 },

    /// Generate a batch of sample notifications (development store only)
    Generate,
}
