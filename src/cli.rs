use clap::{Parser, Subcommand};

use hfn_notify::models::{NotificationKind, Tab};
use hfn_notify::settings::DeliveryChannel;

/// hfn-notify: Hindustan Founders Network notification client
#[derive(Parser)]
#[command(name = "hfn-notify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow notifications live (push with polling fallback)
    Watch {
        /// Treat the page as focused: suppresses desktop popups
        #[arg(long)]
        focused: bool,
    },

    /// Fetch notifications once and print them
    List {
        /// all, network or mentions
        #[arg(long, default_value = "all")]
        tab: Tab,
    },

    /// Mark one notification read
    Read { id: String },

    /// Mark every notification read
    ReadAll,

    /// Manage notification preferences
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print current preferences
    Show,
    /// Toggle one channel for one category
    Set {
        /// connection, message, mention, job or pitch
        kind: NotificationKind,
        /// email or push
        channel: DeliveryChannel,
        #[arg(value_parser = parse_on_off)]
        state: bool,
    },
}

fn parse_on_off(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}
