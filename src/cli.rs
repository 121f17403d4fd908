use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use filmlog_store::{InquiryStatus, SpaceType};
use filmlog_telemetry::Severity;

#[derive(Parser)]
#[command(name = "filmlog")]
#[command(about = "Work log, inquiry inbox and author session for the studio site")]
pub struct Cli {
    /// Settings file (defaults to ~/.filmlog/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the work log, newest first
    Log {
        #[arg(long, short)]
        search: Option<String>,
        /// Print the partitioned view as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one long-form document
    Show { slug: String },
    /// Follow the work log as posts change
    Watch {
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Manage live posts (author only)
    #[command(subcommand)]
    Post(PostCommand),
    /// Sign in through the local provider
    Login {
        /// Principal to sign in as (defaults to site.authorId)
        #[arg(long = "as")]
        as_principal: Option<String>,
    },
    /// End the session in every tab sharing the local store
    Logout,
    /// Show the current session
    Whoami,
    /// Contact form inbox
    #[command(subcommand)]
    Inquiry(InquiryCommand),
    /// Query persisted warnings and errors
    Logs(LogsArgs),
}

impl Command {
    /// Name recorded on every incident logged while the command runs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Show { .. } => "show",
            Self::Watch { .. } => "watch",
            Self::Post(_) => "post",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Whoami => "whoami",
            Self::Inquiry(_) => "inquiry",
            Self::Logs(_) => "logs",
        }
    }
}

#[derive(Args)]
pub struct LogsArgs {
    /// Minimum severity: warn or error
    #[arg(long)]
    pub level: Option<Severity>,
    /// Only incidents raised under this command (post, inquiry, watch, ...)
    #[arg(long)]
    pub command: Option<String>,
    #[arg(long)]
    pub principal: Option<String>,
    #[arg(long = "post")]
    pub post_id: Option<String>,
    #[arg(long = "inquiry")]
    pub inquiry_id: Option<String>,
    /// Only incidents recorded within this many hours
    #[arg(long)]
    pub hours: Option<u32>,
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
    /// Delete incidents older than this many days first
    #[arg(long)]
    pub prune_days: Option<u32>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum PostCommand {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Image file, data URL, or already stored URL. Repeatable.
        #[arg(long = "image")]
        images: Vec<String>,
    },
    /// Edit a post. Omitted fields keep their stored value.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Replacement image list, in order. Omit to keep current images.
        #[arg(long = "image")]
        images: Vec<String>,
        /// Remove every image from the post
        #[arg(long, conflicts_with = "images")]
        clear_images: bool,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum InquiryCommand {
    /// Submit an inquiry as a visitor would
    Submit(SubmitArgs),
    /// List inquiries (author only)
    List {
        #[arg(long)]
        status: Option<InquiryStatus>,
        #[arg(long, short, default_value = "")]
        search: String,
        #[arg(long)]
        json: bool,
    },
    /// Change an inquiry's status (author only)
    Status { id: String, status: InquiryStatus },
    /// Delete an inquiry (author only)
    Delete { id: String },
}

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub kakao_id: Option<String>,
    #[arg(long, default_value = "")]
    pub message: String,
    #[arg(long)]
    pub budget: Option<String>,
    #[arg(long)]
    pub space: Option<SpaceType>,
}
