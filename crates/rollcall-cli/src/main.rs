use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn enroll(
        &self,
        name: &str,
        mobile: &str,
        email: &str,
        image_path: &str,
    ) -> zbus::Result<String>;
    async fn update_face(&self, name: &str, image_path: &str) -> zbus::Result<String>;
    async fn recognize(&self, image_path: &str) -> zbus::Result<String>;
    async fn verify_admin(&self, candidate: &str) -> zbus::Result<bool>;
    async fn change_admin_password(&self, old: &str, new: &str) -> zbus::Result<String>;
    async fn present_today_count(&self) -> zbus::Result<i64>;
    async fn total_enrolled_count(&self) -> zbus::Result<i64>;
    async fn weekly_attendance(&self, offset: i64) -> zbus::Result<String>;
    async fn absent_today(&self) -> zbus::Result<String>;
    async fn all_records(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from an image with a single face
    Enroll {
        /// Unique name for the identity
        #[arg(short, long)]
        name: String,
        /// Contact number
        #[arg(short, long)]
        mobile: Option<String>,
        /// Contact email
        #[arg(short, long)]
        email: Option<String>,
        /// Image file containing exactly one face
        image: PathBuf,
    },
    /// Replace the stored facial data for an enrolled identity
    UpdateFace {
        #[arg(short, long)]
        name: String,
        image: PathBuf,
    },
    /// Recognize faces in an image and record attendance
    Recognize { image: PathBuf },
    /// Show today's headline numbers
    Dashboard,
    /// Per-day attendance counts for a Monday-aligned week
    Weekly {
        /// 0 = current week, -1 = last week, 1 = next week
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },
    /// List enrolled identities absent today
    Absent,
    /// Export all attendance records as CSV
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check an admin secret
    VerifyAdmin {
        #[arg(long)]
        password: String,
    },
    /// Change the admin secret
    ChangePassword {
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
    /// Show daemon status
    Status,
}

/// Mirror of the daemon's ledger row, for CSV export.
#[derive(Deserialize)]
struct ExportRecord {
    name: String,
    date: String,
    intime: String,
    outtime: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("connect to session bus (is rollcalld running?)")?;
    let proxy = AttendanceProxy::new(&connection).await?;

    match cli.command {
        Commands::Enroll { name, mobile, email, image } => {
            let receipt = proxy
                .enroll(
                    &name,
                    mobile.as_deref().unwrap_or(""),
                    email.as_deref().unwrap_or(""),
                    &absolute(&image)?,
                )
                .await?;
            print_pretty(&receipt);
        }
        Commands::UpdateFace { name, image } => {
            let receipt = proxy.update_face(&name, &absolute(&image)?).await?;
            print_pretty(&receipt);
        }
        Commands::Recognize { image } => {
            let report = proxy.recognize(&absolute(&image)?).await?;
            print_pretty(&report);
        }
        Commands::Dashboard => {
            let present = proxy.present_today_count().await?;
            let total = proxy.total_enrolled_count().await?;
            println!("present today: {present}");
            println!("total enrolled: {total}");
        }
        Commands::Weekly { offset } => {
            let report = proxy.weekly_attendance(offset).await?;
            print_pretty(&report);
        }
        Commands::Absent => {
            let report = proxy.absent_today().await?;
            print_pretty(&report);
        }
        Commands::Export { out } => {
            let raw = proxy.all_records().await?;
            let records: Vec<ExportRecord> =
                serde_json::from_str(&raw).context("parse attendance records")?;
            let csv = to_csv(&records);
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("write {}", path.display()))?;
                    println!("exported {} records to {}", records.len(), path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::VerifyAdmin { password } => {
            if proxy.verify_admin(&password).await? {
                println!("credential accepted");
            } else {
                println!("credential rejected");
                std::process::exit(1);
            }
        }
        Commands::ChangePassword { old, new } => {
            let message = proxy.change_admin_password(&old, &new).await?;
            println!("{message}");
        }
        Commands::Status => {
            let status = proxy.status().await?;
            print_pretty(&status);
        }
    }

    Ok(())
}

/// The daemon resolves paths in its own working directory, so hand it an
/// absolute one.
fn absolute(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("image not found: {}", path.display()))?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// Re-indent a JSON payload for the terminal; print as-is if it isn't JSON.
fn print_pretty(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

fn to_csv(records: &[ExportRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push("Name,Date,In Time,Out Time".to_string());
    for r in records {
        lines.push(format!("{},{},{},{}", r.name, r.date, r.intime, r.outtime));
    }
    lines.join("\n") + "\n"
}
