//! GridDown team CLI
//!
//! Thin wrapper around griddown-team-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Create a team and print its passphrase
//! gdteam create "Ridge Runners" --name Alpha
//!
//! # Share it
//! gdteam invite code
//! gdteam invite export --full --out ridge.gdteam
//!
//! # Join from another device
//! gdteam join GDTEAM:eyJ0Ijoi... --name Bravo
//! gdteam join ridge.gdteam --passphrase KX4P-9QRT-M2VD-77HW
//!
//! # Rally points and comm plan
//! gdteam rally add Trailhead 39.74 -105.51 --kind primary
//! gdteam plan checkin 18:00 --frequency daily
//!
//! # Bridge to a radio: print outbound envelopes, feed inbound ones back
//! gdteam --online position 39.7 -105.5
//! gdteam sync apply '{"_ts":"team",...}'
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use griddown_team_core::{
    CheckIn, CheckInFrequency, ConnectionState, EngineConfig, Fix, IgnoreReason, InboundOutcome,
    MemberId, MeshTransport, NewRallyPoint, NewTeam, PackageOptions, ProfileUpdate, RallyPointId,
    RallyType, RedbStore, Role, TeamEngine, TeamError,
};
use tracing::debug;

/// Prefix on stdout lines carrying outbound mesh envelopes
const MESH_LINE_PREFIX: &str = "mesh> ";

/// GridDown team engine
#[derive(Parser)]
#[command(name = "gdteam")]
#[command(version)]
#[command(about = "GridDown team engine - shared team state over a radio mesh")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: <platform data dir>/griddown)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print outbound sync envelopes to stdout as if sent over the mesh
    #[arg(long, global = true)]
    online: bool,

    /// Radio node id to use as our member id when creating or joining
    #[arg(long, global = true)]
    node_id: Option<String>,

    /// PBKDF2 iteration override; every peer must use the same value
    #[arg(long, global = true, hide = true)]
    kdf_iterations: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new team with yourself as leader
    Create {
        /// Team name
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Shared passphrase (generated if omitted)
        #[arg(long)]
        passphrase: Option<String>,
        /// Mesh channel name (derived from the team name if omitted)
        #[arg(long)]
        channel: Option<String>,
        /// Your display name
        #[arg(long = "name", default_value = "Leader")]
        my_name: String,
    },

    /// Show the current team
    Show,

    /// Share the team
    Invite {
        #[command(subcommand)]
        action: InviteAction,
    },

    /// Join a team from an invite code, package JSON or .gdteam file
    Join {
        /// Invite code, package JSON, or path to a package file
        input: String,
        #[arg(long)]
        passphrase: Option<String>,
        /// Your display name
        #[arg(long = "name", default_value = "Member")]
        my_name: String,
    },

    /// Member management
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// Rally point management
    Rally {
        #[command(subcommand)]
        action: RallyAction,
    },

    /// Communication plan
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Record your current position
    Position {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },

    /// Distances to members and rally points from your position
    Distances,

    /// Leave the team
    Leave,

    /// Dissolve the team for everyone (leader only)
    Dissolve,

    /// Mesh sync
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },
}

#[derive(Subcommand)]
enum InviteAction {
    /// Compact GDTEAM: code (contains the passphrase)
    Code,
    /// Unencrypted team package JSON
    Package {
        /// Include rally points and comm plan
        #[arg(long)]
        full: bool,
    },
    /// Passphrase-encrypted .gdteam package
    Export {
        /// Include rally points and comm plan
        #[arg(long)]
        full: bool,
        /// Output file (default: ./<team-name>.gdteam)
        #[arg(long, conflicts_with = "stdout")]
        out: Option<PathBuf>,
        /// Print the package JSON instead of writing a file
        #[arg(long)]
        stdout: bool,
    },
}

#[derive(Subcommand)]
enum MemberAction {
    /// Change a member's role
    Role { member_id: String, role: String },
    /// Remove a member from the team
    Remove { member_id: String },
    /// Change your own display name
    Rename {
        name: String,
        #[arg(long)]
        short: Option<String>,
    },
}

#[derive(Subcommand)]
enum RallyAction {
    /// Add a rally point
    Add {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
        /// primary, secondary, emergency, cache or extraction
        #[arg(long, default_value = "primary")]
        kind: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        schedule: Option<String>,
    },
    /// List rally points
    List,
    /// Remove a rally point
    Remove { id: String },
}

#[derive(Subcommand)]
enum PlanAction {
    /// Set comm plan fields; omitted fields keep their value
    Set {
        #[arg(long)]
        primary: Option<String>,
        #[arg(long)]
        backup: Option<String>,
        #[arg(long)]
        emergency_word: Option<String>,
        #[arg(long)]
        all_clear_word: Option<String>,
    },
    /// Schedule a radio check-in
    Checkin {
        /// Local time, HH:MM
        time: String,
        /// daily, hourly or once
        #[arg(long, default_value = "daily")]
        frequency: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Apply one received mesh message
    Apply { message: String },
}

/// Transport that "sends" by printing to stdout
struct StdoutTransport {
    node_id: Option<String>,
}

#[async_trait]
impl MeshTransport for StdoutTransport {
    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn node_id(&self) -> Option<String> {
        self.node_id.clone()
    }

    async fn send_text(&self, text: &str) -> Result<(), TeamError> {
        println!("{}{}", MESH_LINE_PREFIX, text);
        Ok(())
    }
}

/// Fixed identity without a radio, so `--node-id` works offline too
struct OfflineTransport {
    node_id: String,
}

#[async_trait]
impl MeshTransport for OfflineTransport {
    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Disconnected
    }

    fn node_id(&self) -> Option<String> {
        Some(self.node_id.clone())
    }

    async fn send_text(&self, _text: &str) -> Result<(), TeamError> {
        Err(TeamError::Transport("offline".to_string()))
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (<data dir>/griddown)
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("griddown")
}

fn parse_role(s: &str) -> Result<Role> {
    s.parse::<Role>()
        .with_context(|| format!("Valid roles: {}", Role::ALL.map(|r| r.as_str()).join(", ")))
}

fn parse_rally_type(s: &str) -> Result<RallyType> {
    s.parse::<RallyType>().map_err(|e| anyhow::anyhow!(e))
}

fn parse_frequency(s: &str) -> Result<CheckInFrequency> {
    s.parse::<CheckInFrequency>().map_err(|e| anyhow::anyhow!(e))
}

/// Read `input` from disk if it names an existing file
fn read_package_input(input: &str) -> Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read package file {}", path.display()))
    } else {
        Ok(input.to_string())
    }
}

fn describe_fix(fix: Option<Fix>) -> String {
    match fix {
        Some(fix) => format!("{} {}", fix.formatted(), fix.compass()),
        None => "(no position)".to_string(),
    }
}

fn print_team(engine: &TeamEngine) -> Result<()> {
    let Some(team) = engine.team() else {
        println!("Not in a team.");
        return Ok(());
    };

    println!("Team: {}", team.name);
    println!("  ID: {}", team.id);
    if !team.description.is_empty() {
        println!("  Description: {}", team.description);
    }
    println!("  Channel: {}", team.mesh_channel);
    println!(
        "  Passphrase: {}",
        if team.passphrase.is_some() { "set" } else { "none" }
    );

    if let Some(me) = engine.me() {
        println!("  You: {} ({}) - {}", me.name, me.id, me.role);
    }

    println!();
    println!("Members ({}):", team.members.len());
    for (member, status) in engine.roster()? {
        println!(
            "  {:<4} {:<16} {:<10} {:<8} {}",
            member.short_name,
            member.name,
            member.role.as_str(),
            status.to_string(),
            member.id
        );
    }

    println!();
    println!("Rally points: {}", team.rally_points.len());

    let plan = &team.comm_plan;
    if let Some(primary) = &plan.primary_frequency {
        println!("Primary frequency: {}", primary);
    }
    if let Some(backup) = &plan.backup_frequency {
        println!("Backup frequency: {}", backup);
    }
    for check_in in &plan.check_in_times {
        println!("Check-in: {} ({:?})", check_in.time, check_in.frequency);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    debug!(data_dir = %data_dir.display(), "Opening team store");
    let store = RedbStore::open(data_dir.join("team.redb"))
        .with_context(|| format!("Failed to open store in {}", data_dir.display()))?;

    let mut config = EngineConfig::default();
    if let Some(iterations) = cli.kdf_iterations {
        config = config.with_kdf_iterations(iterations);
    }

    let mut builder = TeamEngine::builder(Arc::new(store)).config(config);
    if cli.online {
        builder = builder.transport(Arc::new(StdoutTransport {
            node_id: cli.node_id,
        }));
    } else if let Some(node_id) = cli.node_id {
        builder = builder.transport(Arc::new(OfflineTransport { node_id }));
    }
    let mut engine = builder.build();
    let restored = engine.load().await?;
    debug!(restored, online = cli.online, "Engine ready");

    match cli.command {
        Commands::Create {
            name,
            description,
            passphrase,
            channel,
            my_name,
        } => {
            let team_id = engine
                .create_team(NewTeam {
                    name,
                    description,
                    passphrase,
                    mesh_channel: channel,
                    my_name,
                })
                .await?;
            let team = engine.team().context("team missing after create")?;

            println!("Created team: {}", team.name);
            println!("  ID: {}", team_id);
            println!("  Channel: {}", team.mesh_channel);
            if let Some(passphrase) = &team.passphrase {
                println!("  Passphrase: {}", passphrase);
            }
        }

        Commands::Show => print_team(&engine)?,

        Commands::Invite { action } => match action {
            InviteAction::Code => println!("{}", engine.invite_code()?),
            InviteAction::Package { full } => {
                let options = if full {
                    PackageOptions::full()
                } else {
                    PackageOptions::default()
                };
                println!("{}", engine.display_package(options)?.to_json()?);
            }
            InviteAction::Export { full, out, stdout } => {
                let options = if full {
                    PackageOptions::full()
                } else {
                    PackageOptions::default()
                };
                let package = engine.export_package(options).await?;
                let json = package.to_json()?;
                if stdout {
                    println!("{}", json);
                } else {
                    let path = out.unwrap_or_else(|| PathBuf::from(package.file_name()));
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
            }
        },

        Commands::Join {
            input,
            passphrase,
            my_name,
        } => {
            let input = read_package_input(&input)?;
            let team_id = engine
                .join(&input, passphrase.as_deref(), &my_name)
                .await?;
            let team = engine.team().context("team missing after join")?;

            println!("Joined team: {}", team.name);
            println!("  ID: {}", team_id);
            if let Some(me) = engine.me() {
                println!("  Member ID: {}", me.id);
            }
        }

        Commands::Member { action } => match action {
            MemberAction::Role { member_id, role } => {
                let role = parse_role(&role)?;
                engine
                    .set_member_role(&MemberId::from(member_id.as_str()), role)
                    .await?;
                println!("Set {} to {}", member_id, role);
            }
            MemberAction::Remove { member_id } => {
                engine
                    .remove_member(&MemberId::from(member_id.as_str()))
                    .await?;
                println!("Removed {}", member_id);
            }
            MemberAction::Rename { name, short } => {
                engine
                    .update_profile(ProfileUpdate {
                        name: Some(name),
                        short_name: short,
                    })
                    .await?;
                if let Some(me) = engine.me() {
                    println!("You are now {} ({})", me.name, me.short_name);
                }
            }
        },

        Commands::Rally { action } => match action {
            RallyAction::Add {
                name,
                lat,
                lon,
                kind,
                notes,
                schedule,
            } => {
                let mut params =
                    NewRallyPoint::new(name, parse_rally_type(&kind)?, lat, lon).with_notes(notes);
                params.schedule = schedule;
                let id = engine.add_rally_point(params).await?;
                println!("Added rally point");
                println!("  ID: {}", id);
            }
            RallyAction::List => {
                let team = engine.team().ok_or(TeamError::NotInTeam)?;
                if team.rally_points.is_empty() {
                    println!("No rally points.");
                }
                for point in &team.rally_points {
                    println!(
                        "  {} {:?} {:.5},{:.5} {}",
                        point.name, point.kind, point.lat, point.lon, point.id
                    );
                    if !point.notes.is_empty() {
                        println!("      {}", point.notes);
                    }
                }
            }
            RallyAction::Remove { id } => {
                engine
                    .remove_rally_point(&RallyPointId::from(id.as_str()))
                    .await?;
                println!("Removed rally point {}", id);
            }
        },

        Commands::Plan { action } => match action {
            PlanAction::Set {
                primary,
                backup,
                emergency_word,
                all_clear_word,
            } => {
                let mut plan = engine
                    .team()
                    .ok_or(TeamError::NotInTeam)?
                    .comm_plan
                    .clone();
                if primary.is_some() {
                    plan.primary_frequency = primary;
                }
                if backup.is_some() {
                    plan.backup_frequency = backup;
                }
                if emergency_word.is_some() {
                    plan.emergency_word = emergency_word;
                }
                if all_clear_word.is_some() {
                    plan.all_clear_word = all_clear_word;
                }
                engine.set_comm_plan(plan).await?;
                println!("Comm plan updated");
            }
            PlanAction::Checkin {
                time,
                frequency,
                date,
                notes,
            } => {
                engine
                    .add_check_in(CheckIn {
                        time: time.clone(),
                        frequency: parse_frequency(&frequency)?,
                        date,
                        notes,
                    })
                    .await?;
                println!("Check-in scheduled at {}", time);
            }
        },

        Commands::Position { lat, lon } => {
            engine.update_position(lat, lon).await?;
            println!("Position updated");
        }

        Commands::Distances => {
            println!("Members:");
            for (member, fix) in engine.member_distances()? {
                println!("  {:<4} {:<16} {}", member.short_name, member.name, describe_fix(fix));
            }
            println!("Rally points:");
            for (point, fix) in engine.rally_distances()? {
                println!("  {:<20} {}", point.name, describe_fix(fix));
            }
        }

        Commands::Leave => {
            engine.leave().await?;
            println!("Left team");
        }

        Commands::Dissolve => {
            engine.dissolve().await?;
            println!("Team dissolved");
        }

        Commands::Sync { action } => match action {
            SyncAction::Apply { message } => match engine.handle_incoming(&message).await {
                InboundOutcome::Applied(subtype) => println!("Applied {}", subtype),
                InboundOutcome::RemovedFromTeam => println!("You were removed from the team"),
                InboundOutcome::Dissolved => println!("The team was dissolved by its leader"),
                InboundOutcome::Ignored(IgnoreReason::NotInTeam) => {
                    bail!("Not in a team; message ignored")
                }
                InboundOutcome::Ignored(reason) => println!("Ignored ({:?})", reason),
            },
        },
    }

    Ok(())
}
