//! An interactive shell over the civic client core.
//! Reads one command per line from stdin against the configured store and catalog.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};

use civic_core::{
    error::{Error, Result},
    logging,
    model::{
        commit::{CommitIntent, CommitOutcome},
        navigation::Screen,
        passcode::{Passcode, Validation},
        selection::Toggle,
        user::TeamMembership,
    },
    App, Config,
};

const ABOUT_TEXT: &str = "Drive the civic client core from the terminal.

Settings come from Civic.toml and CIVIC_* environment variables.
Type `help` at the prompt for the list of commands.";

#[derive(Debug, Parser)]
#[command(version, about = ABOUT_TEXT)]
struct Args {
    /// log4rs config file; console logging is used if it cannot be read.
    #[arg(long, default_value = "log4rs.yaml")]
    log_config: PathBuf,
}

/// One line of shell input.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum ShellCommand {
    /// Show the current screen and session.
    Status,
    /// Sign in with email and password.
    Login { email: String, password: String },
    /// Create an account and sign in.
    Register {
        email: String,
        password: String,
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },
    /// Verify the account, against the identity registry if an id is given.
    Verify { personal_id: Option<String> },
    /// Continue without verifying.
    Skip,
    /// Set a new 4-digit passcode.
    Passcode { code: Passcode },
    /// Sign in with the passcode.
    Unlock { code: Passcode },
    /// Forget the passcode but keep the account.
    ResetPasscode,
    /// List the ballots and the current selections.
    Ballots,
    /// Toggle a candidate on a ballot item.
    Select { ballot: u32, item: u32, candidate: u32 },
    /// Pick a ballot item without candidates.
    Choose { ballot: u32, item: u32 },
    /// Drop pending changes to one ballot, or to all of them.
    Discard { ballot: Option<u32> },
    /// Confirm pending changes with the passcode.
    Commit {
        code: Passcode,
        /// Also move to this district.
        #[arg(long, conflicts_with_all = ["join", "leave"])]
        district: Option<u32>,
        /// Also join this team.
        #[arg(long, conflicts_with = "leave")]
        join: Option<u32>,
        /// Also leave the current team.
        #[arg(long)]
        leave: bool,
    },
    /// Sign out, keeping the passcode.
    Logout,
    /// Forget this account entirely.
    ChangeUser,
    /// Leave the shell.
    #[command(alias = "exit")]
    Quit,
}

/// What the shell loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue(String),
    Quit,
}

fn outcome_text(outcome: CommitOutcome) -> String {
    match outcome {
        CommitOutcome::Committed { flipped, applied: true } => {
            format!("Committed {flipped} selection(s)")
        }
        CommitOutcome::Committed { flipped, applied: false } => {
            format!("Committed {flipped} selection(s), but the change could not be saved")
        }
        CommitOutcome::Rejected { remaining_attempts } => {
            format!("Wrong passcode, {remaining_attempts} attempt(s) left")
        }
        CommitOutcome::LockedOut => "Too many wrong passcodes, signed out".to_string(),
        CommitOutcome::NoCredential => "No passcode is set".to_string(),
    }
}

fn done(ok: bool, success: &str, failure: &str) -> String {
    (if ok { success } else { failure }).to_string()
}

async fn execute(app: &App, command: ShellCommand) -> Result<Flow> {
    let text = match command {
        ShellCommand::Status => status(app).await,
        ShellCommand::Login { email, password } => done(
            app.login(&email, &password).await,
            "Signed in",
            "Wrong email or password",
        ),
        ShellCommand::Register {
            email,
            password,
            name,
        } => done(
            app.register(&email, &password, &name.join(" ")).await,
            "Registered and signed in",
            "Could not register",
        ),
        ShellCommand::Verify { personal_id } => {
            let verified = match personal_id {
                Some(id) => app.verify_personal_id(&id).await,
                None => app.verify(None).await,
            };
            done(verified, "Verified", "Could not verify")
        }
        ShellCommand::Skip => done(
            app.skip_verification().await,
            "Verification skipped",
            "Nobody is signed in",
        ),
        ShellCommand::Passcode { code } => done(
            app.set_passcode(&code).await,
            "Passcode saved",
            "Could not save the passcode",
        ),
        ShellCommand::Unlock { code } => match app.unlock(&code).await {
            Validation::Valid => "Unlocked".to_string(),
            Validation::Invalid { remaining_attempts } => {
                format!("Wrong passcode, {remaining_attempts} attempt(s) left")
            }
            Validation::LockedOut => "Too many wrong passcodes, signed out".to_string(),
            Validation::NoCredential => "Nothing to unlock".to_string(),
        },
        ShellCommand::ResetPasscode => {
            app.reset_passcode().await;
            "Passcode removed".to_string()
        }
        ShellCommand::Ballots => ballots(app).await?,
        ShellCommand::Select {
            ballot,
            item,
            candidate,
        } => match app.select(ballot, item, candidate).await? {
            Toggle::Added => format!("Selected candidate {candidate}"),
            Toggle::Removed => format!("Removed candidate {candidate}"),
            Toggle::Rejected => "Selection limit reached".to_string(),
        },
        ShellCommand::Choose { ballot, item } => {
            let entry = app.choose(ballot, item).await?;
            format!("Chose '{}'", entry.name)
        }
        ShellCommand::Discard { ballot: Some(ballot) } => done(
            app.discard(ballot).await,
            "Discarded",
            "Nothing to discard",
        ),
        ShellCommand::Discard { ballot: None } => {
            app.discard_all().await;
            "Discarded all pending changes".to_string()
        }
        ShellCommand::Commit {
            code,
            district,
            join,
            leave,
        } => {
            let intent = intent(app, district, join, leave)?;
            outcome_text(app.commit(&code, intent).await)
        }
        ShellCommand::Logout => {
            app.logout().await;
            "Signed out".to_string()
        }
        ShellCommand::ChangeUser => {
            app.change_user().await;
            "Account forgotten".to_string()
        }
        ShellCommand::Quit => return Ok(Flow::Quit),
    };
    Ok(Flow::Continue(text))
}

fn intent(app: &App, district: Option<u32>, join: Option<u32>, leave: bool) -> Result<CommitIntent> {
    let catalog = app.catalog();
    Ok(match (district, join) {
        (Some(id), _) => CommitIntent::ChangeDistrict(
            catalog
                .district(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("District {id}")))?,
        ),
        (_, Some(id)) => CommitIntent::JoinTeam(TeamMembership::join(
            catalog
                .team(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Team {id}")))?,
        )),
        _ if leave => CommitIntent::LeaveTeam,
        _ => CommitIntent::Ballots,
    })
}

async fn status(app: &App) -> String {
    let screen = app.screen();
    let mut text = format!("Screen: {screen}");
    if !screen.routes().is_empty() {
        let _ = write!(text, "\nRoutes: {}", screen.routes().join(", "));
    }
    match app.user() {
        Some(user) => {
            let verified = if user.is_verified {
                "verified"
            } else if user.skip_verified {
                "verification skipped"
            } else {
                "unverified"
            };
            let _ = write!(
                text,
                "\nUser: {} <{}>, {verified}\nDistrict: {}\nTeam: {}",
                user.name, user.email, user.district.name, user.team_member.team.name
            );
        }
        None => text.push_str("\nNobody is signed in"),
    }
    if app.guard().is_passcode_set() {
        let remaining = app.guard().remaining_attempts().await;
        let _ = write!(text, "\nPasscode set, {remaining} attempt(s) left");
    }
    let pending = app.dirty().await.len();
    if pending > 0 {
        let _ = write!(text, "\n{pending} ballot(s) awaiting confirmation");
    }
    text
}

async fn ballots(app: &App) -> Result<String> {
    if app.screen() != Screen::Main {
        return Err(Error::Unauthorized(format!(
            "ballots are only available from the main screen, not {}",
            app.screen()
        )));
    }
    let election = app.election().await;
    let mut text = format!("{} (election {})", election.name, election.id);
    for ballot in &election.ballots {
        let _ = write!(text, "\n[{}] {}", ballot.id, ballot.name);
        let entry = app.entry(ballot.id).await;
        for item in &ballot.ballot_items {
            let chosen = entry.as_ref().filter(|e| e.ballot_item_id == item.id);
            let marker = match chosen {
                Some(e) if e.is_new_selection => "*",
                Some(_) => "+",
                None => " ",
            };
            let limit = match item.max_selected_item {
                0 => String::new(),
                max => format!(" (up to {max})"),
            };
            let _ = write!(text, "\n  {marker}[{}] {}{limit}", item.id, item.name);
            if !item.has_candidates() {
                continue;
            }
            for candidate in app.available_candidates(ballot.id, item.id).await? {
                let position = chosen
                    .and_then(|e| e.selections.iter().find(|s| s.id == candidate.id))
                    .map(|s| format!("{}.", s.position))
                    .unwrap_or_default();
                let _ = write!(text, "\n     {position:>3} [{}] {}", candidate.id, candidate.name);
            }
        }
    }
    Ok(text)
}

async fn run(args: Args) -> Result<()> {
    logging::init(&args.log_config)?;
    let config = Config::load()?;
    let app = App::open(&config).await?;
    app.load().await;
    println!("{}", status(&app).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words = match shell_words(&line) {
            Some(words) => words,
            None => continue,
        };
        let command = match Line::try_parse_from(words) {
            Ok(line) => line.command,
            Err(e) => {
                let _ = e.print();
                continue;
            }
        };
        match execute(&app, command).await {
            Ok(Flow::Continue(text)) => println!("{text}"),
            Ok(Flow::Quit) => break,
            Err(e) => println!("Error: {e}"),
        }
    }
    Ok(())
}

/// Split a line into words; blank lines and `#` comments yield nothing.
fn shell_words(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.split_whitespace().collect())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Critical failure: {e}");
        std::process::exit(1)
    }
}
