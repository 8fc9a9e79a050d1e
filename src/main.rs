// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use beatgrid::audio;
use beatgrid::auth::{Authenticator, GoTrueAuth, LaunchMode, SessionStore, SignUp};
use beatgrid::backend::Backend;
use beatgrid::beats::{BeatStore, MemoryBeatStore, RemoteBeatStore};
use beatgrid::config::Settings;
use beatgrid::controller::{self, keyboard, Controller, Event};
use beatgrid::samples::{InitError, SampleBank};
use beatgrid::sequencer::{Engine, Pattern, Tempo, Transport, DRUM_TRACKS};
use clap::{crate_version, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A step sequencer drum machine."
)]
struct Cli {
    /// The path to a YAML settings file. BEATGRID_* environment variables
    /// override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loads the samples and starts an interactive sequencer.
    Play {
        /// The device name to play through. Defaults to the system default.
        #[arg(short, long)]
        device: Option<String>,
        /// The directory holding the <sound>.wav samples.
        #[arg(short, long)]
        samples: Option<String>,
        /// A JSON pattern file to start from.
        #[arg(short, long)]
        pattern: Option<PathBuf>,
        /// The id of a saved beat to start from.
        #[arg(short, long, conflicts_with = "pattern")]
        beat: Option<String>,
        /// The starting tempo.
        #[arg(long)]
        bpm: Option<u32>,
        /// Prints each step as it is played.
        #[arg(long)]
        show_steps: bool,
    },
    /// Creates an account.
    SignUp {
        email: String,
        #[arg(long, env = "BEATGRID_PASSWORD")]
        password: String,
    },
    /// Signs in and remembers the session.
    SignIn {
        email: String,
        #[arg(long, env = "BEATGRID_PASSWORD")]
        password: String,
    },
    /// Signs out and forgets the session.
    SignOut {},
    /// Sends a password reset link.
    ForgotPassword { email: String },
    /// Sets a new password from a password reset link.
    ResetPassword {
        /// The full link from the reset email.
        #[arg(long)]
        url: String,
        #[arg(long, env = "BEATGRID_NEW_PASSWORD")]
        password: String,
    },
    /// Manages the saved beats of the signed in account.
    Beats {
        #[clap(subcommand)]
        command: BeatCommands,
    },
}

#[derive(Subcommand)]
enum BeatCommands {
    /// Lists saved beats, newest first.
    List {},
    /// Prints one beat.
    Show { id: String },
    /// Saves a pattern file as a new beat.
    Save {
        name: String,
        /// The JSON pattern file.
        #[arg(short, long)]
        pattern: PathBuf,
        /// The tempo, if the file does not carry one.
        #[arg(long)]
        bpm: Option<u32>,
    },
    /// Overwrites a saved beat.
    Update {
        id: String,
        name: String,
        /// The JSON pattern file.
        #[arg(short, long)]
        pattern: PathBuf,
        /// The tempo, if the file does not carry one.
        #[arg(long)]
        bpm: Option<u32>,
    },
    /// Deletes one or more beats.
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Reads a pattern file: either a bare grid or an object with
/// `sequencer_data` and optionally `bpm`, as exported from the library.
fn read_pattern_file(path: &Path) -> Result<(Pattern, Option<Tempo>), Box<dyn Error>> {
    let json: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    match json.get("sequencer_data") {
        Some(data) => Ok((
            Pattern::normalize(data),
            json.get("bpm").and_then(Value::as_f64).map(Tempo::from_f64),
        )),
        None => Ok((Pattern::normalize(&json), None)),
    }
}

/// The identity client, seeded with the session saved by an earlier run.
fn account(settings: &Settings, backend: &Backend) -> (GoTrueAuth, SessionStore) {
    let auth = GoTrueAuth::new(backend.clone()).with_redirect(settings.redirect_url());
    let sessions = SessionStore::new(settings.session_file());
    match sessions.load() {
        Ok(Some(session)) => auth.restore(session),
        Ok(None) => {}
        Err(e) => warn!(err = %e, "Ignoring saved session"),
    }
    (auth, sessions)
}

/// How long exit waits on blocking work, such as a sample load that timed out
/// while stuck on the filesystem.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn print_pattern(pattern: &Pattern) {
    for line in controller::pattern_lines(pattern) {
        println!("{}", line);
    }
}

async fn play(
    settings: &Settings,
    backend: &Backend,
    pattern: Option<PathBuf>,
    beat: Option<String>,
    bpm: Option<u32>,
    show_steps: bool,
) -> Result<(), Box<dyn Error>> {
    let output = audio::get_device(settings.audio_device()).map_err(InitError::Audio)?;
    info!(device = %output, sample_rate = output.sample_rate(), "Opened output");

    let mut bank = SampleBank::load(
        &DRUM_TRACKS,
        &settings.samples_dir(),
        output.sample_rate(),
        settings.sample_load_timeout()?,
    )
    .await?;
    for failure in bank.failures() {
        eprintln!("Sample unavailable, track will be silent: {}", failure);
    }
    for (index, track) in DRUM_TRACKS.iter().enumerate() {
        bank.set_volume(index, settings.track_volume(track.sound));
    }

    let engine = Engine::new(output, Arc::new(bank)).with_lookahead(settings.lookahead()?);
    let transport = Arc::new(Transport::new(Arc::new(engine)));

    if let Some(path) = pattern {
        let (pattern, tempo) = read_pattern_file(&path)?;
        transport.set_pattern(pattern);
        if let Some(tempo) = tempo {
            transport.set_bpm(tempo.bpm());
        }
    }
    // A saved beat is loaded through the console so it becomes the beat being
    // edited. A tempo given on the command line still wins.
    let mut initial = Vec::new();
    match beat {
        Some(id) => {
            initial.push(Event::Load(id));
            initial.extend(bpm.map(Event::Bpm));
            initial.push(Event::Show);
        }
        None => {
            if let Some(bpm) = bpm {
                transport.set_bpm(bpm);
            }
        }
    }

    if backend.is_configured() {
        let (auth, _) = account(settings, backend);
        let library = RemoteBeatStore::new(backend.clone(), auth.subscribe());
        console(transport, library, initial, show_steps).await
    } else {
        println!("No backend configured, saved beats last until exit.");
        console(transport, MemoryBeatStore::offline(), initial, show_steps).await
    }
}

/// Runs the interactive console, with library commands going to `library`.
async fn console<S: BeatStore + 'static>(
    transport: Arc<Transport>,
    library: S,
    initial: Vec<Event>,
    show_steps: bool,
) -> Result<(), Box<dyn Error>> {
    let steps = show_steps.then(|| controller::print_steps(&transport));
    println!("{}", controller::render(&transport));

    let driver = Arc::new(keyboard::Driver::new().with_initial(initial));
    let mut controller = Controller::new(transport.clone(), driver, Arc::new(library));
    controller.join().await?;
    if let Some(steps) = steps {
        steps.abort();
    }
    Ok(())
}

async fn beats(
    settings: &Settings,
    backend: &Backend,
    command: BeatCommands,
) -> Result<(), Box<dyn Error>> {
    let (auth, _) = account(settings, backend);
    let store = RemoteBeatStore::new(backend.clone(), auth.subscribe());

    match command {
        BeatCommands::List {} => {
            let beats = store.list().await?;
            if beats.is_empty() {
                println!("No saved beats.");
                return Ok(());
            }
            println!("Beats (count: {}):", beats.len());
            for beat in beats {
                println!("{}", controller::beat_line(&beat));
            }
        }
        BeatCommands::Show { id } => {
            let beat = store.get(&id).await?;
            println!("{} ({} BPM)", beat.name, beat.bpm.bpm());
            print_pattern(&beat.sequencer_data);
        }
        BeatCommands::Save { name, pattern, bpm } => {
            let (pattern, tempo) = read_pattern_file(&pattern)?;
            let tempo = bpm.map(Tempo::new).or(tempo).unwrap_or_default();
            let beat = store.create(&name, tempo, &pattern).await?;
            println!("Saved {} as {}", beat.name, beat.id);
        }
        BeatCommands::Update {
            id,
            name,
            pattern,
            bpm,
        } => {
            let (pattern, tempo) = read_pattern_file(&pattern)?;
            let tempo = bpm.map(Tempo::new).or(tempo).unwrap_or_default();
            let beat = store.update(&id, &name, tempo, &pattern).await?;
            println!("Updated {}", beat.name);
        }
        BeatCommands::Delete { ids } => {
            let mut failed = 0;
            for (id, result) in store.delete_many(&ids).await {
                match result {
                    Ok(()) => println!("Deleted {}", id),
                    Err(e) => {
                        failed += 1;
                        eprintln!("Failed to delete {}: {}", id, e);
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{} of {} deletes failed", failed, ids.len()).into());
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    // Blocking tasks cannot be cancelled, so a sample load that timed out may
    // still be stuck. Do not wait on it forever.
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    result
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let backend = Backend::from_settings(&settings)?;

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device,
            samples,
            pattern,
            beat,
            bpm,
            show_steps,
        } => {
            let mut settings = settings;
            settings.set_audio_device(device);
            settings.set_samples_dir(samples);
            play(&settings, &backend, pattern, beat, bpm, show_steps).await?;
        }
        Commands::SignUp { email, password } => {
            let (auth, sessions) = account(&settings, &backend);
            match auth.sign_up(&email, &password).await? {
                SignUp::SignedIn(session) => {
                    sessions.save(&session)?;
                    println!("Account created. Signed in as {}.", email.trim());
                }
                SignUp::ConfirmationRequired => {
                    println!("Check your email for a confirmation link, then sign in.");
                }
            }
        }
        Commands::SignIn { email, password } => {
            let (auth, sessions) = account(&settings, &backend);
            let session = auth.sign_in(&email, &password).await?;
            sessions.save(&session)?;
            println!("Signed in as {}.", email.trim());
        }
        Commands::SignOut {} => {
            let (auth, sessions) = account(&settings, &backend);
            auth.sign_out().await?;
            sessions.clear()?;
            println!("Signed out.");
        }
        Commands::ForgotPassword { email } => {
            let (auth, _) = account(&settings, &backend);
            auth.request_password_reset(&email).await?;
            println!(
                "If an account exists for {}, a reset link is on its way.",
                email.trim()
            );
        }
        Commands::ResetPassword { url, password } => {
            let launch = LaunchMode::parse(&url);
            if !launch.is_recovery() {
                return Err("the link is not a password reset link".into());
            }
            let auth = GoTrueAuth::new(backend.clone());
            auth.begin(&launch).await?;
            auth.complete_password_reset(&password).await?;
            SessionStore::new(settings.session_file()).clear()?;
            println!(
                "Password updated. Sign in with your new password at {}.",
                LaunchMode::cleared_url(&url)
            );
        }
        Commands::Beats { command } => beats(&settings, &backend, command).await?,
    }

    Ok(())
}
