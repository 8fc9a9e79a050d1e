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
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Instrument, Level};

use crate::beats::{Beat, BeatStore};
use crate::sequencer::tempo::DEFAULT_BPM;
use crate::sequencer::{Pattern, Transport, DRUM_TRACKS, STEPS_PER_BAR};

pub mod keyboard;

/// Controller events that drive the transport.
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// Starts playback. If already playing, does nothing.
    Play,

    /// Stops playback. If stopped, does nothing.
    Stop,

    /// Flips one cell of the pattern.
    Toggle { track: usize, step: usize },

    /// Sets the tempo. Out of range values are clamped.
    Bpm(u32),

    /// Clears the pattern.
    Reset,

    /// Prints the pattern.
    Show,

    /// Saves the pattern and tempo as a new beat with the given name.
    Save(String),

    /// Saves over the beat being edited, optionally renaming it.
    Update(Option<String>),

    /// Replaces the pattern and tempo with a saved beat.
    Load(String),

    /// Clears the pattern and tempo and forgets the beat being edited. Refused
    /// once when there are unsaved changes.
    New,

    /// Lists the saved beats.
    Beats,

    /// Stops playback and ends the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    /// Sends events until the input ends or a Quit has been sent.
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// The saved beat the console is editing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentBeat {
    pub id: String,
    pub name: String,
}

/// Which saved beat is being edited, and whether the pattern or tempo changed
/// since it was last saved or loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Editor {
    current: Option<CurrentBeat>,
    dirty: bool,
    /// Set when a new beat was refused over unsaved changes. Only the event
    /// right after it can confirm.
    discard_pending: bool,
}

impl Editor {
    pub fn current(&self) -> Option<&CurrentBeat> {
        self.current.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn changed(&mut self) {
        self.dirty = true;
    }

    fn saved(&mut self, beat: &Beat) {
        self.current = Some(CurrentBeat {
            id: beat.id.clone(),
            name: beat.name.clone(),
        });
        self.dirty = false;
    }

    async fn save<S: BeatStore>(&mut self, transport: &Transport, library: &S, name: &str) {
        match library
            .create(name, transport.tempo(), &transport.pattern())
            .await
        {
            Ok(beat) => {
                println!("Saved {} as {}", beat.name, beat.id);
                self.saved(&beat);
            }
            Err(e) => {
                warn!(err = %e, "Unable to save beat");
                println!("Unable to save beat: {}", e);
            }
        }
    }

    async fn update<S: BeatStore>(
        &mut self,
        transport: &Transport,
        library: &S,
        name: Option<String>,
    ) {
        let Some(current) = self.current.clone() else {
            println!("No saved beat is loaded. Use save <name> to save a new one.");
            return;
        };
        let name = name.unwrap_or(current.name);
        match library
            .update(&current.id, &name, transport.tempo(), &transport.pattern())
            .await
        {
            Ok(beat) => {
                println!("Updated {}", beat.name);
                self.saved(&beat);
            }
            Err(e) => {
                warn!(id = %current.id, err = %e, "Unable to update beat");
                println!("Unable to update beat: {}", e);
            }
        }
    }

    async fn load<S: BeatStore>(&mut self, transport: &Transport, library: &S, id: &str) {
        match library.get(id).await {
            Ok(beat) => {
                transport.set_pattern(beat.sequencer_data);
                transport.set_bpm(beat.bpm.bpm());
                println!("Loaded {} ({} BPM)", beat.name, beat.bpm.bpm());
                self.saved(&beat);
            }
            Err(e) => {
                warn!(id, err = %e, "Unable to load beat");
                println!("Unable to load beat: {}", e);
            }
        }
    }

    fn start_new(&mut self, transport: &Transport) {
        if self.dirty && !self.discard_pending {
            match &self.current {
                Some(current) => println!(
                    "You have unsaved changes to \"{}\". Type new again to discard them, or update to save them first.",
                    current.name
                ),
                None => println!(
                    "You have unsaved changes. Type new again to discard them, or save <name> to keep them."
                ),
            }
            self.discard_pending = true;
            return;
        }

        transport.reset();
        transport.set_bpm(DEFAULT_BPM);
        *self = Editor::default();
        println!("Started a new beat.");
    }
}

/// Drives a transport from a driver's events.
pub struct Controller {
    handle: JoinHandle<Editor>,
}

impl Controller {
    /// Starts the controller. Library events go to the given beat store.
    pub fn new<S>(transport: Arc<Transport>, driver: Arc<dyn Driver>, library: Arc<S>) -> Controller
    where
        S: BeatStore + 'static,
    {
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(transport, driver, library)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes. Returns the final
    /// editing state.
    pub async fn join(&mut self) -> Result<Editor, JoinError> {
        (&mut self.handle).await
    }

    async fn trigger_events<S: BeatStore>(
        transport: Arc<Transport>,
        driver: Arc<dyn Driver>,
        library: Arc<S>,
    ) -> Editor {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);
        let mut editor = Editor::default();

        info!(bpm = transport.bpm(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = ?event, "Received event.");
            let confirms_new = event == Event::New;
            match event {
                Event::Play => transport.play(),
                Event::Stop => transport.stop(),
                Event::Toggle { track, step } => {
                    let pattern = transport.toggle(track, step);
                    info!(track, step, on = pattern.get(track, step), "Toggled step");
                    editor.changed();
                }
                Event::Bpm(bpm) => {
                    let before = transport.tempo();
                    let tempo = transport.set_bpm(bpm);
                    info!(bpm = tempo.bpm(), "Tempo set");
                    if tempo != before {
                        editor.changed();
                    }
                }
                Event::Reset => {
                    if transport.pattern().active_count() > 0 {
                        editor.changed();
                    }
                    transport.reset();
                }
                Event::Show => {
                    println!("{}", render(&transport));
                    if let Some(current) = editor.current() {
                        println!(
                            "Editing {}{}",
                            current.name,
                            if editor.is_dirty() {
                                " (unsaved changes)"
                            } else {
                                ""
                            }
                        );
                    }
                }
                Event::Save(name) => editor.save(&transport, &*library, &name).await,
                Event::Update(name) => editor.update(&transport, &*library, name).await,
                Event::Load(id) => editor.load(&transport, &*library, &id).await,
                Event::New => editor.start_new(&transport),
                Event::Beats => match library.list().await {
                    Ok(beats) if beats.is_empty() => println!("No saved beats."),
                    Ok(beats) => {
                        for beat in beats {
                            println!("{}", beat_line(&beat));
                        }
                    }
                    Err(e) => {
                        warn!(err = %e, "Unable to list beats");
                        println!("Unable to list beats: {}", e);
                    }
                },
                Event::Quit => break,
            }
            if !confirms_new {
                editor.discard_pending = false;
            }
        }

        transport.stop();
        info!("Controller closing.");
        // Dropping the receiver unblocks a driver still trying to send.
        drop(events_rx);
        match join_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "Event monitor failed"),
            Err(e) => warn!(err = %e, "Error waiting for event monitor to stop"),
        }
        editor
    }
}

/// One line describing a saved beat.
pub fn beat_line(beat: &Beat) -> String {
    format!(
        "- {}  {} ({} BPM, updated {})",
        beat.id,
        beat.name,
        beat.bpm.bpm(),
        beat.updated_at
    )
}

/// One line per track: the track name, then its steps.
pub fn pattern_lines(pattern: &Pattern) -> Vec<String> {
    DRUM_TRACKS
        .iter()
        .zip(pattern.to_string().lines())
        .map(|(track, row)| format!("{:<14}{}", track.name, row))
        .collect()
}

/// Renders the pattern with track names, the tempo and a marker under the
/// step being played.
pub fn render(transport: &Transport) -> String {
    let mut lines = pattern_lines(&transport.pattern());

    if let Some(step) = transport.current_step() {
        // Cells are grouped in fours with a space between groups.
        let column = 14 + step + step / 4;
        lines.push(format!("{:>width$}", "^", width = column + 1));
    }
    lines.push(format!(
        "{} BPM, {}",
        transport.bpm(),
        if transport.is_playing() {
            "playing"
        } else {
            "stopped"
        }
    ));
    lines.join("\n")
}

/// Prints each step as it is played until the transport goes away.
pub fn print_steps(transport: &Transport) -> JoinHandle<()> {
    let mut steps = transport.subscribe();
    tokio::spawn(async move {
        while steps.changed().await.is_ok() {
            if let Some(step) = *steps.borrow_and_update() {
                println!("step {:>2}/{}", step + 1, STEPS_PER_BAR);
            }
        }
    })
}
