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

use parking_lot::Mutex;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::sequencer::{track_index, STEPS_PER_BAR};

const PLAY: &str = "play";
const STOP: &str = "stop";
const TOGGLE: &str = "toggle";
const BPM: &str = "bpm";
const RESET: &str = "reset";
const SHOW: &str = "show";
const SAVE: &str = "save";
const UPDATE: &str = "update";
const LOAD: &str = "load";
const NEW: &str = "new";
const BEATS: &str = "beats";
const QUIT: &str = "quit";

/// A controller that reads commands typed on the keyboard, one per line.
pub struct Driver {
    /// Sent before the keyboard is read.
    initial: Mutex<Vec<Event>>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            initial: Mutex::new(Vec::new()),
        }
    }

    /// Queues events to send ahead of any typed command.
    pub fn with_initial(mut self, events: Vec<Event>) -> Driver {
        *self.initial.get_mut() = events;
        self
    }

    /// Parses one line of input. Steps are numbered from 1 on the keyboard.
    fn parse(input: &str) -> Result<Option<Event>, String> {
        let mut words = input.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        // Beat names keep their inner spacing.
        let rest = input.trim()[command.len()..].trim();

        let event = match (command.to_lowercase().as_str(), args.as_slice()) {
            (PLAY, []) => Event::Play,
            (STOP, []) => Event::Stop,
            (RESET, []) => Event::Reset,
            (SHOW, []) => Event::Show,
            (QUIT | "exit", []) => Event::Quit,
            (TOGGLE, [track, step]) => {
                let track =
                    track_index(track).ok_or_else(|| format!("unknown track {}", track))?;
                let step = step
                    .parse::<usize>()
                    .ok()
                    .filter(|step| (1..=STEPS_PER_BAR).contains(step))
                    .ok_or_else(|| format!("step must be 1 to {}", STEPS_PER_BAR))?;
                Event::Toggle {
                    track,
                    step: step - 1,
                }
            }
            (BPM, [bpm]) => {
                Event::Bpm(bpm.parse().map_err(|_| format!("invalid tempo {}", bpm))?)
            }
            (SAVE, []) => return Err(format!("usage: {} <name>", SAVE)),
            (SAVE, _) => Event::Save(rest.to_string()),
            (UPDATE, []) => Event::Update(None),
            (UPDATE, _) => Event::Update(Some(rest.to_string())),
            (LOAD, [id]) => Event::Load(id.to_string()),
            (NEW, []) => Event::New,
            (BEATS, []) => Event::Beats,
            _ => return Err(format!("unrecognized command {}", input.trim())),
        };
        Ok(Some(event))
    }

    /// Reads and forwards one command. Returns false once input is over.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> io::Result<bool>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {} <track> <step>, {} <n>, {}, {}, {} <name>, {} [name], {} <id>, {}, {}, {}): ",
            PLAY, STOP, TOGGLE, BPM, RESET, SHOW, SAVE, UPDATE, LOAD, NEW, BEATS, QUIT,
        )?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            // End of input.
            let _ = events_tx.blocking_send(Event::Quit);
            return Ok(false);
        }

        let event = match Driver::parse(&input) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(true),
            Err(message) => {
                warn!(input = input.trim(), "Unrecognized input");
                writeln!(writer, "{}", message)?;
                return Ok(true);
            }
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(!quit)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let initial = std::mem::take(&mut *self.initial.lock());
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");
            for event in initial {
                events_tx
                    .blocking_send(event)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            }

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader};

    use tokio::sync::mpsc;

    use super::Driver;
    use crate::controller::Event;

    fn get_event(input: &str) -> Result<(Option<Event>, bool, String), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);
        let reader = BufReader::new(input.as_bytes());
        let mut output = Vec::new();
        let more = Driver::monitor_io(&sender, reader, &mut output)?;

        // Force the sender to close.
        drop(sender);
        Ok((
            receiver.blocking_recv(),
            more,
            String::from_utf8_lossy(&output).to_string(),
        ))
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(Some(Event::Play), get_event("play\n")?.0);
        assert_eq!(Some(Event::Stop), get_event("STOP\n")?.0);
        assert_eq!(Some(Event::Reset), get_event("reset\n")?.0);
        assert_eq!(Some(Event::Show), get_event("  show  \n")?.0);
        assert_eq!(Some(Event::Bpm(95)), get_event("bpm 95\n")?.0);
        assert_eq!(
            Some(Event::Toggle { track: 0, step: 0 }),
            get_event("toggle kick 1\n")?.0
        );
        assert_eq!(
            Some(Event::Toggle { track: 3, step: 15 }),
            get_event("toggle 3 16\n")?.0
        );
        Ok(())
    }

    #[test]
    fn test_library_events() -> Result<(), io::Error> {
        assert_eq!(
            Some(Event::Save("Groove  A".to_string())),
            get_event("save  Groove  A \n")?.0
        );
        assert_eq!(Some(Event::Update(None)), get_event("update\n")?.0);
        assert_eq!(
            Some(Event::Update(Some("Groove B".to_string()))),
            get_event("Update Groove B\n")?.0
        );
        assert_eq!(
            Some(Event::Load("beat-7".to_string())),
            get_event("load beat-7\n")?.0
        );
        assert_eq!(Some(Event::New), get_event("new\n")?.0);
        assert_eq!(Some(Event::Beats), get_event("beats\n")?.0);

        let (event, more, output) = get_event("save\n")?;
        assert_eq!(None, event);
        assert!(more);
        assert!(output.ends_with("usage: save <name>\n"));
        assert_eq!(None, get_event("load\n")?.0);
        assert_eq!(None, get_event("new now\n")?.0);
        Ok(())
    }

    #[test]
    fn test_quit_and_end_of_input() -> Result<(), io::Error> {
        let (event, more, _) = get_event("quit\n")?;
        assert_eq!(Some(Event::Quit), event);
        assert!(!more);

        let (event, more, _) = get_event("")?;
        assert_eq!(Some(Event::Quit), event);
        assert!(!more);
        Ok(())
    }

    #[test]
    fn test_bad_input() -> Result<(), io::Error> {
        for input in [
            "\n",
            "dance\n",
            "toggle cowbell 1\n",
            "toggle kick 17\n",
            "bpm fast\n",
        ] {
            let (event, more, _) = get_event(input)?;
            assert_eq!(None, event, "{:?} should not produce an event", input);
            assert!(more);
        }

        let (_, _, output) = get_event("toggle kick 0\n")?;
        assert!(output.ends_with("step must be 1 to 16\n"));
        Ok(())
    }
}
