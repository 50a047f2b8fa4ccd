use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::Result;

use crate::{app::App, types::Mode};

/// One line of shell input, mapped to a page action.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Mode(Mode),
    Select(PathBuf),
    Analyze,
    Clear,
    Start,
    Stop,
    Toggle,
    Realtime(bool),
    Close,
    Results,
    Overlay,
    Notes,
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  mode upload|camera   switch mode (tears down the other one)
  select <path>        pick an image to analyse
  analyze              send the selected image to the server
  clear                drop the selected image
  start | stop         start or stop the camera
  toggle | space       start/stop the camera (camera mode only)
  realtime on|off      periodic frame detection while streaming
  close | esc          hide the results panel
  results              print the results panel
  overlay              print the live detection overlay
  notes                print visible notifications
  status               print mode and session state
  quit";

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "mode" => Command::Mode(rest.parse()?),
            "select" | "open" if !rest.is_empty() => Command::Select(PathBuf::from(rest)),
            "select" | "open" => return Err("select needs a file path".to_string()),
            "analyze" | "analyse" => Command::Analyze,
            "clear" => Command::Clear,
            "start" => Command::Start,
            "stop" => Command::Stop,
            "toggle" | "space" => Command::Toggle,
            "realtime" => match rest {
                "on" => Command::Realtime(true),
                "off" => Command::Realtime(false),
                _ => return Err("realtime needs `on` or `off`".to_string()),
            },
            "close" | "esc" => Command::Close,
            "results" => Command::Results,
            "overlay" => Command::Overlay,
            "notes" => Command::Notes,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command `{other}` (try `help`)")),
        };
        Ok(Some(command))
    }
}

/// Apply `command` to `app`, writing any output to `out`. Returns `false` on quit.
pub fn execute(app: &mut App, command: Command, out: &mut impl Write) -> io::Result<bool> {
    app.poll_camera();
    match command {
        Command::Mode(mode) => app.switch_mode(mode),
        Command::Select(path) => {
            if app.select_file(&path) {
                if let Some(upload) = app.uploads().pending() {
                    writeln!(
                        out,
                        "preview: {} {} ({} bytes)",
                        upload.payload.file_name,
                        upload.preview,
                        upload.payload.bytes.len()
                    )?;
                }
            }
        }
        Command::Analyze => {
            if app.analyze_image() {
                if let Some(html) = app.results().html() {
                    write!(out, "{html}")?;
                }
            }
        }
        Command::Clear => app.clear_upload(),
        Command::Start => {
            app.start_camera();
        }
        Command::Stop => app.stop_camera(),
        Command::Toggle => {
            if !app.toggle_camera() && app.mode() != Mode::Camera {
                writeln!(out, "switch to camera mode first")?;
            }
        }
        Command::Realtime(enabled) => app.session_mut().set_realtime(enabled),
        Command::Close => app.close_results(),
        Command::Results => match (app.results().html(), app.results().analysis()) {
            (Some(html), Some(analysis)) => {
                write!(out, "{html}")?;
                let masked = analysis.detections.iter().filter(|d| d.is_masked()).count();
                writeln!(
                    out,
                    "{} face(s), {masked} masked",
                    analysis.detections.len()
                )?;
            }
            _ => writeln!(out, "no results")?,
        },
        Command::Overlay => match app.session().latest_overlay() {
            Some(outcome) => write!(out, "frame #{}\n{}", outcome.seq, outcome.html)?,
            None => writeln!(out, "no overlay yet")?,
        },
        Command::Notes => {
            for note in app.notifier().active() {
                writeln!(out, "{note}")?;
            }
        }
        Command::Status => {
            let session = app.session();
            let stats = session.tick_stats();
            writeln!(out, "mode: {}", app.mode())?;
            writeln!(
                out,
                "camera: {} [{}] via {}",
                session.status_text(),
                session.state(),
                session.source_name()
            )?;
            if let Some(canvas) = session.canvas() {
                writeln!(out, "canvas: {canvas}")?;
            }
            writeln!(
                out,
                "realtime: {} (dispatched {}, completed {}, failed {})",
                if session.realtime() { "on" } else { "off" },
                stats.dispatched,
                stats.completed,
                stats.failed
            )?;
        }
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Quit => return Ok(false),
    }

    for note in app.notifier().take_unseen() {
        writeln!(out, "{note}")?;
    }
    Ok(true)
}

pub fn run(app: &mut App, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    writeln!(out, "mask-watch shell, `help` for commands")?;
    app.check_system_status();

    for line in input.lines() {
        let line = line?;
        match Command::parse(&line) {
            Ok(Some(command)) => {
                if !execute(app, command, out)? {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => writeln!(out, "{message}")?,
        }
        out.flush()?;
    }

    app.stop_camera();
    Ok(())
}
