use std::fs::File;
use std::io::BufRead;
use std::path::PathBuf;

use pianotutor_core::config::Config;
use pianotutor_core::midi::{MidiEventKind, MidiInputManager};
use pianotutor_core::{KeyMatch, Tutor, TutorError, TutorResult};

/// All Notes Off
const CC_ALL_NOTES_OFF: u8 = 123;

const USAGE: &str = "usage: pianotutor-bridge [--device PATH] [--config FILE] [--verbose] \
[--list-ports] [--mirror N] [--performer N] [--lit-until-release]";

fn init_logging(verbose: bool) {
    use simplelog::{
        ColorChoice, CombinedLogger, LevelFilter, SharedLogger, TermLogger, TerminalMode,
        WriteLogger,
    };

    let file_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let term_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pianotutor")
        .join("pianotutor.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).or_else(|_| File::create("/tmp/pianotutor.log"));

    let term: Box<dyn SharedLogger> = TermLogger::new(
        term_level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
    let result = match log_file {
        Ok(file) => CombinedLogger::init(vec![
            term,
            WriteLogger::new(file_level, simplelog::Config::default(), file),
        ]),
        Err(_) => CombinedLogger::init(vec![term]),
    };
    if let Err(e) = result {
        eprintln!("logger already initialised: {}", e);
    }

    log::info!("pianotutor-bridge starting (log level: {:?})", file_level);
}

struct Args {
    device: Option<String>,
    config: Option<PathBuf>,
    verbose: bool,
    list_ports: bool,
    mirror: Option<usize>,
    performer: Option<usize>,
    lit_until_release: bool,
}

fn parse_args(args: &[String]) -> TutorResult<Args> {
    let value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .map(|i| args.get(i + 1).cloned())
    };
    let port = |flag: &str| -> TutorResult<Option<usize>> {
        match value(flag) {
            None => Ok(None),
            Some(Some(n)) => n.parse().map(Some).map_err(|_| {
                TutorError::Config(format!("{} expects a port number, got {}", flag, n))
            }),
            Some(None) => Err(TutorError::Config(format!("{} expects a port number", flag))),
        }
    };
    let path = |flag: &str| -> TutorResult<Option<String>> {
        match value(flag) {
            None => Ok(None),
            Some(Some(p)) => Ok(Some(p)),
            Some(None) => Err(TutorError::Config(format!("{} expects a path", flag))),
        }
    };

    Ok(Args {
        device: path("--device")?,
        config: path("--config")?.map(PathBuf::from),
        verbose: args.iter().any(|a| a == "--verbose" || a == "-v"),
        list_ports: args.iter().any(|a| a == "--list-ports"),
        mirror: port("--mirror")?,
        performer: port("--performer")?,
        lit_until_release: args.iter().any(|a| a == "--lit-until-release"),
    })
}

fn list_ports() -> TutorResult<()> {
    let ports = MidiInputManager::list_ports()?;
    if ports.is_empty() {
        println!("no MIDI input ports");
    }
    for port in ports {
        println!("{}: {}", port.index, port.name);
    }
    Ok(())
}

/// Light whatever the port plays, as score playback would.
fn connect_mirror(port: usize, tutor: &Tutor) -> TutorResult<MidiInputManager> {
    let tutor = tutor.clone();
    let mut manager = MidiInputManager::new();
    manager.connect(port, move |event| {
        match event.kind {
            MidiEventKind::NoteOn {
                channel,
                note,
                velocity,
            } => tutor.add_key(note, velocity, Some(u32::from(channel)), 0),
            MidiEventKind::NoteOff { note, .. } => tutor.clear_key(note, false),
            MidiEventKind::ControlChange {
                channel,
                controller: CC_ALL_NOTES_OFF,
                ..
            } => tutor.clear_all_keys(Some(u32::from(channel))),
            MidiEventKind::ControlChange { .. } => return,
        }
        tutor.flush();
    })?;
    Ok(manager)
}

/// Report what the performer plays against the lit keys.
fn connect_performer(port: usize, tutor: &Tutor) -> TutorResult<MidiInputManager> {
    let tutor = tutor.clone();
    let mut manager = MidiInputManager::new();
    manager.connect(port, move |event| {
        if let MidiEventKind::NoteOn { note, velocity, .. } = event.kind {
            match tutor.key_pressed(note, velocity) {
                KeyMatch::Active => log::debug!("hit {}", note),
                KeyMatch::Preview(future) => log::info!("skipped ahead {} to {}", future, note),
                KeyMatch::NoMatch => log::debug!("miss {}", note),
            }
        }
    })?;
    Ok(manager)
}

fn run(args: Args) -> TutorResult<()> {
    if args.list_ports {
        return list_ports();
    }

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    let mut settings = config.to_settings();
    if let Some(device) = args.device {
        settings.serial_device = device;
    }
    if args.lit_until_release {
        settings.lit_until_release = true;
    }

    let tutor = Tutor::serial(&settings)?;
    log::info!("driving {}", tutor.serial_device());

    let _mirror = args
        .mirror
        .map(|port| connect_mirror(port, &tutor))
        .transpose()?;
    let _performer = args
        .performer
        .map(|port| connect_performer(port, &tutor))
        .transpose()?;

    for line in std::io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
    }

    log::info!("stdin closed, clearing strip");
    tutor.clear_all_keys(None);
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return;
    }
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    init_logging(parsed.verbose);

    if let Err(e) = run(parsed) {
        log::error!("{}", e);
        eprintln!("pianotutor-bridge: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pianotutor-bridge")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let parsed = parse_args(&args(&[
            "--device",
            "/dev/ttyUSB0",
            "--mirror",
            "1",
            "--performer",
            "0",
            "--lit-until-release",
            "-v",
        ]))
        .unwrap();
        assert_eq!(parsed.device.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(parsed.mirror, Some(1));
        assert_eq!(parsed.performer, Some(0));
        assert!(parsed.lit_until_release);
        assert!(parsed.verbose);
        assert!(!parsed.list_ports);
        assert!(parsed.config.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(parse_args(&args(&["--mirror", "left"])).is_err());
        assert!(parse_args(&args(&["--performer"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
    }
}
