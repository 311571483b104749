//! Summary: TCP server and per-session command loop.
//! Copyright (c) Meridian. All rights reserved.
//!
//! Commands are terminated by `;`; the runes `\n`, `\r`, and `;` are
//! consumed but never part of the command body. Every command produces
//! exactly one response line: a short success summary or the error string.

use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::command::{self, Command};
use crate::engine::Engine;
use crate::error::Result;

/// Sleep taken by the `hang` diagnostic, long enough to observe how other
/// sessions behave while one session's thread is blocked.
const HANG_DURATION: Duration = Duration::from_secs(5);

/// Binds `addr` and serves sessions until the process exits. Each session
/// runs on its own thread against the shared engine.
pub fn serve(engine: Arc<Engine>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!("listening on {addr}");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || session(&engine, stream));
            }
            Err(err) => warn!("failed to accept connection: {err}"),
        }
    }
    Ok(())
}

fn session(engine: &Engine, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    debug!("session started for {peer}");
    if let Err(err) = session_loop(engine, stream) {
        debug!("session for {peer} ended: {err}");
    } else {
        debug!("session for {peer} closed");
    }
}

fn session_loop(engine: &Engine, mut stream: TcpStream) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut body: Vec<u8> = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 {
            // Client disconnected. An in-flight command has already run to
            // completion; its result is simply discarded.
            return Ok(());
        }
        match byte[0] {
            b';' => {
                let text = String::from_utf8_lossy(&body).into_owned();
                let response = dispatch(engine, &text);
                stream.write_all(response.as_bytes())?;
                stream.write_all(b"\n")?;
                body.clear();
            }
            b'\n' | b'\r' => {}
            other => body.push(other),
        }
    }
}

fn dispatch(engine: &Engine, input: &str) -> String {
    match command::parse(input).and_then(|cmd| execute(engine, cmd)) {
        Ok(response) => response,
        Err(err) => format!("error: {err}"),
    }
}

fn execute(engine: &Engine, command: Command) -> Result<String> {
    match command {
        Command::Add {
            name,
            latitude,
            longitude,
        } => {
            let location = engine.add(&name, latitude, longitude)?;
            Ok(format!("added {name} at offset {}", location.offset))
        }
        Command::Intersect {
            latitude,
            longitude,
            width,
            height,
        } => {
            let points = engine.intersect(latitude, longitude, width, height)?;
            if points.is_empty() {
                Ok("no matches".to_string())
            } else {
                let rendered: Vec<String> = points.iter().map(ToString::to_string).collect();
                Ok(rendered.join("; "))
            }
        }
        Command::Update { offset, changes } => {
            let point = engine.update(offset, &changes)?;
            Ok(format!("updated {point}"))
        }
        Command::Delete { offset } => {
            let point = engine.delete(offset)?;
            Ok(format!("deleted {point}"))
        }
        Command::Save => {
            engine.save()?;
            Ok("saved".to_string())
        }
        Command::Load => {
            engine.load()?;
            Ok("loaded".to_string())
        }
        Command::Print => engine.dump_index(),
        Command::Hang => {
            thread::sleep(HANG_DURATION);
            Ok("resumed".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dispatch_renders_success_and_error_lines() {
        let dir = TempDir::new().expect("tempdir");
        let engine = Engine::open(dir.path()).expect("open");

        let response = dispatch(&engine, "add pier 10 20");
        assert_eq!(response, "added pier at offset 0");

        let response = dispatch(&engine, "intersect 9 19 2 2");
        assert_eq!(response, "pier, 10.00, 20.00");

        let response = dispatch(&engine, "add A notanumber 20");
        assert!(response.starts_with("error: bad argument"));

        let response = dispatch(&engine, "delete 9999");
        assert_eq!(response, "error: no record at offset 9999");
    }

    #[test]
    fn test_dispatch_intersect_without_matches() {
        let dir = TempDir::new().expect("tempdir");
        let engine = Engine::open(dir.path()).expect("open");
        assert_eq!(dispatch(&engine, "intersect 0 0 1 1"), "no matches");
    }
}
