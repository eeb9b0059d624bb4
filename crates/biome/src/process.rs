//! Context-aware child process execution shared by the local biome and the
//! container runtime client.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::{BiomeError, Context, Sink};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run `command` to completion, streaming its output into `sink`.
///
/// The context is checked before spawning and polled while waiting; once it
/// is done the child is killed and the context error returned.
pub(crate) fn run(
    ctx: &Context,
    mut command: Command,
    stdin: Option<&[u8]>,
    sink: Sink<'_>,
) -> Result<ExitStatus, BiomeError> {
    ctx.check()?;

    let program = command.get_program().to_string_lossy().to_string();
    command.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    match sink {
        Sink::Discard => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        Sink::Inherit => {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        Sink::Combined(_) | Sink::Split { .. } => {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }

    tracing::debug!(command = %command_line(&command), "spawning");
    let mut child = command.spawn().map_err(|source| BiomeError::Spawn {
        program: program.clone(),
        source,
    })?;

    if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let data = data.to_vec();
        thread::spawn(move || {
            // The child may exit without reading everything.
            let _ = pipe.write_all(&data);
        });
    }

    let (tx, rx) = mpsc::channel::<(Stream, Vec<u8>)>();
    if let Some(out) = child.stdout.take() {
        spawn_reader(out, Stream::Stdout, tx.clone());
    }
    if let Some(err) = child.stderr.take() {
        spawn_reader(err, Stream::Stderr, tx.clone());
    }
    drop(tx);

    let mut sink = sink;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((stream, chunk)) => {
                if let Err(err) = write_chunk(&mut sink, stream, &chunk) {
                    kill(&mut child);
                    return Err(err);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = ctx.check() {
                    kill(&mut child);
                    return Err(err);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            return Ok(status);
        }
        if let Err(err) = ctx.check() {
            kill(&mut child);
            return Err(err);
        }
    }
}

/// Like [`run`], but maps a non-zero exit into [`BiomeError::Exit`].
pub(crate) fn run_checked(
    ctx: &Context,
    command: Command,
    stdin: Option<&[u8]>,
    sink: Sink<'_>,
    program: &str,
) -> Result<(), BiomeError> {
    let status = run(ctx, command, stdin, sink)?;
    if status.success() {
        Ok(())
    } else {
        Err(BiomeError::Exit {
            program: program.to_string(),
            code: status.code(),
        })
    }
}

fn spawn_reader<R>(mut reader: R, stream: Stream, tx: mpsc::Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

fn write_chunk(sink: &mut Sink<'_>, stream: Stream, chunk: &[u8]) -> Result<(), BiomeError> {
    match (sink, stream) {
        (Sink::Combined(w), _) => w.write_all(chunk)?,
        (Sink::Split { stdout, .. }, Stream::Stdout) => stdout.write_all(chunk)?,
        (Sink::Split { stderr, .. }, Stream::Stderr) => stderr.write_all(chunk)?,
        (Sink::Discard, _) | (Sink::Inherit, _) => {}
    }
    Ok(())
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn shell_escape(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }
    let escaped = arg.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

/// Render a command line for debug logs.
pub(crate) fn command_line(cmd: &Command) -> String {
    let mut s = String::new();
    s.push_str(&cmd.get_program().to_string_lossy());
    for a in cmd.get_args() {
        s.push(' ');
        let a = a.to_string_lossy();
        if a.is_empty() || a.contains(' ') || a.contains('"') || a.contains('\'') {
            s.push_str(&shell_escape(&a));
        } else {
            s.push_str(&a);
        }
    }
    s
}
