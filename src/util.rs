use std::env;
use std::io::{Read, Write};
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::{AkariError, AkariResult, CommandSpec};

const JST_OFFSET_SECS: i32 = 9 * 3600;
const STREAM_CAP_BYTES: usize = 64 * 1024;
const WAIT_POLL_MS: u64 = 10;

pub(crate) fn env_required(name: &str) -> AkariResult<String> {
    env_optional(name).ok_or_else(|| AkariError::Config(format!("Missing {name}")))
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> AkariResult<u64> {
    match env_optional(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| AkariError::Config(format!("Invalid {name}"))),
        None => Ok(default),
    }
}

pub(crate) fn env_f64(name: &str, default: f64) -> AkariResult<f64> {
    match env_optional(name) {
        Some(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|_| AkariError::Config(format!("Invalid {name}"))),
        None => Ok(default),
    }
}

pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Japan Standard Time. Every user-facing timestamp is rendered in it.
pub(crate) fn jst() -> FixedOffset {
    FixedOffset::east_opt(JST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

pub(crate) fn now_jst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&jst())
}

/// Expands a configured command into argv. String commands run through the
/// shell, and arguments appended later still reach the program via `"$@"`.
pub(crate) fn command_spec_to_vec(spec: &CommandSpec) -> Vec<String> {
    match spec {
        CommandSpec::Array(items) => items.clone(),
        CommandSpec::String(cmd) => {
            if cfg!(windows) {
                vec!["cmd".to_string(), "/C".to_string(), cmd.clone()]
            } else {
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("{cmd} \"$@\""),
                    "sh".to_string(),
                ]
            }
        }
    }
}

/// Builds a command from `base` (program plus fixed args) followed by `extra`.
///
/// The child leads its own process group so the whole tree can be torn down.
pub(crate) fn build_external_command(base: &[String], extra: &[String]) -> AkariResult<ProcessCommand> {
    let Some((program, fixed)) = base.split_first() else {
        return Err(AkariError::Config("empty command".to_string()));
    };
    let mut cmd = ProcessCommand::new(program);
    cmd.args(fixed).args(extra);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    Ok(cmd)
}

/// Kill a child process and its entire process group.
/// On Unix, sends SIGTERM first, then SIGKILL after 2 seconds.
#[cfg(unix)]
pub(crate) fn kill_process_tree(child: &mut std::process::Child) {
    let pid = child.id() as i32;
    unsafe {
        libc::kill(-pid, libc::SIGTERM);
    }
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => unsafe {
            libc::killpg(pid, libc::SIGKILL);
        },
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
pub(crate) fn kill_process_tree(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_capped_reader<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut captured: Vec<u8> = Vec::new();
        let mut buffer = [0_u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let take = STREAM_CAP_BYTES.saturating_sub(captured.len()).min(n);
                    captured.extend_from_slice(&buffer[..take]);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        captured
    })
}

/// Output of a finished helper process.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub(crate) success: bool,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Runs `base + extra`, optionally feeding `stdin`, and waits up to
/// `timeout`. Output streams are capped at 64 KiB each.
pub(crate) fn run_command_capture(
    base: &[String],
    extra: &[String],
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> AkariResult<CommandOutput> {
    let mut cmd = build_external_command(base, extra)?;
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| AkariError::Process(format!("{}: spawn failed: {e}", base[0])))?;
    if let (Some(payload), Some(mut pipe)) = (stdin, child.stdin.take()) {
        if let Err(e) = pipe.write_all(payload).and_then(|_| pipe.flush()) {
            drop(pipe);
            kill_process_tree(&mut child);
            return Err(AkariError::Process(format!("write stdin: {e}")));
        }
    }

    let stdout_handle = child.stdout.take().map(spawn_capped_reader);
    let stderr_handle = child.stderr.take().map(spawn_capped_reader);

    let start = Instant::now();
    let status = loop {
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                kill_process_tree(&mut child);
                return Err(AkariError::Process(format!(
                    "{} timed out after {}s",
                    base[0],
                    limit.as_secs()
                )));
            }
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(Duration::from_millis(WAIT_POLL_MS)),
            Err(e) => {
                kill_process_tree(&mut child);
                return Err(AkariError::Process(format!("wait failed: {e}")));
            }
        }
    };

    let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
        handle
            .and_then(|join| join.join().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    };
    Ok(CommandOutput {
        success: status.success(),
        stdout: collect(stdout_handle),
        stderr: collect(stderr_handle),
    })
}

pub(crate) fn split_text_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        if count >= max_chars {
            chunks.push(current);
            current = String::new();
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_char_boundaries() {
        let text = "あ".repeat(4500);
        let chunks = split_text_chunks(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[2].chars().count(), 500);
    }

    #[test]
    fn empty_text_yields_single_empty_chunk() {
        assert_eq!(split_text_chunks("", 2000), vec![String::new()]);
    }

    #[cfg(unix)]
    #[test]
    fn string_commands_forward_extra_args() {
        let base = command_spec_to_vec(&CommandSpec::String("printf '[%s]'".to_string()));
        let extra = vec!["1.15".to_string(), "こんにちは".to_string()];
        let out = run_command_capture(&base, &extra, None, Some(Duration::from_secs(5))).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "[1.15][こんにちは]");
    }

    #[cfg(unix)]
    #[test]
    fn string_commands_without_extra_args_run_as_written() {
        let base = command_spec_to_vec(&CommandSpec::String("echo hi".to_string()));
        let out = run_command_capture(&base, &[], None, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(out.stdout, "hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn failed_stdin_write_reaps_the_child() {
        let pid_file = std::env::temp_dir().join(format!("akari-epipe-{}.pid", std::process::id()));
        // closes stdin before reading, so a large payload hits a broken pipe
        let script = format!("echo $$ > '{}'; exec sleep 30 <&-", pid_file.display());
        let base = vec!["sh".to_string(), "-c".to_string(), script];
        let payload = vec![b'x'; 1 << 20];
        let err = run_command_capture(&base, &[], Some(&payload), Some(Duration::from_secs(20))).unwrap_err();
        assert!(err.to_string().contains("write stdin"));

        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "helper {pid} still running");
        let _ = std::fs::remove_file(&pid_file);
    }

    #[cfg(unix)]
    #[test]
    fn slow_commands_time_out() {
        let base = vec!["sleep".to_string(), "5".to_string()];
        let err = run_command_capture(&base, &[], None, Some(Duration::from_millis(100))).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn jst_is_nine_hours_ahead() {
        assert_eq!(jst().local_minus_utc(), 9 * 3600);
    }
}
