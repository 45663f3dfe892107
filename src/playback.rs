use std::path::Path;
use std::process::{Child, Stdio};

use crate::{build_external_command, kill_process_tree, AkariError, AkariResult};

/// Audio sink for the synthesized WAV.
pub(crate) trait VoicePlayer {
    fn play(&mut self, path: &Path) -> AkariResult<()>;
    fn is_playing(&mut self) -> bool;
    fn stop(&mut self);
}

/// Plays files through an external player process. "Playing" means the last
/// spawned player has not exited yet.
pub(crate) struct ProcessPlayer {
    command: Vec<String>,
    current: Option<Child>,
}

impl ProcessPlayer {
    pub(crate) fn new(command: Vec<String>) -> Self {
        Self {
            command,
            current: None,
        }
    }
}

impl VoicePlayer for ProcessPlayer {
    fn play(&mut self, path: &Path) -> AkariResult<()> {
        if !path.exists() {
            return Err(AkariError::Audio(format!("{} not found", path.display())));
        }
        // one player at a time; an untracked child could never be stopped
        self.stop();
        let mut cmd = build_external_command(&self.command, &[path.display().to_string()])?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd
            .spawn()
            .map_err(|e| AkariError::Audio(format!("player spawn failed: {e}")))?;
        tracing::debug!(pid = child.id(), file = %path.display(), "playback started");
        self.current = Some(child);
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        let Some(child) = self.current.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.current = None;
                false
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.current.take() {
            kill_process_tree(&mut child);
        }
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn tracks_player_lifetime() {
        let wav = std::env::temp_dir().join(format!("akari-play-{}.wav", std::process::id()));
        std::fs::write(&wav, b"RIFF").unwrap();
        let mut player =
            ProcessPlayer::new(vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()]);
        assert!(!player.is_playing());
        player.play(&wav).unwrap();
        assert!(player.is_playing());
        player.stop();
        assert!(!player.is_playing());
        let _ = std::fs::remove_file(&wav);
    }

    #[test]
    fn replaying_stops_the_previous_player() {
        let wav = std::env::temp_dir().join(format!("akari-replay-{}.wav", std::process::id()));
        std::fs::write(&wav, b"RIFF").unwrap();
        let mut player =
            ProcessPlayer::new(vec!["sh".to_string(), "-c".to_string(), "sleep 5".to_string()]);
        player.play(&wav).unwrap();
        let first_pid = player.current.as_ref().map(|c| c.id() as i32).unwrap();
        player.play(&wav).unwrap();
        player.stop();
        let first_alive = unsafe { libc::kill(first_pid, 0) } == 0;
        assert!(!first_alive, "first player {first_pid} survived stop()");
        let _ = std::fs::remove_file(&wav);
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut player = ProcessPlayer::new(vec!["true".to_string()]);
        assert!(player.play(Path::new("/nonexistent/akari.wav")).is_err());
    }
}
