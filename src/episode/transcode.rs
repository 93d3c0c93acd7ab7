use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::FetchError;

/// How the downloaded source audio is re-encoded
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// ffmpeg binary name or path
    pub ffmpeg: String,
    /// Target bitrate, e.g. "128k"
    pub bitrate: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            bitrate: "128k".to_string(),
        }
    }
}

impl TranscodeOptions {
    fn args(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = ["-nostdin", "-y", "-loglevel", "error", "-i"]
            .into_iter()
            .map(Into::into)
            .collect();
        args.push(input.as_os_str().to_owned());
        // The output has a temporary name, so the container must be explicit
        for arg in ["-vn", "-ab", self.bitrate.as_str(), "-ar", "44100", "-f", "mp3"] {
            args.push(arg.into());
        }
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Re-encode `input` as MP3 into `output`
pub async fn transcode_to_mp3(
    options: &TranscodeOptions,
    input: &Path,
    output: &Path,
) -> Result<(), FetchError> {
    let result = Command::new(&options.ffmpeg)
        .args(options.args(input, output))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| FetchError::SpawnFailed {
            program: options.ffmpeg.clone(),
            source: e,
        })?;

    if !result.status.success() {
        return Err(FetchError::TranscodeFailed {
            path: input.to_path_buf(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn args_force_mp3_container_and_bitrate() {
        let options = TranscodeOptions {
            ffmpeg: "ffmpeg".to_string(),
            bitrate: "96k".to_string(),
        };
        let args: Vec<String> = options
            .args(&PathBuf::from("/in.m4a"), &PathBuf::from("/out.mp3.partial"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "-nostdin", "-y", "-loglevel", "error", "-i", "/in.m4a", "-vn", "-ab", "96k",
                "-ar", "44100", "-f", "mp3", "/out.mp3.partial",
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let options = TranscodeOptions {
            ffmpeg: "/nonexistent/ffmpeg-binary".to_string(),
            ..Default::default()
        };
        let result =
            transcode_to_mp3(&options, Path::new("/tmp/in"), Path::new("/tmp/out")).await;
        assert!(matches!(result, Err(FetchError::SpawnFailed { .. })));
    }
}
