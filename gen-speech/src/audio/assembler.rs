//! Ordered reassembly of per-chunk audio using FFmpeg's concat demuxer.

use crate::dispatch::SynthesisResult;
use crate::error::{GenSpeechError, Result};
use crate::job::remove_if_present;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Something that joins the files listed in a concat manifest into one file.
pub trait ConcatTool {
    fn concat(&self, manifest: &Path, output_path: &Path) -> Result<()>;
}

/// Lossless stream-copy concatenation with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegConcat {
    program: PathBuf,
}

impl Default for FfmpegConcat {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegConcat {
    /// Use a specific ffmpeg executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, manifest: &Path, output_path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(manifest)
            .args(["-codec", "copy"])
            .arg(output_path);
        cmd
    }

    /// Check if ffmpeg can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl ConcatTool for FfmpegConcat {
    fn concat(&self, manifest: &Path, output_path: &Path) -> Result<()> {
        let mut cmd = self.command(manifest, output_path);
        log::debug!("ffmpeg_cmd={:?}", cmd);

        let output = cmd.output().map_err(|e| GenSpeechError::Concatenation {
            status: "not started".to_string(),
            stderr: format!("Failed to run {}: {}", self.program.display(), e),
        })?;

        if !output.status.success() {
            return Err(GenSpeechError::Concatenation {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Build concat manifest contents, one `file '<path>'` line per input.
pub fn manifest_contents(audio_files: &[&Path]) -> String {
    let mut list_content = String::new();
    for path in audio_files {
        // Escape single quotes in path
        let path_str = path.to_string_lossy().replace('\'', "'\\''");
        list_content.push_str(&format!("file '{}'\n", path_str));
    }
    list_content
}

/// Concatenate per-chunk audio into `output_path` in chunk order.
///
/// Results are sorted by chunk index before the manifest is written. Unless
/// `keep_intermediates` is set, the part files and the manifest are removed
/// after the concatenation attempt, whether or not it succeeded.
pub fn reassemble(
    mut results: Vec<SynthesisResult>,
    manifest_path: &Path,
    output_path: &Path,
    keep_intermediates: bool,
    tool: &dyn ConcatTool,
) -> Result<PathBuf> {
    if results.is_empty() {
        return Err(GenSpeechError::Config(
            "no audio segments to reassemble".to_string(),
        ));
    }

    results.sort_by_key(|r| r.chunk_index);
    let audio_files: Vec<&Path> = results.iter().map(|r| r.audio_path.as_path()).collect();

    let outcome = std::fs::write(manifest_path, manifest_contents(&audio_files))
        .map_err(GenSpeechError::from)
        .and_then(|()| tool.concat(manifest_path, output_path));

    if keep_intermediates {
        log::info!(
            "keeping {} intermediate files and {}",
            audio_files.len(),
            manifest_path.display()
        );
    } else {
        let removed = audio_files
            .iter()
            .chain(std::iter::once(&manifest_path))
            .filter(|path| remove_if_present(path))
            .count();
        log::debug!("removed {} intermediate files", removed);
    }

    outcome.map(|()| output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Joins the manifest's files byte for byte, like a stream copy would.
    struct ByteConcat;

    impl ConcatTool for ByteConcat {
        fn concat(&self, manifest: &Path, output_path: &Path) -> Result<()> {
            let mut joined = Vec::new();
            for line in fs::read_to_string(manifest)?.lines() {
                let path = line
                    .strip_prefix("file '")
                    .and_then(|rest| rest.strip_suffix('\''))
                    .unwrap()
                    .replace("'\\''", "'");
                joined.extend(fs::read(path)?);
            }
            fs::write(output_path, joined)?;
            Ok(())
        }
    }

    struct FailingConcat;

    impl ConcatTool for FailingConcat {
        fn concat(&self, manifest: &Path, _output_path: &Path) -> Result<()> {
            assert!(manifest.exists());
            Err(GenSpeechError::Concatenation {
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            })
        }
    }

    fn write_parts(dir: &Path, contents: &[&str]) -> Vec<SynthesisResult> {
        contents
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let audio_path = dir.join(format!("part {i}.mp3"));
                fs::write(&audio_path, body).unwrap();
                SynthesisResult {
                    chunk_index: i,
                    audio_path,
                }
            })
            .collect()
    }

    #[test]
    fn test_manifest_contents() {
        let a = Path::new("/tmp/doc part 0 abc.m4a");
        let b = Path::new("/tmp/it's part 1 abc.m4a");
        assert_eq!(
            manifest_contents(&[a, b]),
            "file '/tmp/doc part 0 abc.m4a'\nfile '/tmp/it'\\''s part 1 abc.m4a'\n"
        );
    }

    #[test]
    fn test_ffmpeg_command_args() {
        let tool = FfmpegConcat::default();
        let cmd = tool.command(Path::new("list.txt"), Path::new("out.m4a"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "ffmpeg");
        assert_eq!(
            args,
            vec!["-y", "-f", "concat", "-safe", "0", "-i", "list.txt", "-codec", "copy", "out.m4a"]
        );
    }

    #[test]
    fn test_reassemble_orders_by_chunk_index() {
        let temp_dir = TempDir::new().unwrap();
        let mut results = write_parts(temp_dir.path(), &["one", "two", "three"]);
        results.reverse();
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");

        let path = reassemble(results, &manifest, &output, false, &ByteConcat).unwrap();

        assert_eq!(path, output);
        assert_eq!(fs::read_to_string(&output).unwrap(), "onetwothree");
    }

    #[test]
    fn test_cleanup_after_success() {
        let temp_dir = TempDir::new().unwrap();
        let results = write_parts(temp_dir.path(), &["a", "b"]);
        let parts: Vec<PathBuf> = results.iter().map(|r| r.audio_path.clone()).collect();
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");

        reassemble(results, &manifest, &output, false, &ByteConcat).unwrap();

        assert!(parts.iter().all(|p| !p.exists()));
        assert!(!manifest.exists());
        assert!(output.exists());
    }

    #[test]
    fn test_cleanup_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let results = write_parts(temp_dir.path(), &["a", "b", "c"]);
        let parts: Vec<PathBuf> = results.iter().map(|r| r.audio_path.clone()).collect();
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");

        let err = reassemble(results, &manifest, &output, false, &FailingConcat).unwrap_err();

        assert!(matches!(err, GenSpeechError::Concatenation { .. }));
        assert!(parts.iter().all(|p| !p.exists()));
        assert!(!manifest.exists());
    }

    #[test]
    fn test_keep_intermediates() {
        let temp_dir = TempDir::new().unwrap();
        let results = write_parts(temp_dir.path(), &["a", "b"]);
        let parts: Vec<PathBuf> = results.iter().map(|r| r.audio_path.clone()).collect();
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");

        reassemble(results.clone(), &manifest, &output, true, &ByteConcat).unwrap();
        assert!(parts.iter().all(|p| p.exists()));
        assert!(manifest.exists());

        let err = reassemble(results, &manifest, &output, true, &FailingConcat);
        assert!(err.is_err());
        assert!(parts.iter().all(|p| p.exists()));
        assert!(manifest.exists());
    }

    #[test]
    fn test_missing_ffmpeg_is_concatenation_error() {
        let temp_dir = TempDir::new().unwrap();
        let results = write_parts(temp_dir.path(), &["a"]);
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");
        let tool = FfmpegConcat::with_program(temp_dir.path().join("no-such-ffmpeg"));

        assert!(!tool.is_available());
        let err = reassemble(results, &manifest, &output, false, &tool).unwrap_err();
        assert!(matches!(err, GenSpeechError::Concatenation { .. }));
        assert!(!manifest.exists());
    }

    #[test]
    fn test_empty_results_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = temp_dir.path().join("list.txt");
        let output = temp_dir.path().join("out.mp3");
        let err = reassemble(Vec::new(), &manifest, &output, false, &ByteConcat).unwrap_err();
        assert!(matches!(err, GenSpeechError::Config(_)));
    }
}
