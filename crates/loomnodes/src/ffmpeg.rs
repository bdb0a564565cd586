use crate::source::MediaSource;
use crate::NodesConfig;
use async_trait::async_trait;
use chrono::Utc;
use loomcore::{CropJob, FrameJob, MediaBackend, MediaInfo, NodeError, OutputTarget};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Directory under the media root that receives produced files; also the
/// URL prefix of the references handed back.
pub const PROCESSED_DIR: &str = "processed";

const STDERR_TAIL_LINES: usize = 5;

/// Media backend shelling out to ffprobe and ffmpeg
pub struct FfmpegMediaBackend {
    media_root: PathBuf,
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegMediaBackend {
    pub fn new(config: &NodesConfig) -> Self {
        Self {
            media_root: config.media_root.clone(),
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
        }
    }

    /// Path to write and public reference for a new output file.
    async fn output_file(&self, target: &OutputTarget, kind: &str) -> Result<(PathBuf, String), NodeError> {
        let dir = self.media_root.join(PROCESSED_DIR);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            NodeError::MediaProcessing(format!("Cannot create {}: {}", dir.display(), e))
        })?;

        let file_name = output_file_name(target, kind, Utc::now().timestamp_millis());
        let reference = format!("/{}/{}", PROCESSED_DIR, file_name);
        Ok((dir.join(file_name), reference))
    }
}

/// `<node>-<run>-<kind>-<millis>.jpg`, with the node id reduced to
/// characters safe in a file name.
pub fn output_file_name(target: &OutputTarget, kind: &str, millis: i64) -> String {
    let node: String = target
        .node_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}-{}-{}.jpg", node, target.run_id, kind, millis)
}

/// Seconds as an ffmpeg seek position.
pub fn seek_arg(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

async fn run_tool(program: &str, args: &[String]) -> Result<Vec<u8>, NodeError> {
    tracing::debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| NodeError::MediaProcessing(format!("Failed to spawn {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NodeError::MediaProcessing(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr_tail(&stderr)
        )));
    }

    Ok(output.stdout)
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ")
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output into dimensions and duration.
pub fn parse_probe(stdout: &[u8]) -> Result<MediaInfo, NodeError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| NodeError::MediaProcessing(format!("Unreadable ffprobe output: {}", e)))?;

    let (width, height) = probe
        .streams
        .iter()
        .find_map(|s| Some((s.width?, s.height?)))
        .ok_or_else(|| NodeError::MediaProcessing("No video stream with dimensions".to_string()))?;

    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    Ok(MediaInfo {
        width,
        height,
        duration_secs,
    })
}

#[async_trait]
impl MediaBackend for FfmpegMediaBackend {
    async fn probe(&self, source: &str) -> Result<MediaInfo, NodeError> {
        let source = MediaSource::locate(&self.media_root, source).await?;
        let args = [
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height:format=duration",
            "-of", "json",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(source.as_arg()))
        .collect::<Vec<_>>();

        let stdout = run_tool(&self.ffprobe, &args).await?;
        parse_probe(&stdout)
    }

    async fn crop(&self, job: CropJob) -> Result<String, NodeError> {
        let rect = job.rect;
        if rect.width == 0 || rect.height == 0 {
            return Err(NodeError::MediaProcessing(format!(
                "Crop region {}x{} is empty",
                rect.width, rect.height
            )));
        }

        let source = MediaSource::locate(&self.media_root, &job.source).await?;
        let (path, reference) = self.output_file(&job.target, "crop").await?;

        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.as_arg(),
            "-vf".to_string(),
            format!("crop={}:{}:{}:{}", rect.width, rect.height, rect.x, rect.y),
            "-frames:v".to_string(),
            "1".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        run_tool(&self.ffmpeg, &args).await?;

        Ok(reference)
    }

    async fn extract_frame(&self, job: FrameJob) -> Result<String, NodeError> {
        let source = MediaSource::locate(&self.media_root, &job.source).await?;
        let (path, reference) = self.output_file(&job.target, "frame").await?;

        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            seek_arg(job.at_seconds),
            "-i".to_string(),
            source.as_arg(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!("scale={}:-2", job.width),
            path.to_string_lossy().into_owned(),
        ];
        run_tool(&self.ffmpeg, &args).await?;

        Ok(reference)
    }
}
