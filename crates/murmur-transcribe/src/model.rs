//! Whisper model management for the local-whisper feature.
//!
//! Models are fetched from the whisper.cpp collection on Hugging Face into
//! the local data directory on first use.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Available Whisper model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhisperModel {
    /// Tiny model, Q8 quantization (~44 MB)
    Tiny,
    /// Base model, Q8 quantization (~82 MB)
    #[default]
    Base,
    /// Small model, Q8 quantization (~264 MB)
    Small,
    /// Large v3 turbo, Q5 quantization (~574 MB)
    LargeV3Turbo,
}

impl WhisperModel {
    /// Returns the filename for this model.
    pub fn filename(&self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny-q8_0.bin",
            Self::Base => "ggml-base-q8_0.bin",
            Self::Small => "ggml-small-q8_0.bin",
            Self::LargeV3Turbo => "ggml-large-v3-turbo-q5_0.bin",
        }
    }

    /// Returns the download URL for this model.
    pub fn url(&self) -> String {
        format!("{}/{}", MODEL_BASE_URL, self.filename())
    }

    /// Approximate download size, for progress reporting when the server
    /// does not send a content length.
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Tiny => 43_500_000,
            Self::Base => 81_800_000,
            Self::Small => 264_000_000,
            Self::LargeV3Turbo => 574_000_000,
        }
    }

    /// Parses a model name from configuration ("tiny", "base", "small",
    /// "turbo").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "tiny" => Some(Self::Tiny),
            "base" => Some(Self::Base),
            "small" => Some(Self::Small),
            "large-v3-turbo" | "turbo" => Some(Self::LargeV3Turbo),
            _ => None,
        }
    }
}

/// Directory where model files are stored.
pub fn models_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().context("Failed to retrieve local data directory")?;
    Ok(data_dir.join(murmur_core::APP_NAME).join("models"))
}

/// Returns the path where a model should be stored.
pub fn model_path(model: WhisperModel) -> Result<PathBuf> {
    Ok(models_dir()?.join(model.filename()))
}

/// Checks if a model exists locally.
pub fn model_exists(model: WhisperModel) -> Result<bool> {
    Ok(model_path(model)?.exists())
}

/// Downloads a model to the local models directory.
///
/// `progress` is called periodically with (bytes_downloaded, total_bytes).
pub async fn download_model<F>(model: WhisperModel, progress: F) -> Result<PathBuf>
where
    F: Fn(u64, u64) + Send + 'static,
{
    let path = model_path(model)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create models directory: {:?}", parent))?;
    }

    let url = model.url();
    info!(model = ?model, url = %url, "Downloading Whisper model");

    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to start download from {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Failed to download model: HTTP {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(model.size_bytes());

    // Download to a temporary name first so an interrupted download never
    // looks like a usable model.
    let temp_path = path.with_extension("bin.partial");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read chunk during download")?;
        file.write_all(&chunk).context("Failed to write chunk to file")?;
        downloaded += chunk.len() as u64;
        progress(downloaded, total_size);
    }

    file.flush().context("Failed to flush file")?;
    drop(file);

    fs::rename(&temp_path, &path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    info!(path = ?path, "Model download complete");
    Ok(path)
}

/// Ensures a model is available locally, downloading it if necessary.
pub async fn ensure_model<F>(model: WhisperModel, progress: F) -> Result<PathBuf>
where
    F: Fn(u64, u64) + Send + 'static,
{
    if model_exists(model)? {
        return model_path(model);
    }

    warn!(model = ?model, "Model not found locally, downloading");
    download_model(model, progress).await
}
