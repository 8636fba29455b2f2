//! Image collaborator used by the controller to load the initial world and
//! write snapshots.
//!
//! [`PgmImageIo`] stores binary PGM (P5) files. Writes go through a single
//! background task so the turn loop never waits on the filesystem; call
//! [`ImageIo::wait_idle`] to flush.

use crate::errors::ImageIoError;
use async_trait::async_trait;
use log::{debug, error, info};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

#[async_trait]
pub trait ImageIo: Send + Sync {
    /// Row-major pixels of image `name`, which must be `width` x `height`.
    async fn load(&self, name: &str, width: usize, height: usize) -> Result<Vec<u8>, ImageIoError>;

    /// Queue a row-major write of `pixels` as image `name`.
    async fn save(
        &self,
        name: &str,
        width: usize,
        height: usize,
        pixels: Vec<u8>,
    ) -> Result<(), ImageIoError>;

    /// Resolves once every previously queued save has been written.
    async fn wait_idle(&self) -> Result<(), ImageIoError>;
}

enum WriterCommand {
    Write {
        path: PathBuf,
        name: String,
        contents: Vec<u8>,
    },
    Flush(oneshot::Sender<()>),
}

pub struct PgmImageIo {
    images_dir: PathBuf,
    output_dir: PathBuf,
    writer: mpsc::Sender<WriterCommand>,
}

impl PgmImageIo {
    /// Must be called from within a tokio runtime; spawns the writer task.
    pub fn new(images_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let (writer, commands) = mpsc::channel(16);
        let output_dir = output_dir.into();
        tokio::spawn(run_writer(output_dir.clone(), commands));
        Self {
            images_dir: images_dir.into(),
            output_dir,
            writer,
        }
    }

    pub fn input_path(&self, name: &str) -> PathBuf {
        self.images_dir.join(format!("{}.pgm", name))
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pgm", name))
    }
}

#[async_trait]
impl ImageIo for PgmImageIo {
    async fn load(&self, name: &str, width: usize, height: usize) -> Result<Vec<u8>, ImageIoError> {
        let path = self.input_path(name);
        info!("📂 Loading {}", path.display());
        let data = tokio::fs::read(&path).await.map_err(|source| ImageIoError::Io {
            name: name.to_string(),
            source,
        })?;
        let image = parse_pgm(name, &data)?;
        if image.width != width || image.height != height {
            return Err(ImageIoError::Format {
                name: name.to_string(),
                reason: format!(
                    "image is {}x{}, expected {}x{}",
                    image.width, image.height, width, height
                ),
            });
        }
        Ok(image.pixels)
    }

    async fn save(
        &self,
        name: &str,
        width: usize,
        height: usize,
        pixels: Vec<u8>,
    ) -> Result<(), ImageIoError> {
        if width.checked_mul(height) != Some(pixels.len()) {
            return Err(ImageIoError::Format {
                name: name.to_string(),
                reason: format!("{} pixels for a {}x{} image", pixels.len(), width, height),
            });
        }
        let command = WriterCommand::Write {
            path: self.output_path(name),
            name: name.to_string(),
            contents: encode_pgm(width, height, &pixels),
        };
        self.writer
            .send(command)
            .await
            .map_err(|_| ImageIoError::WriterStopped)
    }

    async fn wait_idle(&self) -> Result<(), ImageIoError> {
        let (done, flushed) = oneshot::channel();
        self.writer
            .send(WriterCommand::Flush(done))
            .await
            .map_err(|_| ImageIoError::WriterStopped)?;
        flushed.await.map_err(|_| ImageIoError::WriterStopped)
    }
}

async fn run_writer(output_dir: PathBuf, mut commands: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Write {
                path,
                name,
                contents,
            } => {
                if let Err(e) = write_file(&output_dir, &path, &contents).await {
                    error!("❌ Failed to write image {}: {}", name, e);
                } else {
                    debug!("💾 Wrote {}", path.display());
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Image writer stopped");
}

async fn write_file(output_dir: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(output_dir).await?;
    tokio::fs::write(path, contents).await
}

/// A decoded greyscale image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgmImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

pub fn encode_pgm(width: usize, height: usize, pixels: &[u8]) -> Vec<u8> {
    let mut out = format!("P5\n{} {}\n255\n", width, height).into_bytes();
    out.extend_from_slice(pixels);
    out
}

/// Parse a binary PGM with a maxval of at most 255. Header comments are skipped.
pub fn parse_pgm(name: &str, data: &[u8]) -> Result<PgmImage, ImageIoError> {
    let format_error = |reason: &str| ImageIoError::Format {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut pos = 0;
    let magic = next_token(data, &mut pos).ok_or_else(|| format_error("empty file"))?;
    if magic != b"P5" {
        return Err(format_error("not a binary PGM (P5) file"));
    }

    let mut fields = [0usize; 3];
    for (field, label) in fields.iter_mut().zip(["width", "height", "maxval"]) {
        let token = next_token(data, &mut pos)
            .ok_or_else(|| format_error(&format!("missing {}", label)))?;
        *field = std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| format_error(&format!("invalid {}", label)))?;
    }
    let [width, height, maxval] = fields;
    if maxval == 0 || maxval > 255 {
        return Err(format_error("maxval must be between 1 and 255"));
    }

    // Exactly one whitespace byte separates the header from the raster
    pos += 1;
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| format_error("dimensions too large"))?;
    let raster = data.get(pos..).unwrap_or_default();
    if raster.len() < expected {
        return Err(format_error(&format!(
            "raster has {} bytes, expected {}",
            raster.len(),
            expected
        )));
    }
    Ok(PgmImage {
        width,
        height,
        pixels: raster[..expected].to_vec(),
    })
}

fn next_token<'a>(data: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
    loop {
        while *pos < data.len() && data[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < data.len() && data[*pos] == b'#' {
            while *pos < data.len() && data[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < data.len() && !data[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    (start < *pos).then(|| &data[start..*pos])
}
