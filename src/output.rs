//! Per-tick frame output into one file shared by every rank.
//!
//! Each frame is one text line per boid: `tick id x y vx vy`. Ranks encode
//! their own lines, agree on byte offsets with a scan and a reduction, and
//! write their slice of the frame at that offset. Within a frame the slices
//! appear in rank order.

use crate::boid::Boid;
use crate::comm::{Communicator, ROOT};
use crate::error::{OutputError, Result};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sink for per-tick snapshots of the local state.
///
/// Collective: every rank calls `write_frame` once per tick, even with no
/// boids.
pub trait FrameWriter {
    fn write_frame(&mut self, comm: &dyn Communicator, tick: u64, boids: &[Boid]) -> Result<()>;
}

/// Discards every frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullWriter;

impl FrameWriter for NullWriter {
    fn write_frame(
        &mut self,
        _comm: &dyn Communicator,
        _tick: u64,
        _boids: &[Boid],
    ) -> Result<()> {
        Ok(())
    }
}

/// Encode one frame's worth of lines for `boids`.
pub fn encode_frame(tick: u64, boids: &[Boid]) -> String {
    let mut out = String::with_capacity(boids.len() * 64);
    for b in boids {
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{} {} {:.9} {:.9} {:.9} {:.9}",
            tick, b.id, b.position.x, b.position.y, b.velocity.x, b.velocity.y
        );
    }
    out
}

/// Writes frames into one file that every rank opened independently.
pub struct SharedFileWriter {
    path: PathBuf,
    file: File,
    frame_start: u64,
}

impl SharedFileWriter {
    /// Open the shared file on every rank. The root truncates it first.
    ///
    /// Collective.
    pub fn create(comm: &dyn Communicator, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| OutputError::Io {
            path: path.clone(),
            source,
        };

        if comm.rank() == ROOT {
            File::create(&path).map_err(io_err)?;
        }
        comm.barrier()?;

        let file = OpenOptions::new().write(true).open(&path).map_err(io_err)?;
        debug!(path = %path.display(), "opened frame output");
        Ok(Self {
            path,
            file,
            frame_start: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the file by all ranks so far.
    pub fn bytes_written(&self) -> u64 {
        self.frame_start
    }
}

impl FrameWriter for SharedFileWriter {
    fn write_frame(&mut self, comm: &dyn Communicator, tick: u64, boids: &[Boid]) -> Result<()> {
        let lines = encode_frame(tick, boids);
        let len = lines.len() as u64;
        let offset = comm.exclusive_scan_u64(len)?;
        let frame_len = comm.all_reduce_sum_u64(len)?;

        if len > 0 {
            let io_err = |source| OutputError::Io {
                path: self.path.clone(),
                source,
            };
            self.file
                .seek(SeekFrom::Start(self.frame_start + offset))
                .map_err(io_err)?;
            self.file.write_all(lines.as_bytes()).map_err(io_err)?;
        }
        self.frame_start += frame_len;
        Ok(())
    }
}

impl std::fmt::Debug for SharedFileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFileWriter")
            .field("path", &self.path)
            .field("frame_start", &self.frame_start)
            .finish()
    }
}
