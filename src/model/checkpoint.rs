//! Checkpoint file: typed header followed by the flat tensor record stream.
//!
//! ```text
//! b"MGPT" | u32 version | u32 vocab_size | u32 n_embed | u32 n_hidden | u32 n_layer | u32 n_head
//! tensor records in Module::parameters order:
//!   embedding table
//!   per block: ln1 (gamma, beta), ln2 (gamma, beta),
//!              attention (Wq, bq, Wk, bk, Wv, bv, Wo, bo), feed forward (W1, b1, W2, b2)
//!   head (W, b)
//! ```
//!
//! All integers and floats are little-endian. Each record is the `Tensor` layout
//! `[i32 rows][i32 cols][values]`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand::{rngs::StdRng, SeedableRng};
use tracing::debug;

use super::{CheckpointError, Model, ModelDims};
use crate::config::ConfigError;
use crate::nn::Module;
use crate::tensor::Tensor;

pub const MAGIC: [u8; 4] = *b"MGPT";
pub const FORMAT_VERSION: u32 = 1;

fn write_u32<W: Write>(w: &mut W, v: usize) -> io::Result<()> {
    let v = u32::try_from(v).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("dimension {v} does not fit in a u32 header field"),
        )
    })?;
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_header<W: Write>(w: &mut W, dims: &ModelDims) -> io::Result<()> {
    w.write_all(&MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    for v in [
        dims.vocab_size,
        dims.n_embed,
        dims.n_hidden,
        dims.n_layer,
        dims.n_head,
    ] {
        write_u32(w, v)?;
    }
    Ok(())
}

/// Reads and checks magic and version, returning the stored architecture.
pub fn read_header<R: Read>(r: &mut R) -> Result<ModelDims, CheckpointError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(CheckpointError::BadMagic(magic));
    }
    let version = read_u32(r)?;
    if version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion(version));
    }
    let mut field = || read_u32(r).map(|v| v as usize);
    Ok(ModelDims {
        vocab_size: field()?,
        n_embed: field()?,
        n_hidden: field()?,
        n_layer: field()?,
        n_head: field()?,
    })
}

/// Magic, version and five dims.
pub const HEADER_LEN: u64 = 4 + 4 * 6;

/// Exact byte length of a checkpoint for `dims`, or `None` on overflow.
#[must_use]
pub fn stream_len(dims: &ModelDims) -> Option<u64> {
    let params = u64::try_from(dims.checked_num_params()?).ok()?;
    let records = u64::try_from(dims.num_tensors()?).ok()?;
    records
        .checked_mul(8)?
        .checked_add(params.checked_mul(4)?)?
        .checked_add(HEADER_LEN)
}

/// Rejects headers that describe more data than the file holds, before anything is allocated.
fn check_stream_len(dims: &ModelDims, file_len: u64) -> Result<(), CheckpointError> {
    dims.validate().map_err(CheckpointError::InvalidArchitecture)?;
    match stream_len(dims) {
        Some(needed) if needed <= file_len => Ok(()),
        Some(needed) => Err(CheckpointError::InvalidArchitecture(ConfigError::Validation(
            format!("header {dims} needs {needed} bytes, file has {file_len}"),
        ))),
        None => Err(CheckpointError::InvalidArchitecture(ConfigError::Validation(
            format!("header {dims} describes a model too large to address"),
        ))),
    }
}

impl Model {
    /// Writes header and parameters to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), CheckpointError> {
        write_header(w, &self.dims)?;
        for p in self.parameters() {
            p.write_to(w)?;
        }
        Ok(())
    }

    /// Saves the checkpoint to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let mut w = BufWriter::new(File::create(path)?);
        self.write_to(&mut w)?;
        w.flush()?;
        debug!(path = %path.display(), num_params = self.num_params(), "checkpoint saved");
        Ok(())
    }

    /// Reads a checkpoint with the same architecture into this model.
    ///
    /// Every record is read and shape-checked before any parameter is replaced,
    /// so on error the model is unchanged. Gradients come back zeroed.
    pub fn read_from<R: Read>(&mut self, r: &mut R) -> Result<(), CheckpointError> {
        let found = read_header(r)?;
        if found != self.dims {
            return Err(CheckpointError::ArchitectureMismatch {
                expected: self.dims,
                found,
            });
        }
        self.read_params(r)
    }

    fn read_params<R: Read>(&mut self, r: &mut R) -> Result<(), CheckpointError> {
        let shapes: Vec<(usize, usize)> = self.parameters().iter().map(|p| p.shape()).collect();
        let mut loaded = Vec::with_capacity(shapes.len());
        for (index, &expected) in shapes.iter().enumerate() {
            let found = Tensor::read_shape(r)?;
            if found != expected {
                return Err(CheckpointError::ShapeMismatch {
                    index,
                    expected,
                    found,
                });
            }
            loaded.push(Tensor::read_values(r, found.0, found.1)?);
        }
        for (param, t) in self.parameters_mut().into_iter().zip(loaded) {
            *param = t;
        }
        Ok(())
    }

    /// Loads a checkpoint from `path` into this model (see [`Model::read_from`]).
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let mut r = BufReader::new(File::open(path)?);
        self.read_from(&mut r)?;
        debug!(path = %path.display(), dims = %self.dims, "checkpoint loaded");
        Ok(())
    }

    /// Builds a model whose architecture comes from the checkpoint header.
    pub fn from_checkpoint(path: impl AsRef<Path>) -> Result<Model, CheckpointError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut r = BufReader::new(file);
        let dims = read_header(&mut r)?;
        check_stream_len(&dims, file_len)?;
        // Zero init; every value is overwritten by the records below.
        let mut model = Model::new(dims, 0.0, &mut StdRng::seed_from_u64(0))
            .map_err(CheckpointError::InvalidArchitecture)?;
        model.read_params(&mut r)?;
        debug!(path = %path.display(), dims = %dims, "model restored from checkpoint");
        Ok(model)
    }
}
