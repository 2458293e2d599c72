//! Binary tensor record: `[i32 rows][i32 cols][rows * cols f32]`, little-endian.
//!
//! Only values are written; gradients are transient and come back as zeros.

use std::io::{self, Read, Write};

use super::Tensor;

fn dim_to_i32(dim: usize, what: &str) -> io::Result<i32> {
    i32::try_from(dim).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("tensor {what} {dim} does not fit in an i32 record field"),
        )
    })
}

fn read_dim<R: Read>(r: &mut R, what: &str) -> io::Result<usize> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    let raw = i32::from_le_bytes(buf);
    usize::try_from(raw).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative tensor {what} {raw} in record"),
        )
    })
}

impl Tensor {
    /// Writes the record for this tensor.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&dim_to_i32(self.rows, "rows")?.to_le_bytes())?;
        w.write_all(&dim_to_i32(self.cols, "cols")?.to_le_bytes())?;
        let mut bytes = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        w.write_all(&bytes)
    }

    /// Reads the `(rows, cols)` prefix of the next record.
    ///
    /// Callers that know the expected shape check it here, before any values are read.
    pub fn read_shape<R: Read>(r: &mut R) -> io::Result<(usize, usize)> {
        let rows = read_dim(r, "rows")?;
        let cols = read_dim(r, "cols")?;
        Ok((rows, cols))
    }

    /// Reads the `rows * cols` values that follow a record prefix.
    ///
    /// The buffer grows with the bytes actually present, so a bogus prefix on a
    /// short stream fails with `UnexpectedEof` instead of a huge allocation.
    pub fn read_values<R: Read>(r: &mut R, rows: usize, cols: usize) -> io::Result<Tensor> {
        let byte_len = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("tensor record {rows}x{cols} is too large"),
                )
            })?;
        let mut bytes = Vec::new();
        r.take(byte_len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != byte_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "tensor record {rows}x{cols} truncated after {} of {byte_len} bytes",
                    bytes.len()
                ),
            ));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Tensor::from_vec(rows, cols, values))
    }

    /// Reads one record into a fresh tensor with zeroed gradients.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Tensor> {
        let (rows, cols) = Tensor::read_shape(r)?;
        Tensor::read_values(r, rows, cols)
    }

    /// Replaces this tensor with the next record from `r`.
    ///
    /// Both buffers take the shape found in the record and the gradient is zeroed.
    /// On error `self` is left unchanged.
    pub fn load<R: Read>(&mut self, r: &mut R) -> io::Result<()> {
        *self = Tensor::read_from(r)?;
        Ok(())
    }
}
