// SPDX-License-Identifier: AGPL-3.0-only

//! Tile state snapshot
//!
//! Migration between backends is a copy through this snapshot: the source
//! tile packs its storage into a blob, the target tile is built from scratch
//! and restored from the blob, and only then is the old tile released.
//!
//! Blob layout (little endian):
//!
//! ```text
//! [magic u32][in_size u32][out_size u32][bias u8][backend u8][alpha f32][len u32][len × f32]
//! ```

use crate::backend::Backend;
use crate::config::TileShape;
use crate::error::{Result, TileError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const STATE_MAGIC: u32 = 0x4154_494C; // "ATIL"
const HEADER_LEN: usize = 4 + 4 + 4 + 1 + 1 + 4 + 4;

/// Complete snapshot of a tile's physical storage
#[derive(Debug, Clone, PartialEq)]
pub struct TileState {
    /// Logical shape
    pub shape: TileShape,
    /// Backend the snapshot was taken on
    pub backend: Backend,
    /// Output scale recorded by the last scaled write
    pub out_scaling_alpha: f32,
    /// Physical matrix, row-major, `shape.len()` elements
    pub weights: Vec<f32>,
}

impl TileState {
    /// Serialize into a compact blob.
    ///
    /// # Errors
    ///
    /// Returns `CorruptState` if a dimension or the element count does not
    /// fit the blob's `u32` fields.
    pub fn pack(&self) -> Result<Bytes> {
        let in_size = header_field("in_size", self.shape.in_size)?;
        let out_size = header_field("out_size", self.shape.out_size)?;
        let len = header_field("element count", self.weights.len())?;

        let mut blob = BytesMut::with_capacity(HEADER_LEN + self.weights.len() * 4);
        blob.put_u32_le(STATE_MAGIC);
        blob.put_u32_le(in_size);
        blob.put_u32_le(out_size);
        blob.put_u8(u8::from(self.shape.bias));
        blob.put_u8(self.backend.tag());
        blob.put_f32_le(self.out_scaling_alpha);
        blob.put_u32_le(len);
        for &w in &self.weights {
            blob.put_f32_le(w);
        }
        Ok(blob.freeze())
    }

    /// Decode a blob produced by [`TileState::pack`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptState` if the blob is truncated, has the wrong magic,
    /// names an unknown backend, or carries an element count inconsistent
    /// with its shape.
    pub fn unpack(mut blob: &[u8]) -> Result<Self> {
        if blob.len() < HEADER_LEN {
            return Err(TileError::corrupt_state(format!(
                "blob too short: {} < {HEADER_LEN}",
                blob.len()
            )));
        }
        let magic = blob.get_u32_le();
        if magic != STATE_MAGIC {
            return Err(TileError::corrupt_state(format!("bad magic {magic:#010x}")));
        }
        let in_size = blob.get_u32_le() as usize;
        let out_size = blob.get_u32_le() as usize;
        let bias = match blob.get_u8() {
            0 => false,
            1 => true,
            other => {
                return Err(TileError::corrupt_state(format!("bad bias flag {other}")));
            }
        };
        let tag = blob.get_u8();
        let backend = Backend::from_tag(tag)
            .ok_or_else(|| TileError::corrupt_state(format!("unknown backend tag {tag}")))?;
        let out_scaling_alpha = blob.get_f32_le();
        let len = blob.get_u32_le() as usize;

        let shape = TileShape::new(in_size, out_size, bias);
        if len != shape.len() {
            return Err(TileError::corrupt_state(format!(
                "element count {len} does not match shape {out_size}×{}",
                shape.columns()
            )));
        }
        if blob.remaining() != len * 4 {
            return Err(TileError::corrupt_state(format!(
                "payload is {} bytes, expected {}",
                blob.remaining(),
                len * 4
            )));
        }
        let weights = (0..len).map(|_| blob.get_f32_le()).collect();

        Ok(Self {
            shape,
            backend,
            out_scaling_alpha,
            weights,
        })
    }
}

fn header_field(what: &str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        TileError::corrupt_state(format!("{what} {value} does not fit the state header"))
    })
}
