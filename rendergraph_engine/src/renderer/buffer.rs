/// Buffer trait and buffer descriptor

use crate::error::{Error, Result};

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
}

/// Index element type for `CommandList::bind_index_buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

/// Descriptor for creating a host-visible buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
}

/// Buffer resource trait
///
/// The buffer is destroyed when the last `Arc` drops, so frames that still
/// reference it must keep it alive (see `DeferredDeletionQueue`).
pub trait Buffer: Send + Sync {
    /// Write `data` at byte `offset`
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    fn size(&self) -> u64;
}

/// Write a slice of plain-old-data values (vertices, matrices) into `buffer`
pub fn write_pod<T: bytemuck::Pod>(buffer: &dyn Buffer, offset: u64, values: &[T]) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    if offset + bytes.len() as u64 > buffer.size() {
        return Err(Error::InvalidResource(format!(
            "write of {} bytes at offset {} overflows buffer of {} bytes",
            bytes.len(), offset, buffer.size()
        )));
    }
    buffer.update(offset, bytes)
}
