//! Raw memory images of element arrays.
//!
//! An image is the elements back to back in their native layout: no header,
//! no length prefix, no versioning. The element count is the file length
//! divided by the element size. Images are only meant to be reloaded on a
//! platform with the same endianness and type layout.

use std::fs::File;
use std::io::{BufWriter, Write};

use memmap2::Mmap;
use tracing::debug;

use crate::element::Element;
use crate::error::{Error, Result};

/// Writes the image of `elements` to `sink`.
///
/// Either every byte is written or an error is returned.
pub fn write_image<T: Element>(elements: &[T], sink: &mut dyn Write) -> Result<()> {
    let mut writer = BufWriter::new(sink);
    for element in elements {
        element.write_to(&mut writer)?;
    }
    writer.flush()?;
    debug!(
        elements = elements.len(),
        bytes = elements.len() * T::SIZE,
        "wrote image"
    );
    Ok(())
}

/// Decodes an image held in memory.
pub fn decode_image<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    if T::SIZE == 0 || bytes.len() % T::SIZE != 0 {
        return Err(Error::InvalidLength {
            len: bytes.len() as u64,
            element_size: T::SIZE,
        });
    }

    let count = bytes.len() / T::SIZE;
    let mut elements = Vec::with_capacity(count);
    let mut reader = bytes;
    for _ in 0..count {
        elements.push(T::read_from(&mut reader)?);
    }
    Ok(elements)
}

/// Reads the image stored in `file` by mapping it into memory.
pub fn read_image<T: Element>(file: &File) -> Result<Vec<T>> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(Vec::new());
    }
    if T::SIZE == 0 || len % T::SIZE as u64 != 0 {
        return Err(Error::InvalidLength {
            len,
            element_size: T::SIZE,
        });
    }

    // The index owns and grows its elements after loading, so they are
    // decoded into a Vec. Decoding straight from the mapping avoids holding
    // a second heap copy of the raw bytes while the Vec is filled.
    // Safety: the mapping is read only and does not outlive this call.
    let mmap = unsafe { Mmap::map(file)? };
    let elements = decode_image(&mmap)?;
    debug!(elements = elements.len(), bytes = len, "read image");
    Ok(elements)
}
