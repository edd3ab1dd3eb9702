//! Binary mesh codec.
//!
//! Packs the numeric arrays of a layer's features into one flat
//! little-endian `.data` file per array kind, rewriting the JSON metadata to
//! `[offset, count]` references, and unpacks them back. Offsets are counted
//! in elements of the kind's width and increase monotonically in feature
//! order, so the per-feature slices never overlap.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::domain::{Feature, GeometryRecord, LayerFile, NumericField, PackedRef};
use crate::error::{Error, Result};

/// The four numeric array kinds a geometry record may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// 8-byte floats
    Coordinates,
    /// 4-byte floats
    Normals,
    /// 4-byte unsigned ints
    Indices,
    /// 4-byte unsigned ints
    Ids,
}

impl ArrayKind {
    pub const ALL: [ArrayKind; 4] = [
        ArrayKind::Coordinates,
        ArrayKind::Normals,
        ArrayKind::Indices,
        ArrayKind::Ids,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArrayKind::Coordinates => "coordinates",
            ArrayKind::Normals => "normals",
            ArrayKind::Indices => "indices",
            ArrayKind::Ids => "ids",
        }
    }

    pub fn element_size(self) -> usize {
        match self {
            ArrayKind::Coordinates => 8,
            ArrayKind::Normals => 4,
            ArrayKind::Indices | ArrayKind::Ids => 4,
        }
    }

    fn data_file(self, layer_id: &str) -> String {
        format!("{layer_id}_{}.data", self.name())
    }
}

/// Append every feature's inline array of one kind to a running buffer,
/// replacing it with its `[offset, count]` reference. Returns the buffer, or
/// `None` when no feature carries the kind.
fn pack_kind<T: Copy>(
    features: &mut [Feature],
    kind: ArrayKind,
    pick: impl Fn(&mut GeometryRecord) -> &mut Option<NumericField<T>>,
    mut put: impl FnMut(&mut Vec<u8>, T) -> std::io::Result<()>,
) -> Result<Option<Vec<u8>>> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut offset: u64 = 0;
    let mut present = false;

    for (index, feature) in features.iter_mut().enumerate() {
        let slot = pick(&mut feature.geometry);
        let Some(field) = slot else { continue };

        let values = match field {
            NumericField::Inline(values) => values,
            NumericField::Packed(_) => {
                return Err(Error::CodecMismatch(format!(
                    "{} of feature {index} is already packed",
                    kind.name()
                )));
            }
        };

        present = true;
        let count = values.len() as u64;
        for &value in values.iter() {
            put(&mut buffer, value)?;
        }
        *slot = Some(NumericField::Packed(PackedRef(offset, count)));
        offset += count;
    }

    Ok(present.then_some(buffer))
}

/// Resolve every `[offset, count]` reference of one kind back to inline
/// values, slicing into the kind's `.data` file.
fn unpack_kind<T: Clone>(
    features: &mut [Feature],
    dir: &Path,
    layer_id: &str,
    kind: ArrayKind,
    pick: impl Fn(&mut GeometryRecord) -> &mut Option<NumericField<T>>,
    mut get: impl FnMut(&mut Cursor<&[u8]>) -> std::io::Result<T>,
) -> Result<()> {
    if !features
        .iter_mut()
        .any(|f| pick(&mut f.geometry).is_some())
    {
        return Ok(());
    }

    let path = dir.join(kind.data_file(layer_id));
    let bytes = fs::read(&path)?;

    let width = kind.element_size();
    if bytes.len() % width != 0 {
        return Err(Error::CodecMismatch(format!(
            "{} holds {} bytes, not a multiple of the {width}-byte element width",
            path.display(),
            bytes.len()
        )));
    }

    let mut values: Vec<T> = Vec::with_capacity(bytes.len() / width);
    let mut cursor = Cursor::new(bytes.as_slice());
    for _ in 0..bytes.len() / width {
        values.push(get(&mut cursor)?);
    }

    for (index, feature) in features.iter_mut().enumerate() {
        let slot = pick(&mut feature.geometry);
        let Some(field) = slot else { continue };

        let reference = field.packed().ok_or_else(|| {
            Error::CodecMismatch(format!(
                "{} of feature {index} is inline where a packed reference was expected",
                kind.name()
            ))
        })?;

        let start = reference.offset();
        let end = start + reference.count();
        if end > values.len() {
            return Err(Error::CodecMismatch(format!(
                "{} reference [{start}, {}] of feature {index} exceeds the {} elements on disk",
                kind.name(),
                reference.count(),
                values.len()
            )));
        }

        *slot = Some(NumericField::Inline(values[start..end].to_vec()));
    }

    Ok(())
}

/// Pack a layer's numeric arrays into sibling `.data` files and write the
/// rewritten metadata as `<layerId>.json` under `dir`.
pub fn encode_layer(layer: &mut LayerFile, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::FileSystem(dir.to_path_buf()));
    }

    let buffers = [
        pack_kind(&mut layer.data, ArrayKind::Coordinates, |g| &mut g.coordinates, |b, v| {
            b.write_f64::<LittleEndian>(v)
        })?,
        pack_kind(&mut layer.data, ArrayKind::Normals, |g| &mut g.normals, |b, v| {
            b.write_f32::<LittleEndian>(v)
        })?,
        pack_kind(&mut layer.data, ArrayKind::Indices, |g| &mut g.indices, |b, v| {
            b.write_u32::<LittleEndian>(v)
        })?,
        pack_kind(&mut layer.data, ArrayKind::Ids, |g| &mut g.ids, |b, v| {
            b.write_u32::<LittleEndian>(v)
        })?,
    ];

    for (kind, buffer) in ArrayKind::ALL.into_iter().zip(buffers) {
        if let Some(buffer) = buffer {
            let path = dir.join(kind.data_file(&layer.id));
            debug!("writing {} ({} bytes)", path.display(), buffer.len());
            fs::write(path, buffer)?;
        }
    }

    let json = serde_json::to_string(layer)?;
    fs::write(dir.join(format!("{}.json", layer.id)), json)?;

    Ok(())
}

/// Read `<layerId>.json` from `dir` and resolve its packed references back
/// to inline arrays from the sibling `.data` files.
pub fn decode_layer(dir: &Path, layer_id: &str) -> Result<LayerFile> {
    let json = fs::read_to_string(dir.join(format!("{layer_id}.json")))?;
    let mut layer: LayerFile = serde_json::from_str(&json)?;

    unpack_kind(&mut layer.data, dir, layer_id, ArrayKind::Coordinates, |g| {
        &mut g.coordinates
    }, |c| c.read_f64::<LittleEndian>())?;
    unpack_kind(&mut layer.data, dir, layer_id, ArrayKind::Normals, |g| {
        &mut g.normals
    }, |c| c.read_f32::<LittleEndian>())?;
    unpack_kind(&mut layer.data, dir, layer_id, ArrayKind::Indices, |g| {
        &mut g.indices
    }, |c| c.read_u32::<LittleEndian>())?;
    unpack_kind(&mut layer.data, dir, layer_id, ArrayKind::Ids, |g| {
        &mut g.ids
    }, |c| c.read_u32::<LittleEndian>())?;

    Ok(layer)
}
