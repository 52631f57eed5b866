//! Grid container file.
//!
//! ```text
//! HEADER
//!   0-3    magic "SVOL"
//!   4-5    version (u16)
//!   6-7    flags (u16), bit 0 = record payloads are zlib-compressed
//!   8-11   grid count (u32)
//! RECORD (repeated grid count times)
//!   name length (u32), name (UTF-8)
//!   value kind (u8: 0 scalar, 1 vector)
//!   value encoding (u8: 0 f32, 1 f16)
//!   transform: 16 x f64, row-major
//!   background: one f32 per component
//!   leaf count (u32)
//!   raw payload length (u64), stored payload length (u64)
//!   payload
//! PAYLOAD (per leaf, origins sorted by z, y, x)
//!   origin: 3 x i32
//!   active mask: 8 x u64
//!   active values in mask order, one encoded float per component
//! ```
//!
//! All integers and floats are little endian. Background and transform are
//! always stored at full precision.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use glam::Vec3;
use half::f16;
use rayon::prelude::*;
use tempfile::NamedTempFile;

use crate::config::WriteOptions;
use crate::coord::Coord;
use crate::enums::ValueKind;
use crate::error::{GridError, Result};
use crate::grid::{AnyGrid, Grid};
use crate::storage::{LEAF_VOLUME, Leaf, leaf_origin};
use crate::transform::Transform;
use crate::value::Value;

pub const MAGIC: [u8; 4] = *b"SVOL";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 12;

const FLAG_COMPRESSED: u16 = 1;
const ENCODING_F32: u8 = 0;
const ENCODING_F16: u8 = 1;
const MASK_WORDS: usize = LEAF_VOLUME / 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub flags: u16,
    pub grid_count: u32,
}

impl Header {
    fn new(grid_count: u32, options: &WriteOptions) -> Self {
        Self {
            version: VERSION,
            flags: if options.compress { FLAG_COMPRESSED } else { 0 },
            grid_count,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.grid_count.to_le_bytes());
        bytes
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let bytes: [u8; HEADER_SIZE] = read_array(reader)?;
        if bytes[0..4] != MAGIC {
            return Err(GridError::FileFormat("not a grid file (bad magic)".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(GridError::FileFormat(format!(
                "unsupported version {version}"
            )));
        }
        Ok(Self {
            version,
            flags: u16::from_le_bytes([bytes[6], bytes[7]]),
            grid_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Serialized grid record, ready to be written after a header.
pub(crate) struct EncodedRecord {
    meta: Vec<u8>,
    raw_len: u64,
    payload: Vec<u8>,
}

/// Encodes one grid. Compression is applied here so records encode in parallel.
pub(crate) fn encode_grid<T: Value>(grid: &Grid<T>, options: &WriteOptions) -> Result<EncodedRecord> {
    let encoding = if options.float_as_half {
        ENCODING_F16
    } else {
        ENCODING_F32
    };

    let store = grid.store();
    let mut raw = Vec::new();
    let origins = store.sorted_origins();
    for origin in &origins {
        let Some(leaf) = store.leaf(*origin) else {
            continue;
        };
        for component in origin.to_array() {
            raw.extend_from_slice(&component.to_le_bytes());
        }
        for word in leaf.mask() {
            raw.extend_from_slice(&word.to_le_bytes());
        }
        for (_, value) in leaf.iter_active() {
            for component in 0..T::COMPONENTS {
                push_float(&mut raw, value.component(component), encoding);
            }
        }
    }

    let raw_len = raw.len() as u64;
    let payload = if options.compress {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()?
    } else {
        raw
    };

    let name = grid.name().as_bytes();
    let mut meta = Vec::with_capacity(name.len() + 160);
    meta.extend_from_slice(&(name.len() as u32).to_le_bytes());
    meta.extend_from_slice(name);
    meta.push(T::KIND.tag());
    meta.push(encoding);
    for value in grid.transform().to_row_array() {
        meta.extend_from_slice(&value.to_le_bytes());
    }
    let background = grid.background();
    for component in 0..T::COMPONENTS {
        meta.extend_from_slice(&background.component(component).to_le_bytes());
    }
    meta.extend_from_slice(&(origins.len() as u32).to_le_bytes());

    Ok(EncodedRecord {
        meta,
        raw_len,
        payload,
    })
}

fn encode_any(grid: &AnyGrid, options: &WriteOptions) -> Result<EncodedRecord> {
    match grid {
        AnyGrid::Scalar(grid) => encode_grid(grid, options),
        AnyGrid::Vector(grid) => encode_grid(grid, options),
    }
}

fn push_float(out: &mut Vec<u8>, value: f32, encoding: u8) {
    if encoding == ENCODING_F16 {
        out.extend_from_slice(&f16::from_f32(value).to_le_bytes());
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn write_encoded<W: Write>(
    writer: &mut W,
    records: &[EncodedRecord],
    options: &WriteOptions,
) -> Result<()> {
    writer.write_all(&Header::new(records.len() as u32, options).to_bytes())?;
    for record in records {
        writer.write_all(&record.meta)?;
        writer.write_all(&record.raw_len.to_le_bytes())?;
        writer.write_all(&(record.payload.len() as u64).to_le_bytes())?;
        writer.write_all(&record.payload)?;
    }
    Ok(())
}

/// Writes grids to a stream.
pub fn save_grids<W: Write>(writer: &mut W, grids: &[AnyGrid], options: &WriteOptions) -> Result<()> {
    let records = grids
        .par_iter()
        .map(|grid| encode_any(grid, options))
        .collect::<Result<Vec<_>>>()?;
    write_encoded(writer, &records, options)
}

/// Writes grids to `path`.
///
/// The file is written next to its destination and renamed over it, so an
/// existing file is either fully replaced or left untouched.
pub fn write_grids(path: impl AsRef<Path>, grids: &[AnyGrid], options: &WriteOptions) -> Result<()> {
    let records = grids
        .par_iter()
        .map(|grid| encode_any(grid, options))
        .collect::<Result<Vec<_>>>()?;
    write_records(path.as_ref(), &records, options)
}

pub(crate) fn write_records(path: &Path, records: &[EncodedRecord], options: &WriteOptions) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write_encoded(&mut writer, records, options)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| GridError::Io(err.error))?;

    let bytes: usize = records
        .iter()
        .map(|r| r.meta.len() + r.payload.len() + 16)
        .sum();
    log::info!(
        "Wrote {} grid(s) to {} ({} bytes)",
        records.len(),
        path.display(),
        bytes + HEADER_SIZE
    );
    Ok(())
}

struct RecordMeta {
    name: String,
    kind: ValueKind,
    encoding: u8,
    transform: [f64; 16],
    background: Vec<f32>,
    leaf_count: u32,
    raw_len: u64,
    stored_len: u64,
}

fn read_meta<R: Read>(reader: &mut R) -> Result<RecordMeta> {
    let name_len = u32::from_le_bytes(read_array(reader)?);
    let mut name = Vec::new();
    reader.by_ref().take(u64::from(name_len)).read_to_end(&mut name)?;
    if name.len() as u64 != u64::from(name_len) {
        return Err(truncated());
    }
    let name = String::from_utf8(name)
        .map_err(|_| GridError::FileFormat("grid name is not UTF-8".into()))?;

    let [kind, encoding]: [u8; 2] = read_array(reader)?;
    let kind = ValueKind::from_tag(kind)
        .ok_or_else(|| GridError::FileFormat(format!("unknown value kind {kind}")))?;
    if encoding != ENCODING_F32 && encoding != ENCODING_F16 {
        return Err(GridError::FileFormat(format!(
            "unknown value encoding {encoding}"
        )));
    }

    let mut transform = [0.0f64; 16];
    for value in transform.iter_mut() {
        *value = f64::from_le_bytes(read_array(reader)?);
    }

    let components = match kind {
        ValueKind::Scalar => 1,
        ValueKind::Vector => 3,
    };
    let mut background = Vec::with_capacity(components);
    for _ in 0..components {
        background.push(f32::from_le_bytes(read_array(reader)?));
    }

    Ok(RecordMeta {
        name,
        kind,
        encoding,
        transform,
        background,
        leaf_count: u32::from_le_bytes(read_array(reader)?),
        raw_len: u64::from_le_bytes(read_array(reader)?),
        stored_len: u64::from_le_bytes(read_array(reader)?),
    })
}

fn read_payload<R: Read>(reader: &mut R, meta: &RecordMeta, compressed: bool) -> Result<Vec<u8>> {
    let mut stored = Vec::new();
    reader.by_ref().take(meta.stored_len).read_to_end(&mut stored)?;
    if stored.len() as u64 != meta.stored_len {
        return Err(truncated());
    }
    let raw = if compressed {
        let mut raw = Vec::new();
        ZlibDecoder::new(stored.as_slice())
            .take(meta.raw_len.saturating_add(1))
            .read_to_end(&mut raw)
            .map_err(|err| GridError::FileFormat(format!("corrupt compressed payload: {err}")))?;
        raw
    } else {
        stored
    };
    if raw.len() as u64 != meta.raw_len {
        return Err(GridError::FileFormat(format!(
            "payload of '{}' is {} bytes, expected {}",
            meta.name,
            raw.len(),
            meta.raw_len
        )));
    }
    Ok(raw)
}

fn decode_grid<T: Value>(meta: &RecordMeta, payload: &[u8]) -> Result<Grid<T>> {
    let transform = Transform::from_row_slice(&meta.transform)
        .map_err(|err| GridError::FileFormat(format!("bad transform in '{}': {err}", meta.name)))?;
    let background = T::from_components(&meta.background);
    if !background.is_finite() {
        return Err(GridError::FileFormat(format!(
            "non-finite background in '{}'",
            meta.name
        )));
    }
    let mut grid = Grid::from_parts(meta.name.clone(), transform, background);

    let float_size = if meta.encoding == ENCODING_F16 { 2 } else { 4 };
    let mut cursor = payload;
    let store = grid.store_mut();
    let mut components = vec![0.0f32; T::COMPONENTS];
    for _ in 0..meta.leaf_count {
        let origin = Coord::new(
            i32::from_le_bytes(read_array(&mut cursor)?),
            i32::from_le_bytes(read_array(&mut cursor)?),
            i32::from_le_bytes(read_array(&mut cursor)?),
        );
        if leaf_origin(origin) != origin {
            return Err(GridError::FileFormat(format!(
                "misaligned leaf origin {origin}"
            )));
        }
        let mut mask = [0u64; MASK_WORDS];
        for word in mask.iter_mut() {
            *word = u64::from_le_bytes(read_array(&mut cursor)?);
        }
        let active = mask.iter().map(|w| w.count_ones() as usize).sum::<usize>();
        let needed = active * T::COMPONENTS * float_size;
        if cursor.len() < needed {
            return Err(truncated());
        }
        let (values, rest) = cursor.split_at(needed);
        cursor = rest;

        let decoded: Vec<T> = values
            .chunks_exact(T::COMPONENTS * float_size)
            .map(|chunk| {
                for (slot, bytes) in components.iter_mut().zip(chunk.chunks_exact(float_size)) {
                    *slot = if float_size == 2 {
                        f16::from_le_bytes([bytes[0], bytes[1]]).to_f32()
                    } else {
                        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                    };
                }
                T::from_components(&components)
            })
            .collect();
        if decoded.iter().any(|value| !value.is_finite()) {
            return Err(GridError::FileFormat(format!(
                "non-finite value in leaf {origin} of '{}'",
                meta.name
            )));
        }
        let leaf = Leaf::from_mask(mask, &decoded, background)
            .ok_or_else(|| GridError::FileFormat("leaf mask does not match values".into()))?;
        store.insert_leaf(origin, leaf);
    }
    if !cursor.is_empty() {
        return Err(GridError::FileFormat(format!(
            "{} trailing bytes in '{}'",
            cursor.len(),
            meta.name
        )));
    }
    Ok(grid)
}

fn decode_any(meta: &RecordMeta, payload: &[u8]) -> Result<AnyGrid> {
    Ok(match meta.kind {
        ValueKind::Scalar => AnyGrid::Scalar(decode_grid::<f32>(meta, payload)?),
        ValueKind::Vector => AnyGrid::Vector(decode_grid::<Vec3>(meta, payload)?),
    })
}

/// Reads every grid from a stream, in file order.
pub fn load_grids<R: Read>(reader: &mut R) -> Result<Vec<AnyGrid>> {
    let header = Header::read(reader)?;
    // The count is untrusted; records are only collected as they are read.
    let mut pending = Vec::new();
    for _ in 0..header.grid_count {
        let meta = read_meta(reader)?;
        let payload = read_payload(reader, &meta, header.is_compressed())?;
        pending.push((meta, payload));
    }
    pending
        .par_iter()
        .map(|(meta, payload)| decode_any(meta, payload))
        .collect()
}

pub fn read_grids(path: impl AsRef<Path>) -> Result<Vec<AnyGrid>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let grids = load_grids(&mut reader)?;
    log::info!("Read {} grid(s) from {}", grids.len(), path.display());
    Ok(grids)
}

/// Names of the grids in `path`, in file order. Payloads are skipped.
pub fn grid_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = Header::read(&mut reader)?;
    let mut names = Vec::new();
    for _ in 0..header.grid_count {
        let meta = read_meta(&mut reader)?;
        let skipped = io::copy(&mut (&mut reader).take(meta.stored_len), &mut io::sink())?;
        if skipped != meta.stored_len {
            return Err(truncated());
        }
        names.push(meta.name);
    }
    Ok(names)
}

/// Reads the first grid called `name`.
pub fn read_grid_named(path: impl AsRef<Path>, name: &str) -> Result<AnyGrid> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = Header::read(&mut reader)?;
    for _ in 0..header.grid_count {
        let meta = read_meta(&mut reader)?;
        if meta.name == name {
            let payload = read_payload(&mut reader, &meta, header.is_compressed())?;
            return decode_any(&meta, &payload);
        }
        let skipped = io::copy(&mut (&mut reader).take(meta.stored_len), &mut io::sink())?;
        if skipped != meta.stored_len {
            return Err(truncated());
        }
    }
    Err(GridError::GridNotFound(name.to_string()))
}

fn truncated() -> GridError {
    GridError::FileFormat("unexpected end of file".into())
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => truncated(),
        _ => GridError::Io(err),
    })
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    read_exact(reader, &mut bytes)?;
    Ok(bytes)
}
