//! The zone alias index.
//!
//! The index maps every zone id, canonical or alias, to the id of the zone it
//! resolves to. It is stored as a pool of distinct strings followed by pairs
//! of pool indices:
//!
//! ```text
//! u16 pool size
//! pool size * (u16 byte length, UTF-8 bytes)
//! u16 mapping count
//! mapping count * (u16 key index, u16 target index)
//! ```
//!
//! All integers are big-endian.

use core::fmt;

use alloc::{collections::BTreeMap, string::String, vec::Vec};

use indexmap::IndexSet;

use crate::codec::{ByteReader, ByteWriter, CodecError};

/// The largest number of distinct strings the pool can hold.
pub const MAX_POOL_SIZE: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasIndexError {
    /// More than 65535 distinct strings were added to the pool.
    PoolOverflow,
    /// More than 65535 mappings were provided.
    TooManyMappings(usize),
    StringTooLong(usize),
    /// A mapping refers to a pool index that does not exist.
    Corrupt { index: u16, pool_size: u16 },
    UnexpectedEof,
    InvalidUtf8,
}

impl From<CodecError> for AliasIndexError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::StringTooLong(len) => Self::StringTooLong(len),
            CodecError::UnexpectedEof => Self::UnexpectedEof,
            CodecError::InvalidUtf8 => Self::InvalidUtf8,
        }
    }
}

impl fmt::Display for AliasIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolOverflow => write!(f, "too many unique zone ids, limit is {MAX_POOL_SIZE}"),
            Self::TooManyMappings(n) => {
                write!(f, "{n} zone mappings exceed the limit of {MAX_POOL_SIZE}")
            }
            Self::StringTooLong(len) => write!(f, "zone id of {len} bytes is too long"),
            Self::Corrupt { index, pool_size } => write!(
                f,
                "corrupt zone index: index {index} is outside a pool of {pool_size} ids"
            ),
            Self::UnexpectedEof => f.write_str("unexpected end of zone index"),
            Self::InvalidUtf8 => f.write_str("zone id in index is not valid UTF-8"),
        }
    }
}

impl core::error::Error for AliasIndexError {}

type StringPool<'a> = IndexSet<&'a str, hashbrown::DefaultHashBuilder>;

fn pool_index<'a>(pool: &mut StringPool<'a>, value: &'a str) -> Result<u16, AliasIndexError> {
    let (index, _) = pool.insert_full(value);
    if index >= MAX_POOL_SIZE {
        return Err(AliasIndexError::PoolOverflow);
    }
    u16::try_from(index).map_err(|_| AliasIndexError::PoolOverflow)
}

/// Encodes `(id, target id)` pairs into the alias index.
///
/// Pool indices are assigned in order of first appearance, visiting each
/// pair's id before its target.
pub fn write_alias_index<'a, I>(mappings: I) -> Result<Vec<u8>, AliasIndexError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pool = StringPool::default();
    let mut indices = Vec::new();
    for (id, target) in mappings {
        let id_index = pool_index(&mut pool, id)?;
        let target_index = pool_index(&mut pool, target)?;
        indices.push((id_index, target_index));
    }
    let pool_size = u16::try_from(pool.len()).map_err(|_| AliasIndexError::PoolOverflow)?;
    let mapping_count =
        u16::try_from(indices.len()).map_err(|_| AliasIndexError::TooManyMappings(indices.len()))?;

    let mut writer = ByteWriter::default();
    writer.write_u16(pool_size);
    for value in &pool {
        writer.write_str(value)?;
    }
    writer.write_u16(mapping_count);
    for (id_index, target_index) in indices {
        writer.write_u16(id_index);
        writer.write_u16(target_index);
    }
    Ok(writer.into_bytes())
}

/// Decodes an alias index into a map of id to target id.
pub fn read_alias_index(bytes: &[u8]) -> Result<BTreeMap<String, String>, AliasIndexError> {
    let mut reader = ByteReader::new(bytes);
    let pool_size = reader.read_u16()?;
    let mut pool = Vec::with_capacity(usize::from(pool_size));
    for _ in 0..pool_size {
        pool.push(reader.read_string()?);
    }
    let lookup = |index: u16| {
        pool.get(usize::from(index))
            .cloned()
            .ok_or(AliasIndexError::Corrupt { index, pool_size })
    };
    let mapping_count = reader.read_u16()?;
    let mut mappings = BTreeMap::new();
    for _ in 0..mapping_count {
        let id = lookup(reader.read_u16()?)?;
        let target = lookup(reader.read_u16()?)?;
        mappings.insert(id, target);
    }
    Ok(mappings)
}
