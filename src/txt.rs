//! Length-prefixed `key=value` metadata, as carried in DNS-SD TXT records.
//!
//! Each entry is one length byte followed by that many bytes of `key` or
//! `key=value`. A key with no `=` is a boolean attribute.

use crate::{Error, Result};

/// Largest encodable entry, excluding its length byte.
pub const MAX_ENTRY_LEN: usize = u8::MAX as usize;

/// Conventional upper bound for a complete metadata blob.
pub const MAX_TXT_LEN: usize = u16::MAX as usize;

const SEPARATOR: u8 = b'=';

/// One decoded metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtEntry {
    /// Attribute key.
    pub key: String,
    /// Attribute value. `None` for a bare boolean attribute.
    pub value: Option<Vec<u8>>,
}

impl TxtEntry {
    /// Value as UTF-8 text, if present and valid.
    pub fn value_str(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::metadata("empty key"));
    }
    if !key.bytes().all(|b| (0x20..=0x7e).contains(&b) && b != SEPARATOR) {
        return Err(Error::metadata(format!("invalid key {key:?}")));
    }
    Ok(())
}

/// Encode `(key, value)` pairs into a metadata blob.
pub fn encode<I, K, V>(pairs: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for (key, value) in pairs {
        let key = key.as_ref();
        let value = value.as_ref();
        check_key(key)?;

        let len = key.len() + 1 + value.len();
        if len > MAX_ENTRY_LEN {
            return Err(Error::metadata(format!(
                "entry for key {key:?} is {len} bytes, limit is {MAX_ENTRY_LEN}"
            )));
        }
        out.push(len as u8);
        out.extend_from_slice(key.as_bytes());
        out.push(SEPARATOR);
        out.extend_from_slice(value);
    }

    if out.len() > MAX_TXT_LEN {
        return Err(Error::metadata(format!(
            "metadata is {} bytes, limit is {MAX_TXT_LEN}",
            out.len()
        )));
    }
    Ok(out)
}

/// Decode a metadata blob. Zero-length entries are skipped.
pub fn decode(bytes: &[u8]) -> Result<Vec<TxtEntry>> {
    let mut entries = Vec::new();
    let mut rest = bytes;

    while let Some((&len, tail)) = rest.split_first() {
        let len = len as usize;
        if tail.len() < len {
            return Err(Error::metadata(format!(
                "entry claims {len} bytes but only {} remain",
                tail.len()
            )));
        }
        let (entry, tail) = tail.split_at(len);
        rest = tail;

        if entry.is_empty() {
            continue;
        }

        let (key, value) = match entry.iter().position(|b| *b == SEPARATOR) {
            Some(i) => (&entry[..i], Some(entry[i + 1..].to_vec())),
            None => (entry, None),
        };
        let key = std::str::from_utf8(key)
            .map_err(|_| Error::metadata("key is not valid UTF-8"))?;
        check_key(key)?;

        entries.push(TxtEntry {
            key: key.to_owned(),
            value,
        });
    }

    Ok(entries)
}
