// 🔤 Entry Codec - Entry <-> persisted line
//
// Persisted form: "<owner>:<name>" for members, bare "<name>" for the default owner.
// Decoding splits on the FIRST ':' only, so names may contain colons.

use thiserror::Error;

use crate::entry::{Entry, Owner, DEFAULT_OWNER_LABEL};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("'{0}' contains a line break and cannot be stored on one line")]
    Newline(String),
}

fn has_newline(text: &str) -> bool {
    text.contains('\n') || text.contains('\r')
}

/// Encode an entry as a single persisted line
pub fn encode(entry: &Entry) -> Result<String, EncodeError> {
    if has_newline(&entry.name) {
        return Err(EncodeError::Newline(entry.name.clone()));
    }

    match &entry.owner {
        Owner::Member(label) => {
            if has_newline(label) {
                return Err(EncodeError::Newline(label.clone()));
            }
            Ok(format!("{}:{}", label, entry.name))
        }
        // A bare name with a colon would decode with its prefix as owner
        Owner::Default if entry.name.contains(':') => {
            Ok(format!("{}:{}", DEFAULT_OWNER_LABEL, entry.name))
        }
        Owner::Default => Ok(entry.name.clone()),
    }
}

/// Decode a persisted line. Blank names yield `None` and are dropped by the caller.
pub fn decode(line: &str) -> Option<Entry> {
    let (owner, name) = match line.split_once(':') {
        Some((owner, name)) => (Owner::from_label(owner), name.trim()),
        None => (Owner::Default, line.trim()),
    };

    if name.is_empty() {
        return None;
    }

    Some(Entry {
        owner,
        name: name.to_string(),
    })
}

/// Encode every entry, in order. Fails on the first entry that cannot be encoded.
pub fn encode_all(entries: &[Entry]) -> Result<Vec<String>, EncodeError> {
    entries.iter().map(encode).collect()
}

/// Decode every line, dropping blank ones
pub fn decode_all<S: AsRef<str>>(lines: &[S]) -> Vec<Entry> {
    lines.iter().filter_map(|line| decode(line.as_ref())).collect()
}

// ============================================================================
// TESTS
// ============================================================================
