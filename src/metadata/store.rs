use serde::{Deserialize, Serialize};

use crate::error::{Result, SwimError};
use crate::membership::NodeAddr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Everything one node has published. A higher `version` supersedes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeMetadata {
    pub owner: NodeAddr,
    pub version: u64,
    pub entries: Vec<MetaEntry>,
}

#[derive(Default)]
pub struct MetadataStore {
    entries: Vec<MetaEntry>,
    version: u64,

    /// Latest known metadata of other nodes, one record per owner.
    others: Vec<NodeMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[MetaEntry] {
        &self.entries
    }

    pub fn own(&self, owner: &NodeAddr) -> NodeMetadata {
        NodeMetadata {
            owner: owner.clone(),
            version: self.version,
            entries: self.entries.clone(),
        }
    }

    /// All known metadata. Our own record is included once our identity is known.
    pub fn all(&self, me: Option<&NodeAddr>) -> Vec<NodeMetadata> {
        let mut all = self.others.clone();
        if let Some(me) = me {
            all.push(self.own(me));
        }
        all
    }

    /// Replaces our own entries as a whole.
    pub fn set_entries(&mut self, entries: Vec<MetaEntry>) -> Result<()> {
        for entry in &entries {
            validate_key(&entry.key)?;
        }

        self.entries = entries;
        self.version += 1;
        Ok(())
    }

    /// Adds an entry, replacing any existing one with the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;

        self.entries.retain(|e| e.key != key);
        self.entries.push(MetaEntry { key, value });
        self.version += 1;
        Ok(())
    }

    /// Removes an entry. The version is bumped even if the key was absent, so
    /// the change is always re-announced.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        self.version += 1;
        self.entries.len() != before
    }

    /// Merges received records. Records about ourselves are ignored. Returns
    /// whether anything changed.
    pub fn merge(&mut self, received: Vec<NodeMetadata>, me: Option<&NodeAddr>) -> bool {
        let mut changed = false;

        for record in received {
            if me == Some(&record.owner) {
                continue;
            }

            match self.others.iter_mut().find(|m| m.owner == record.owner) {
                None => {
                    tracing::debug!(
                        "New metadata from {} (version {})",
                        record.owner,
                        record.version
                    );
                    self.others.push(record);
                    changed = true;
                }
                Some(known) if record.version > known.version => {
                    tracing::debug!(
                        "Metadata of {} updated to version {}",
                        record.owner,
                        record.version
                    );
                    *known = record;
                    changed = true;
                }
                Some(_) => {}
            }
        }

        changed
    }

    /// Drops the metadata of a departed node.
    pub fn forget(&mut self, owner: &NodeAddr) -> bool {
        let before = self.others.len();
        self.others.retain(|m| &m.owner != owner);
        self.others.len() != before
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SwimError::InvalidMetadata(
            "metadata keys must be non-empty".to_string(),
        ));
    }
    Ok(())
}
