//! Metadata distribution side-channel.
//!
//! Each node owns a versioned list of key/value entries. Changes are pushed to
//! every other member fire-and-forget; a periodic push to one member and the
//! peer-up hook repair whatever was lost.

pub mod store;

pub use store::{MetaEntry, MetadataStore, NodeMetadata};
