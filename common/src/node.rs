//! Node identity (spec §3 "Node identity (Snode)").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Proxy,
    Target,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub maintenance: bool,
    pub decommission: bool,
    pub non_electable: bool,
    /// Member of the information center (primary + a configured-size
    /// subset of proxies maintaining the notification table).
    pub is_ic: bool,
}

impl NodeFlags {
    pub fn excluded_from_hrw_writes(&self) -> bool {
        self.maintenance || self.decommission
    }
}

/// Immutable node record. `id` never changes after construction; fields
/// that can change (flags) are swapped as a whole new `Snode` in the Smap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snode {
    pub id: String,
    pub role: Role,
    pub public_url: String,
    pub intra_control_url: String,
    pub intra_data_url: String,
    pub flags: NodeFlags,
}

impl Snode {
    pub fn new(id: impl Into<String>, role: Role, public_url: impl Into<String>) -> Self {
        let public_url = public_url.into();
        Self {
            id: id.into(),
            role,
            intra_control_url: public_url.clone(),
            intra_data_url: public_url.clone(),
            public_url,
            flags: NodeFlags::default(),
        }
    }

    pub fn with_intra_urls(mut self, control: impl Into<String>, data: impl Into<String>) -> Self {
        self.intra_control_url = control.into();
        self.intra_data_url = data.into();
        self
    }

    /// The digest HRW hashes every node against. Derived from the node id
    /// so that every node in the cluster computes the identical value
    /// given an identical Smap (spec §4.3 "Correctness requirement").
    pub fn id_digest(&self) -> u64 {
        xxhash_rust::xxh64::xxh64(self.id.as_bytes(), 0)
    }
}
