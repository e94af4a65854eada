//! Required intra-cluster and object-response HTTP headers (spec §6.3).

pub const CALLER_ID: &str = "ais-caller-id";
pub const CALLER_NAME: &str = "ais-caller-name";
pub const CALLER_SMAP_VER: &str = "ais-caller-smap-ver";
pub const NODE_ID: &str = "ais-node-id";
pub const NODE_URL: &str = "ais-node-url";

pub const CHECKSUM_TYPE: &str = "ais-checksum-type";
pub const CHECKSUM_VALUE: &str = "ais-checksum-value";
pub const OBJ_SIZE: &str = "ais-size";
pub const OBJ_VERSION: &str = "ais-version";
pub const OBJ_ATIME: &str = "ais-atime";

/// Query parameters (spec §6.4).
pub mod query {
    pub const PROVIDER: &str = "provider";
    pub const NAMESPACE: &str = "namespace";
    pub const PROXY_ID: &str = "proxy-id";
    pub const UNIX_TIME: &str = "unix-time";
    pub const IS_GFN_REQUEST: &str = "is-gfn-request";
    pub const PREPARE: &str = "prepare";
    pub const FORCE: &str = "force";
    pub const PRIMARY_CANDIDATE: &str = "primary-candidate";
    pub const UUID: &str = "uuid";
    pub const WHAT: &str = "what";
    pub const TASK_ACTION: &str = "task-action";
    /// `"migrated"` on a PUT pushed by GFN or rebalance/resilver, distinct
    /// from an ordinary client PUT (spec §4.7 RecvType, §4.9, §4.10).
    pub const RECV_TYPE: &str = "recv-type";
    /// `"true"` on a DELETE that should only unlink the local copy,
    /// leaving any remote backend object untouched (rebalance eviction,
    /// spec §4.10; distinct from a client-initiated delete).
    pub const EVICT: &str = "evict";
}
