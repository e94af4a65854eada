//! Bucket identity and per-bucket properties (spec §3 "Bucket identity
//! (Bck)", "Bucket properties (BucketProps)").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ais,
    Aws,
    Gcp,
    Azure,
    Hdfs,
    Ht,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ais => "ais",
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Hdfs => "hdfs",
            Provider::Ht => "ht",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub uuid: String,
    pub name: String,
}

impl Namespace {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn is_global(&self) -> bool {
        self.uuid.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bck {
    pub name: String,
    pub provider: Provider,
    pub namespace: Namespace,
}

impl Bck {
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            name: name.into(),
            provider,
            namespace: Namespace::global(),
        }
    }

    /// A bucket is remote iff provider != ais OR namespace.uuid != "".
    pub fn is_remote(&self) -> bool {
        !matches!(self.provider, Provider::Ais) || !self.namespace.is_global()
    }

    /// `provider/namespace/bucket`, the HRW placement key (spec §3).
    pub fn uname(&self) -> String {
        if self.namespace.is_global() {
            format!("{}/{}", self.provider.as_str(), self.name)
        } else {
            format!("{}/{}/{}", self.provider.as_str(), self.namespace.uuid, self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumType {
    None,
    Md5,
    XxHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumConfig {
    pub kind: ChecksumType,
    pub validate_cold_get: bool,
    pub validate_warm_get: bool,
    pub enable_read_range: bool,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            kind: ChecksumType::XxHash,
            validate_cold_get: true,
            validate_warm_get: false,
            enable_read_range: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub enabled: bool,
    pub copies: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcConfig {
    pub enabled: bool,
    pub data_slices: u8,
    pub parity_slices: u8,
    pub obj_size_limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMask(pub u32);

impl AccessMask {
    pub const READ: u32 = 0b0001;
    pub const WRITE: u32 = 0b0010;
    pub const DELETE: u32 = 0b0100;

    pub fn full() -> Self {
        Self(Self::READ | Self::WRITE | Self::DELETE)
    }

    pub fn allows(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketProps {
    pub versioning_enabled: bool,
    pub checksum: ChecksumConfig,
    pub mirror: MirrorConfig,
    pub ec: EcConfig,
    pub access: AccessMask,
    /// An ais bucket may shadow a remote cloud bucket.
    pub backend_bck: Option<Bck>,
}

impl Default for BucketProps {
    fn default() -> Self {
        Self {
            versioning_enabled: false,
            checksum: ChecksumConfig::default(),
            mirror: MirrorConfig::default(),
            ec: EcConfig::default(),
            access: AccessMask::full(),
            backend_bck: None,
        }
    }
}
