//! Well-known attribute names.

/// Multi-valued name attribute listing mixin types.
pub const MIXIN_TYPES: &str = "mixinTypes";

/// Mixin type marking a versionable node.
pub const MIX_VERSIONABLE: &str = "mix:versionable";

/// Version last replicated onto a versionable.
pub const REPLICATED_VERSION: &str = "replicatedVersion";

/// Change marker of a release root.
pub const CHANGE_NUMBER: &str = "changeNumber";

/// Timestamp of the last replication into a release root.
pub const LAST_REPLICATION_DATE: &str = "lastReplicationDate";

/// Last modification timestamp.
pub const LAST_MODIFIED: &str = "lastModified";

/// Creation timestamp.
pub const CREATED: &str = "created";

/// Attributes the in-memory store treats as protected unless configured otherwise.
pub const DEFAULT_PROTECTED: &[&str] = &[
    "uuid",
    CREATED,
    "createdBy",
    "baseVersion",
    "versionHistory",
    "predecessors",
    "isCheckedOut",
];
