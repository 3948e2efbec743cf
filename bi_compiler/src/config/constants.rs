//! Fixed sentinels of the rule language
//!
//! Unlike the limits in `compile_time`, these are part of the configuration
//! format itself and are not tunable per build profile.

/// Service name standing for "the host's own state"
pub const HOST_STATE: &str = "HOST_STATE";

/// Service name standing for "every service not otherwise claimed"
/// (only valid before resolution, never present in a compiled leaf)
pub const REMAINING: &str = "REMAINING";

/// Call modifier: instantiate the rule once per matching host
pub const FOREACH_HOST: &str = "FOREACH_HOST";

/// Call modifier: instantiate the rule once per matching (host, service)
pub const FOREACH_SERVICE: &str = "FOREACH_SERVICE";

/// Host pattern accepting every host without regex matching
pub const ALL_HOSTS: &str = "@all";

/// Suffix turning a host pattern into a pure tag filter: `prod|!standby|@all`
pub const ALL_HOSTS_SUFFIX: &str = "|@all";

/// Separator between tag expressions in a tag-filter host pattern
pub const TAG_FILTER_SEPARATOR: char = '|';
