use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs sort by creation millisecond; ids minted within the same
/// millisecond are ordered randomly, so no ordering is promised between them.
///
/// # Examples
/// ```
/// let id = tally_common::id::prefixed_ulid("ses");
/// assert!(id.starts_with("ses_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const SESSION: &str = "ses";
}

/// Opaque login session identifier.
pub struct SessionId;

impl PrefixedId for SessionId {
    const PREFIX: &'static str = prefix::SESSION;
}
