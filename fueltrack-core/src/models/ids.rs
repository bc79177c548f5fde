use uuid::Uuid;

/// Owner identifier stamped on records created before anyone signs in.
pub const GUEST_OWNER: &str = "guest";

/// Generates a record identifier.
///
/// UUIDv7 is time-ordered, so identifiers created later sort later and the
/// same identifier can be used as the remote document key.
pub fn new_record_id() -> String {
    Uuid::now_v7().to_string()
}

pub(crate) fn guest_owner() -> String {
    GUEST_OWNER.to_string()
}
