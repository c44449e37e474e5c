use uuid::Uuid;

/// A time-ordered opaque identifier, used both for server-generated and
/// SDK-generated `sessionId` values (§3).
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}
