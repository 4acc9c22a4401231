/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a download job. Either client-supplied or a server-side UUID v4.
pub type JobId = String;
