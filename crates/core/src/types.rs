/// GPU index assigned by the acquisition source. Never reused within a session.
pub type GpuIndex = u32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
