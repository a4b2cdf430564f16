/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monotonic per-channel write counter. `0` means "never written".
pub type Version = u64;

/// Identifier of an equipment service, also the key of its monitored host.
pub type ServiceId = String;
