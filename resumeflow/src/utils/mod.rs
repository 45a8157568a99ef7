//! Utility functions for timestamps, checksums and durable file writes.

pub mod checksum;
pub mod fs;
pub mod timestamps;

pub use checksum::{canonical_json, canonicalize, checksum_excluding, checksum_of, checksum_value, sha256_hex};
pub use fs::{read_optional, remove_if_exists, validate_workflow_id, write_atomic};
pub use timestamps::{file_stamp, iso_timestamp, now_utc, parse_file_stamp, Timestamp};
