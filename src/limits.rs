//! Operational caps. These protect the process from misbehaving clients;
//! the booking business rules live in `booking::validator`.

/// Longest accepted request line (method + target + version).
pub const MAX_REQUEST_LINE_BYTES: u64 = 8 * 1024;

/// Longest accepted single header line.
pub const MAX_HEADER_LINE_BYTES: u64 = 8 * 1024;

/// Most header lines accepted per request.
pub const MAX_HEADER_LINES: usize = 64;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;
