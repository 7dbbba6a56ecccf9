//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Template error - manifest or chart rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Pack error - invalid package source, unknown package type or layer count
pub const PACK_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Not found - reference or blob absent from a store or registry
pub const NOT_FOUND: i32 = 6;

/// Integrity error - content does not match its digest
pub const INTEGRITY_ERROR: i32 = 7;

/// Registry error - transport failure or deadline exceeded
pub const REGISTRY_ERROR: i32 = 8;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
