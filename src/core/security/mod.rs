// Confinement for files the adapters open themselves.
//
// Paths handed to external scanners are the scanner's business; paths this
// process reads (screenshots, files hashed for a reputation lookup) are
// checked here against the optional MCP_ROOT_PATH.

pub mod path_validator;

pub use path_validator::{confine_path, PathSecurityError};
