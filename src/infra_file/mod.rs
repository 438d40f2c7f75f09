mod session_store_file;

pub use session_store_file::*;
