//! Common test utilities for zonefile-dl integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod ftp_server;
#[allow(dead_code)]
pub mod mock;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use ftp_server::*;
#[allow(unused_imports)]
pub use mock::*;
