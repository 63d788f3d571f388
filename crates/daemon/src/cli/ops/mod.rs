pub mod daemon;
pub mod health;
pub mod init;
pub mod kv;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use init::Init;
pub use kv::Kv;
pub use version::Version;
