// Messaging layer - the adapter between the extension and the core services.

#[path = "protocol.rs"]
pub mod protocol;

#[path = "router.rs"]
pub mod router;

#[path = "native_host.rs"]
pub mod native_host;

pub use native_host::serve;
pub use router::MessageRouter;
