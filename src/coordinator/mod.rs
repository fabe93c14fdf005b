//! Request coordination: single-flight, FIFO execution of keyed
//! asynchronous operations.

pub mod request_coordinator;

pub use request_coordinator::RequestCoordinator;
