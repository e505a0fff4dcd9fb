pub mod connection;
pub mod dispatcher;
pub mod poll;
pub mod server;
pub mod tls;

pub use dispatcher::{Dispatched, RequestDispatcher};
pub use poll::PollWorkerPool;
pub use server::HttpServer;
