//! HTTP ingress for admission requests.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{AdmissionService, DEFAULT_MAX_BODY_BYTES, NODE_ID_HEADER};
