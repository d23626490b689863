// Adapters layer: concrete implementations for external systems (http transport, credential storage).

pub mod http;
pub mod storage;
