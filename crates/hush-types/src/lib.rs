/// Types shared between the HTTP API, the WebSocket gateway and storage.
pub mod api;
pub mod events;
pub mod models;
pub mod views;
