pub mod health;
pub mod rooms;
pub mod ws;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use rooms::{broadcast_handler, get_room, list_rooms};
pub use ws::ws_handler;
