// API module
//
// HTTP boundary over the ledger registry. Callers arrive with an already
// resolved participant identity in the path.

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use routes::configure_routes;
