use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/participants")
            .route("", web::get().to(handlers::list_participants))
            .route("", web::post().to(handlers::create_participant))
            .service(
                web::scope("/{participant}")
                    .route("/chain", web::get().to(handlers::get_chain))
                    .route("/mine", web::post().to(handlers::mine_block))
                    .route("/transactions", web::get().to(handlers::get_open_transactions))
                    .route("/transactions", web::post().to(handlers::new_transaction))
                    .route("/balance", web::get().to(handlers::get_balance))
                    .route("/block/{index}/hash", web::get().to(handlers::get_block_hash))
                    .route("/block/{index}/pow-attempts", web::get().to(handlers::get_pow_attempts))
                    .route("/block/{index}/pow-simulation", web::get().to(handlers::simulate_pow))
                    .route("/validate", web::get().to(handlers::validate)),
            ),
    );
}
