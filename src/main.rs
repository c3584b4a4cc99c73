use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use pow_ledger::api;
use pow_ledger::blockchain::{self, storage, LedgerRegistry, PersistenceStore};
use pow_ledger::config::Settings;

// Pick the backing store: the sled database under the data directory, or
// process memory when asked to or when the database cannot be opened
fn open_store(settings: &Settings) -> Arc<dyn PersistenceStore> {
    if settings.in_memory {
        info!("Keeping ledger state in memory");
        return Arc::new(blockchain::MemoryStore::new());
    }

    if let Err(e) = std::fs::create_dir_all(&settings.data_dir) {
        warn!("Failed to create data directory: {}", e);
    }
    storage::open_or_memory(&settings.data_dir)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::list_participants,
        api::handlers::create_participant,
        api::handlers::get_chain,
        api::handlers::mine_block,
        api::handlers::get_open_transactions,
        api::handlers::new_transaction,
        api::handlers::get_balance,
        api::handlers::get_block_hash,
        api::handlers::get_pow_attempts,
        api::handlers::simulate_pow,
        api::handlers::validate
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::BlockView,
            blockchain::Transaction,
            blockchain::HashAudit,
            blockchain::PowAttempt,
            api::handlers::ParticipantResponse,
            api::handlers::TransactionRequest,
            api::handlers::MessageResponse,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse,
            api::handlers::ValidationResponse,
            api::handlers::SimulationResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger endpoints")
    ),
    info(
        title = "Ledger API",
        version = "1.0.0",
        description = "A single-node proof-of-work ledger API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::parse();
    let store = open_store(&settings);
    let registry = web::Data::new(LedgerRegistry::new(store, settings.ledger_config()));

    info!("Starting HTTP server at http://{}:{}", settings.host, settings.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(registry.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
