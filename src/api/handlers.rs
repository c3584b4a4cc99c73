use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{BlockView, LedgerError, LedgerRegistry, PowAttempt, Transaction};

/// Shared registry of per-participant ledgers
pub type RegistryData = web::Data<LedgerRegistry>;

/// Response for the participant endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ParticipantResponse {
    /// The participant identity
    pub participant: String,
}

/// Request for the transaction endpoint
///
/// Both fields are optional at the wire level so a missing field can be
/// reported as such rather than as a malformed body.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's identity
    pub recipient: Option<String>,

    /// The amount to transfer
    pub amount: Option<f64>,
}

/// Generic message response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: BlockView,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub participant: String,
    pub balance: f64,
}

/// Response for the validate endpoint
#[derive(Serialize, ToSchema)]
pub struct ValidationResponse {
    /// Whether hash links and proofs hold over the whole chain
    pub chain_valid: bool,

    /// The first violation found, if any
    pub violation: Option<String>,

    /// Whether every pending transaction is covered by its sender's committed balance
    pub transactions_valid: bool,
}

/// Response for the proof search simulation endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SimulationResponse {
    /// The proof found within the attempt cap, if any
    pub proof: Option<u64>,

    /// Number of candidates tried
    pub attempts: u64,

    /// The candidates tried
    pub trace: Vec<PowAttempt>,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse {
        message: text.to_string(),
    }
}

fn block_lookup_failure(err: LedgerError) -> HttpResponse {
    match err {
        LedgerError::BlockNotFound(_) => HttpResponse::NotFound().json(message("Block not found")),
        other => HttpResponse::InternalServerError().json(message(&other.to_string())),
    }
}

/// List participants
///
/// Returns every identity with an open ledger
#[utoipa::path(
    get,
    path = "/api/v1/participants",
    responses(
        (status = 200, description = "Participants retrieved successfully", body = Vec<String>)
    )
)]
pub async fn list_participants(registry: RegistryData) -> impl Responder {
    HttpResponse::Ok().json(registry.participants())
}

/// Create a participant
///
/// Opens a ledger under a freshly generated identity
#[utoipa::path(
    post,
    path = "/api/v1/participants",
    responses(
        (status = 201, description = "Participant created successfully", body = ParticipantResponse)
    )
)]
pub async fn create_participant(registry: RegistryData) -> impl Responder {
    let ledger = registry.create_anonymous();
    HttpResponse::Created().json(ParticipantResponse {
        participant: ledger.participant().to_string(),
    })
}

/// Get the full blockchain
///
/// Returns every block with its hash
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/chain",
    params(("participant" = String, Path, description = "Participant identity")),
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<BlockView>)
    )
)]
pub async fn get_chain(registry: RegistryData, participant: web::Path<String>) -> impl Responder {
    let ledger = registry.view(&participant);
    let chain: Vec<BlockView> = ledger
        .get_chain()
        .iter()
        .map(|block| block.to_view(true))
        .collect();

    HttpResponse::Ok().json(chain)
}

/// Mine a new block
///
/// Creates a new block from the pending transactions and credits the mining reward
#[utoipa::path(
    post,
    path = "/api/v1/participants/{participant}/mine",
    params(("participant" = String, Path, description = "Participant identity")),
    responses(
        (status = 201, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Mining failed", body = MessageResponse)
    )
)]
pub async fn mine_block(registry: RegistryData, participant: web::Path<String>) -> impl Responder {
    let ledger = registry.ledger(&participant);

    // The proof search is CPU bound, keep it off the async workers
    match web::block(move || ledger.mine_block()).await {
        Ok(Ok(block)) => HttpResponse::Created().json(MineResponse {
            message: "Block added successfully.".to_string(),
            block: block.to_view(true),
        }),
        Ok(Err(err)) => {
            error!("Mining failed for {}: {}", participant, err);
            HttpResponse::InternalServerError().json(message("Mining failed."))
        }
        Err(err) => {
            error!("Mining task failed for {}: {}", participant, err);
            HttpResponse::InternalServerError().json(message("Mining failed."))
        }
    }
}

/// Get all open transactions
///
/// Returns the pending transactions that have not expired
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/transactions",
    params(("participant" = String, Path, description = "Participant identity")),
    responses(
        (status = 200, description = "Open transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_open_transactions(
    registry: RegistryData,
    participant: web::Path<String>,
) -> impl Responder {
    let transactions: Vec<Transaction> = registry.view(&participant).get_open_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Create a new transaction
///
/// Sends `amount` from the participant to `recipient` once the participant's balance covers it
#[utoipa::path(
    post,
    path = "/api/v1/participants/{participant}/transactions",
    params(("participant" = String, Path, description = "Participant identity")),
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction added successfully", body = MessageResponse),
        (status = 400, description = "Missing fields or insufficient funds", body = MessageResponse)
    )
)]
pub async fn new_transaction(
    registry: RegistryData,
    participant: web::Path<String>,
    transaction_req: web::Json<TransactionRequest>,
) -> impl Responder {
    let TransactionRequest { recipient, amount } = transaction_req.into_inner();
    let (recipient, amount) = match (recipient, amount) {
        (Some(recipient), Some(amount)) => (recipient, amount),
        _ => return HttpResponse::BadRequest().json(message("Required data missing.")),
    };

    let ledger = registry.ledger(&participant);
    if ledger.add_transaction(participant.as_str(), recipient, amount) {
        HttpResponse::Created().json(message("Transaction added successfully."))
    } else {
        HttpResponse::BadRequest().json(message("Insufficient funds."))
    }
}

/// Get the participant's balance
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/balance",
    params(("participant" = String, Path, description = "Participant identity")),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = BalanceResponse)
    )
)]
pub async fn get_balance(registry: RegistryData, participant: web::Path<String>) -> impl Responder {
    let ledger = registry.view(&participant);

    HttpResponse::Ok().json(BalanceResponse {
        participant: ledger.participant().to_string(),
        balance: ledger.get_balance(),
    })
}

/// Show how a block hash is computed
///
/// Returns the exact canonical string that was hashed and the resulting digest
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/block/{index}/hash",
    params(
        ("participant" = String, Path, description = "Participant identity"),
        ("index" = u64, Path, description = "Block index")
    ),
    responses(
        (status = 200, description = "Hash details retrieved successfully", body = HashAudit),
        (status = 404, description = "Block not found", body = MessageResponse)
    )
)]
pub async fn get_block_hash(
    registry: RegistryData,
    path: web::Path<(String, u64)>,
) -> impl Responder {
    let (participant, index) = path.into_inner();

    match registry.view(&participant).hash_audit(index) {
        Ok(audit) => HttpResponse::Ok().json(audit),
        Err(err) => block_lookup_failure(err),
    }
}

/// Show the proof-of-work attempts for a block
///
/// Blocks mined without recording report a single successful attempt
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/block/{index}/pow-attempts",
    params(
        ("participant" = String, Path, description = "Participant identity"),
        ("index" = u64, Path, description = "Block index")
    ),
    responses(
        (status = 200, description = "Attempts retrieved successfully", body = Vec<PowAttempt>),
        (status = 404, description = "Block not found", body = MessageResponse)
    )
)]
pub async fn get_pow_attempts(
    registry: RegistryData,
    path: web::Path<(String, u64)>,
) -> impl Responder {
    let (participant, index) = path.into_inner();

    match registry.view(&participant).pow_attempts(index) {
        Ok(attempts) => HttpResponse::Ok().json(attempts),
        Err(err) => block_lookup_failure(err),
    }
}

/// Re-run a capped proof search for a block
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/block/{index}/pow-simulation",
    params(
        ("participant" = String, Path, description = "Participant identity"),
        ("index" = u64, Path, description = "Block index")
    ),
    responses(
        (status = 200, description = "Simulation completed", body = SimulationResponse),
        (status = 404, description = "Block not found", body = MessageResponse)
    )
)]
pub async fn simulate_pow(registry: RegistryData, path: web::Path<(String, u64)>) -> impl Responder {
    let (participant, index) = path.into_inner();

    match registry.view(&participant).simulate_proof_search(index) {
        Ok(search) => HttpResponse::Ok().json(SimulationResponse {
            proof: search.proof,
            attempts: search.attempts,
            trace: search.trace,
        }),
        Err(err) => block_lookup_failure(err),
    }
}

/// Check if the ledger is valid
///
/// Validates the chain and the pending transactions
#[utoipa::path(
    get,
    path = "/api/v1/participants/{participant}/validate",
    params(("participant" = String, Path, description = "Participant identity")),
    responses(
        (status = 200, description = "Validation status", body = ValidationResponse)
    )
)]
pub async fn validate(registry: RegistryData, participant: web::Path<String>) -> impl Responder {
    let ledger = registry.view(&participant);

    let violation = match ledger.verify_chain() {
        Err(LedgerError::InvalidChain(violation)) => Some(violation.to_string()),
        _ => None,
    };

    HttpResponse::Ok().json(ValidationResponse {
        chain_valid: violation.is_none(),
        violation,
        transactions_valid: ledger.verify_transactions(),
    })
}
