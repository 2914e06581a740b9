//! relayer http server
//!
//! prepare is a read-only snapshot; submit verifies the proof, guards
//! against double spends, applies the tree mutation (the transfer's two
//! appends inside one write guard), and records the confirmed outcome.
//! the client-chosen reference doubles as an idempotency key: replaying
//! a reference returns the stored outcome instead of mutating again.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use caligo_core::FieldElement;
use caligo_events::{Address, DepositEvent, PoolEvent, TransferEvent, WithdrawEvent};
use caligo_ledger::{
    records::now_secs, LedgerError, NullifierRegistry, PendingIntent, ReconciliationLedger,
    SpendMeta, TxKind,
};
use caligo_tree::{MerkleProof, SharedAccumulator, TreeError};

use crate::api::{
    HistoryParams, PrepareRequest, PrepareResponse, StatusResponse, SubmitBody, SubmitRequest,
    SubmitResponse,
};
use crate::backend::{
    ProvingBackend, SignalVector, DEPOSIT_SIGNALS, TRANSFER_SIGNALS, WITHDRAW_SIGNALS,
};
use crate::error::{RelayerError, Result};
use crate::state::RequestState;

pub struct AppState {
    pub tree: SharedAccumulator,
    pub registry: NullifierRegistry,
    pub ledger: ReconciliationLedger,
    pub backend: Arc<dyn ProvingBackend>,
}

impl AppState {
    /// open the stores and rebuild the in-memory accumulator from the
    /// confirmed records, so a restarted relayer serves proofs for
    /// every settled leaf and keeps assigning indices where it left off
    pub fn new(db: &sled::Db, backend: Arc<dyn ProvingBackend>) -> Result<Self> {
        let ledger = ReconciliationLedger::new(db)?;
        let tree = SharedAccumulator::new();
        for (leaf_index, commitment) in ledger.confirmed_leaves()? {
            let outcome = tree.append(commitment)?;
            if outcome.index != leaf_index {
                return Err(RelayerError::Integrity(format!(
                    "confirmed leaf {leaf_index} rebuilt at index {}",
                    outcome.index
                )));
            }
        }
        if !tree.is_empty() {
            info!("rebuilt accumulator: {} leaves, root {}", tree.len(), tree.root().to_hex());
        }
        Ok(Self {
            tree,
            registry: NullifierRegistry::new(db)?,
            ledger,
            backend,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/prepare", post(prepare))
        .route("/v1/submit", post(submit))
        .route("/v1/status/:reference", get(status_of))
        .route("/v1/history", get(history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn prepare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrepareRequest>,
) -> std::result::Result<Json<PrepareResponse>, (StatusCode, String)> {
    let response = match req.kind {
        TxKind::Deposit => PrepareResponse {
            root: state.tree.root().to_hex(),
            leaf: None,
            leaf_index: None,
            path_elements: Vec::new(),
            path_indices: Vec::new(),
            next_leaf_index: state.tree.next_index(),
        },
        TxKind::Transfer | TxKind::Withdraw => {
            let proof = locate_leaf(&state.tree, &req).map_err(http_err)?;
            PrepareResponse {
                root: proof.root.to_hex(),
                leaf: Some(proof.leaf.to_hex()),
                leaf_index: Some(proof.index),
                path_elements: proof.siblings.iter().map(|s| s.to_hex()).collect(),
                path_indices: proof.path_indices(),
                next_leaf_index: state.tree.next_index(),
            }
        }
    };

    if let Some(intent) = build_intent(&req).map_err(http_err)? {
        state
            .ledger
            .put_intent(&intent)
            .map_err(|e| http_err(e.into()))?;
    }

    Ok(Json(response))
}

fn locate_leaf(tree: &SharedAccumulator, req: &PrepareRequest) -> Result<MerkleProof> {
    if let Some(index) = req.leaf_index {
        return Ok(tree.proof_at(index)?);
    }
    if let Some(commitment) = &req.commitment {
        let commitment = parse_field("commitment", commitment)?;
        return Ok(tree.proof_of(&commitment)?);
    }
    Err(RelayerError::validation(
        "prepare needs a leaf_index or commitment selector",
    ))
}

fn build_intent(req: &PrepareRequest) -> Result<Option<PendingIntent>> {
    let Some(descriptor) = &req.intent else {
        return Ok(None);
    };
    let commitment = req
        .commitment
        .as_deref()
        .map(|c| parse_field("commitment", c))
        .transpose()?;
    let nullifier = req
        .nullifier
        .as_deref()
        .map(|n| parse_field("nullifier", n))
        .transpose()?;
    let recipient_tag = req
        .recipient_tag
        .as_deref()
        .map(|t| parse_field("recipient_tag", t))
        .transpose()?;

    match req.kind {
        TxKind::Deposit if commitment.is_none() => Err(RelayerError::validation(
            "deposit intent needs a placeholder commitment",
        )),
        TxKind::Transfer if nullifier.is_none() || recipient_tag.is_none() => Err(
            RelayerError::validation("transfer intent needs a nullifier and recipient_tag"),
        ),
        TxKind::Withdraw if nullifier.is_none() => {
            Err(RelayerError::validation("withdraw intent needs a nullifier"))
        }
        _ => Ok(Some(PendingIntent {
            kind: req.kind,
            commitment,
            nullifier,
            recipient_tag,
            sender: descriptor.sender.clone(),
            recipient: descriptor.recipient.clone(),
            amount: descriptor.amount,
            created_at: now_secs(),
        })),
    }
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> std::result::Result<Json<SubmitResponse>, (StatusCode, String)> {
    submit_inner(&state, req).map(Json).map_err(http_err)
}

fn submit_inner(state: &AppState, req: SubmitRequest) -> Result<SubmitResponse> {
    if req.reference.trim().is_empty() {
        return Err(RelayerError::validation("reference must not be empty"));
    }

    let order = match &req.body {
        SubmitBody::Deposit { .. } => DEPOSIT_SIGNALS,
        SubmitBody::Transfer { .. } => TRANSFER_SIGNALS,
        SubmitBody::Withdraw { .. } => WITHDRAW_SIGNALS,
    };
    let signals = SignalVector::normalize(&req.public_signals, order)?;
    let proof = decode_proof(&req.proof)?;
    if !state.backend.verify(&[], &signals, &proof) {
        return Err(RelayerError::ProofRejected);
    }

    // the reference claim is atomic: of any number of concurrent
    // submits under one reference, exactly one reaches the apply path.
    // the rest read the stored outcome (or are told to check status if
    // the winner is still mid-flight)
    if !state.ledger.claim_settlement(&req.reference)? {
        let records = state.ledger.records_for_settlement(&req.reference)?;
        return replayed_outcome(state, req.reference, records);
    }

    let outcome = apply_submit(state, &req);
    if outcome.is_err() {
        // nothing was recorded under this reference; a corrected
        // resubmit may reuse it
        let _ = state.ledger.release_settlement(&req.reference);
    }
    outcome
}

fn replayed_outcome(
    state: &AppState,
    reference: String,
    records: Vec<caligo_ledger::ConfirmedRecord>,
) -> Result<SubmitResponse> {
    if records.is_empty() {
        return Err(RelayerError::Transport(format!(
            "settlement {reference} is in flight, check status"
        )));
    }
    info!("reference {} already settled, returning stored outcome", reference);
    // the root as it stood at settlement, not the current one; only a
    // withdraw (which moves no leaves) falls back to the live root
    let new_root = records
        .iter()
        .rev()
        .find_map(|r| r.new_root)
        .map(|root| root.to_hex())
        .unwrap_or_else(|| state.tree.root().to_hex());
    Ok(SubmitResponse {
        settlement_ref: reference,
        state: RequestState::Confirmed,
        new_root,
        leaf_indices: records.iter().filter_map(|r| r.leaf_index).collect(),
    })
}

fn apply_submit(state: &AppState, req: &SubmitRequest) -> Result<SubmitResponse> {
    match &req.body {
        SubmitBody::Deposit {
            deposit_hash,
            owner_key,
            commitment,
            asset_id,
        } => {
            let deposit_hash = parse_field("deposit_hash", deposit_hash)?;
            let owner_key = parse_field("owner_key", owner_key)?;
            let commitment = parse_field("commitment", commitment)?;
            let asset_id = parse_field("asset_id", asset_id)?;

            let old_root = state.tree.root();
            let outcome = state.tree.append(commitment)?;
            let event = PoolEvent::Deposit(DepositEvent {
                deposit_hash,
                owner_key,
                commitment,
                old_root,
                new_root: outcome.new_root,
                next_leaf_index: outcome.index + 1,
                asset_id,
            });
            state.ledger.record_event(&req.reference, &event)?;
            info!("deposit settled as {} at leaf {}", req.reference, outcome.index);

            Ok(SubmitResponse {
                settlement_ref: req.reference.clone(),
                state: RequestState::Confirmed,
                new_root: outcome.new_root.to_hex(),
                leaf_indices: vec![outcome.index],
            })
        }
        SubmitBody::Transfer {
            nullifier,
            out1_commitment,
            out2_commitment,
            enc_note_tag1,
            enc_note_tag2,
            asset_id,
        } => {
            let nullifier = parse_field("nullifier", nullifier)?;
            let out1 = parse_field("out1_commitment", out1_commitment)?;
            let out2 = parse_field("out2_commitment", out2_commitment)?;
            let enc_note_tag1 = parse_field("enc_note_tag1", enc_note_tag1)?;
            let enc_note_tag2 = parse_field("enc_note_tag2", enc_note_tag2)?;
            let asset_id = parse_field("asset_id", asset_id)?;

            if state.registry.is_spent(&nullifier)? {
                return Err(RelayerError::DoubleSpend(nullifier.to_hex()));
            }

            // claim the nullifier before the tree moves: the registry's
            // compare-and-swap gives concurrent spends of one nullifier
            // a single winner, and the losers never append
            state.registry.upsert(
                &nullifier,
                &SpendMeta {
                    spent: true,
                    settlement_ref: req.reference.clone(),
                    spent_at: now_secs(),
                    kind: TxKind::Transfer,
                },
            )?;
            let root_before = state.tree.root();
            let dual = state.tree.append_pair(out1, out2)?;
            let event = PoolEvent::Transfer(TransferEvent {
                nullifier,
                out1_commitment: out1,
                out2_commitment: out2,
                enc_note_tag1,
                enc_note_tag2,
                root_before,
                new_root1: dual.first.new_root,
                new_root2: dual.second.new_root,
                next_leaf_index: dual.second.index + 1,
                asset_id,
            });
            state.ledger.record_event(&req.reference, &event)?;
            info!(
                "transfer settled as {} at leaves {}..{}",
                req.reference, dual.first.index, dual.second.index
            );

            Ok(SubmitResponse {
                settlement_ref: req.reference.clone(),
                state: RequestState::Confirmed,
                new_root: dual.second.new_root.to_hex(),
                leaf_indices: vec![dual.first.index, dual.second.index],
            })
        }
        SubmitBody::Withdraw {
            nullifier,
            root_used,
            amount,
            asset_id,
            recipient,
        } => {
            let nullifier = parse_field("nullifier", nullifier)?;
            let root_used = parse_field("root_used", root_used)?;
            let asset_id = parse_field("asset_id", asset_id)?;
            let recipient = parse_address(recipient)?;

            state.tree.check_root(&root_used)?;
            if state.registry.is_spent(&nullifier)? {
                return Err(RelayerError::DoubleSpend(nullifier.to_hex()));
            }

            state.registry.upsert(
                &nullifier,
                &SpendMeta {
                    spent: true,
                    settlement_ref: req.reference.clone(),
                    spent_at: now_secs(),
                    kind: TxKind::Withdraw,
                },
            )?;
            let event = PoolEvent::Withdraw(WithdrawEvent {
                nullifier,
                root_used,
                amount: *amount,
                asset_id,
                recipient,
            });
            state.ledger.record_event(&req.reference, &event)?;
            info!("withdraw settled as {}", req.reference);

            Ok(SubmitResponse {
                settlement_ref: req.reference.clone(),
                state: RequestState::Confirmed,
                new_root: state.tree.root().to_hex(),
                leaf_indices: Vec::new(),
            })
        }
    }
}

async fn status_of(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> std::result::Result<Json<StatusResponse>, (StatusCode, String)> {
    let records = state
        .ledger
        .records_for_settlement(&reference)
        .map_err(|e| http_err(e.into()))?;
    if records.is_empty() {
        return Err(http_err(RelayerError::NotFound(reference)));
    }
    Ok(Json(StatusResponse {
        settlement_ref: reference,
        state: RequestState::Confirmed,
        records,
    }))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> std::result::Result<Json<caligo_ledger::HistoryPage>, (StatusCode, String)> {
    let page = state
        .ledger
        .history(params.cursor.as_deref(), params.limit.unwrap_or(50))
        .map_err(|e| http_err(e.into()))?;
    Ok(Json(page))
}

fn parse_field(name: &str, value: &str) -> Result<FieldElement> {
    FieldElement::parse(value).map_err(|e| RelayerError::validation(format!("{name}: {e}")))
}

fn parse_address(value: &str) -> Result<Address> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(stripped)
        .map_err(|_| RelayerError::validation("recipient must be hex"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RelayerError::validation("recipient must be 32 bytes"))?;
    Ok(Address(bytes))
}

fn decode_proof(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|_| RelayerError::validation("proof must be hex"))
}

fn http_err(e: RelayerError) -> (StatusCode, String) {
    let status = match &e {
        RelayerError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayerError::ProofRejected => StatusCode::UNPROCESSABLE_ENTITY,
        RelayerError::DoubleSpend(_) => StatusCode::CONFLICT,
        RelayerError::RootMismatch(_) => StatusCode::CONFLICT,
        RelayerError::NotFound(_) => StatusCode::NOT_FOUND,
        RelayerError::Transport(_) => StatusCode::BAD_GATEWAY,
        RelayerError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayerError::IllegalTransition { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        RelayerError::Tree(tree) => match tree {
            TreeError::RootMismatch { .. } => StatusCode::CONFLICT,
            TreeError::IndexOutOfRange(_) | TreeError::UnknownCommitment(_) => {
                StatusCode::NOT_FOUND
            }
            TreeError::Full(_) => StatusCode::SERVICE_UNAVAILABLE,
        },
        RelayerError::Ledger(ledger) => match ledger {
            LedgerError::SpendReverted(_) | LedgerError::SpendConflict { .. } => {
                StatusCode::CONFLICT
            }
            LedgerError::InvalidIntent(_) | LedgerError::InvalidCursor(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    (status, e.to_string())
}
