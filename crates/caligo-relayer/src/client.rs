//! relayer client
//!
//! the client never trusts the server's prepare response: it re-folds
//! the returned path against the returned root locally and refuses to
//! prove over a path that does not fold. submits are never blindly
//! retried; after a transport failure the client consults the status
//! endpoint for its own reference and only reports success when the
//! settlement is actually recorded.

use tracing::{debug, warn};

use caligo_core::FieldElement;
use caligo_tree::MerkleProof;

use crate::api::{PrepareRequest, PrepareResponse, StatusResponse, SubmitRequest, SubmitResponse};
use crate::backend::{ProofBundle, ProvingBackend, SignalVector};
use crate::error::{RelayerError, Result};
use crate::state::RequestTracker;

/// a checked submit either went through directly or was recovered from
/// the status endpoint after a transport failure
#[derive(Debug)]
pub enum SubmitOutcome {
    Submitted(SubmitResponse),
    Recovered(StatusResponse),
}

pub struct RelayerClient {
    http: reqwest::Client,
    base: String,
}

impl RelayerClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
        }
    }

    /// fresh idempotency reference for one submit
    pub fn new_reference() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub async fn prepare(&self, req: &PrepareRequest) -> Result<PrepareResponse> {
        let response = self
            .http
            .post(format!("{}/v1/prepare", self.base))
            .json(req)
            .send()
            .await
            .map_err(transport)?;
        let response: PrepareResponse = check(response).await?.json().await.map_err(transport)?;
        verify_prepare(&response)?;
        Ok(response)
    }

    pub async fn submit(&self, req: &SubmitRequest) -> Result<SubmitResponse> {
        let response = self
            .http
            .post(format!("{}/v1/submit", self.base))
            .json(req)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }

    pub async fn status(&self, reference: &str) -> Result<StatusResponse> {
        let response = self
            .http
            .get(format!("{}/v1/status/{}", self.base, reference))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }

    /// submit with loss-safe recovery
    ///
    /// a transport failure leaves the request in an unknown state: the
    /// server may have settled it before the connection died. instead of
    /// resubmitting (which a non-idempotent server would double-apply),
    /// ask the status endpoint whether our reference landed.
    pub async fn submit_checked(&self, req: &SubmitRequest) -> Result<SubmitOutcome> {
        match self.submit(req).await {
            Ok(response) => Ok(SubmitOutcome::Submitted(response)),
            Err(e) if e.is_retryable() => {
                warn!(
                    "submit transport failure for {}, checking status: {}",
                    req.reference, e
                );
                match self.status(&req.reference).await {
                    Ok(status) => {
                        debug!("reference {} settled despite the failure", req.reference);
                        Ok(SubmitOutcome::Recovered(status))
                    }
                    // never landed; surface the original failure
                    Err(RelayerError::NotFound(_)) => Err(e),
                    Err(status_err) => Err(status_err),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// drive one request through its whole lifecycle
    ///
    /// `witness` derives the proving input from the verified prepare
    /// response; `build` assembles the submit request from the proof
    /// bundle. the returned tracker ends in `confirmed` or `failed`.
    pub async fn execute<W, B>(
        &self,
        prepare_req: &PrepareRequest,
        backend: &dyn ProvingBackend,
        witness: W,
        build: B,
    ) -> (RequestTracker, Result<SubmitOutcome>)
    where
        W: FnOnce(&PrepareResponse) -> Result<SignalVector>,
        B: FnOnce(&PrepareResponse, &ProofBundle) -> SubmitRequest,
    {
        let reference = Self::new_reference();
        let mut tracker = RequestTracker::new(reference);

        let prepared = match self.prepare(prepare_req).await {
            Ok(p) => p,
            Err(e) => return (tracker, Err(e)),
        };

        if let Err(e) = tracker.begin_proving() {
            return (tracker, Err(e));
        }
        let bundle = match witness(&prepared).and_then(|w| backend.prove(&w)) {
            Ok(b) => b,
            Err(e) => {
                let _ = tracker.failed();
                return (tracker, Err(e));
            }
        };

        let mut submit_req = build(&prepared, &bundle);
        submit_req.reference = tracker.reference().to_string();
        if let Err(e) = tracker.submitted() {
            return (tracker, Err(e));
        }
        match self.submit_checked(&submit_req).await {
            Ok(outcome) => {
                let _ = tracker.confirmed();
                (tracker, Ok(outcome))
            }
            Err(e) => {
                let _ = tracker.failed();
                (tracker, Err(e))
            }
        }
    }
}

/// re-fold the prepare path locally; the server's word is not enough
fn verify_prepare(response: &PrepareResponse) -> Result<()> {
    let root = parse("root", &response.root)?;
    let (Some(leaf), Some(index)) = (&response.leaf, response.leaf_index) else {
        // deposit prepare carries no path
        return Ok(());
    };
    let proof = MerkleProof {
        root,
        leaf: parse("leaf", leaf)?,
        index,
        siblings: response
            .path_elements
            .iter()
            .map(|s| parse("path element", s))
            .collect::<Result<Vec<_>>>()?,
    };
    if !proof.verify() {
        return Err(RelayerError::RootMismatch(format!(
            "server claims root {} but the returned path folds to {}",
            response.root,
            proof.fold().to_hex()
        )));
    }
    Ok(())
}

fn parse(name: &str, value: &str) -> Result<FieldElement> {
    FieldElement::parse(value).map_err(|e| RelayerError::validation(format!("{name}: {e}")))
}

fn transport(e: reqwest::Error) -> RelayerError {
    RelayerError::Transport(e.to_string())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        400 => RelayerError::Validation(text),
        404 => RelayerError::NotFound(text),
        409 if text.contains("root mismatch") => RelayerError::RootMismatch(text),
        409 => RelayerError::DoubleSpend(text),
        422 => RelayerError::ProofRejected,
        _ => RelayerError::Transport(format!("{status}: {text}")),
    })
}
