//! Validating admission webhook for Namespaces.
//!
//! `POST /validate` decodes the AdmissionReview, decides what the label change
//! means for backups, lets the orchestrator act on it, and answers `allowed`.
//! Only a malformed request (400) or missing cluster credentials (500) turn
//! into an error response; backup failures are logged and swallowed.
//! `GET /health` answers `ok` for liveness and readiness probes.

use std::sync::Arc;
use std::time::Duration;

use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::Deserialize;
use tracing::{debug, error, info, Instrument};
use warp::hyper::body::Bytes;
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::config::ServerSettings;
use crate::error::{Error, Result};
use crate::orchestrator::{BackupOrchestrator, Deadline, OrchestrationReport};
use crate::target::NamespaceSnapshot;
use crate::transition::{decide, TransitionIntent};

/// Serve the webhook routes over HTTPS. Returns a future that runs forever.
pub async fn run(server: ServerSettings, orchestrator: Arc<BackupOrchestrator>) {
    info!(addr = %server.addr, "listening for admission requests");
    warp::serve(routes(orchestrator))
        .tls()
        .cert_path(&server.tls_cert)
        .key_path(&server.tls_key)
        .run(server.addr)
        .await;
}

/// Query parameters the API server adds to webhook calls.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    /// The webhook's `timeoutSeconds`, as a Go duration such as `10s`.
    pub timeout: Option<String>,
}

impl ReviewQuery {
    /// The caller's timeout, if it sent one we can read.
    pub fn caller_timeout(&self) -> Option<Duration> {
        let raw = self.timeout.as_deref()?;
        let timeout = parse_go_duration(raw);
        if timeout.is_none() {
            debug!(timeout = %raw, "ignoring unreadable caller timeout");
        }
        timeout
    }
}

pub fn routes(
    orchestrator: Arc<BackupOrchestrator>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let validate = warp::post()
        .and(warp::path("validate"))
        .and(warp::path::end())
        .and(warp::query::<ReviewQuery>())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(warp::any().map(move || orchestrator.clone()))
        .then(
            |query: ReviewQuery,
             content_type: Option<String>,
             body: Bytes,
             orchestrator: Arc<BackupOrchestrator>| async move {
                let deadline = orchestrator.deadline_within(query.caller_timeout());
                match review(&orchestrator, deadline, content_type.as_deref(), &body).await {
                    Ok(review) => warp::reply::json(&review).into_response(),
                    Err(e) => {
                        error!(error = %e, "rejecting admission request");
                        warp::reply::with_status(e.to_string(), e.status_code()).into_response()
                    }
                }
            },
        );

    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .map(|| {
            debug!("healthy");
            warp::reply::with_status("ok", warp::http::StatusCode::OK).into_response()
        });

    validate.or(health).unify()
}

/// Handle one admission call end to end. Every cluster call, `connect`
/// included, has to finish by `deadline`.
pub async fn review(
    orchestrator: &BackupOrchestrator,
    deadline: Deadline,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<AdmissionReview<DynamicObject>> {
    let req = parse_request(content_type, body)?;
    let span = tracing::info_span!(
        "admission",
        uid = %req.uid,
        operation = ?req.operation,
        budget = ?deadline.budget()
    );
    admit(orchestrator, deadline, &req).instrument(span).await
}

async fn admit(
    orchestrator: &BackupOrchestrator,
    deadline: Deadline,
    req: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionReview<DynamicObject>> {
    let (old, new) = decode_snapshots(req)?;
    let old_target = old.as_ref().map(NamespaceSnapshot::target);
    let new_target = new.as_ref().map(NamespaceSnapshot::target);
    let intent = decide(&req.operation, old_target.as_ref(), new_target.as_ref());

    if intent != TransitionIntent::NoOp {
        orchestrator.connect(deadline).await?;
    }

    let namespace = new
        .or(old)
        .map(|snapshot| snapshot.name)
        .unwrap_or_default();
    let report = orchestrator.apply(intent, &namespace, deadline).await;
    absorb_soft_failures(report);

    Ok(AdmissionResponse::from(req).into_review())
}

/// Validate the HTTP envelope and extract the admission request.
pub fn parse_request(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<AdmissionRequest<DynamicObject>> {
    let content_type = content_type.unwrap_or_default();
    if !is_json(content_type) {
        return Err(Error::ContentType(content_type.to_string()));
    }
    if body.is_empty() {
        return Err(Error::EmptyBody);
    }

    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(Error::Envelope)?;
    review.try_into().map_err(|_| Error::MissingRequest)
}

/// Parse a Go `time.Duration` string such as `10s`, `1m30s` or `2.5s`.
///
/// Supports the `h`, `m`, `s`, `ms`, `us`/`µs` and `ns` units.
pub fn parse_go_duration(s: &str) -> Option<Duration> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut total = 0f64;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * seconds;
    }

    Duration::try_from_secs_f64(total).ok()
}

/// `application/json`, optionally followed by parameters such as a charset.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

/// Decode the objects the operation requires: the new namespace for CREATE
/// and UPDATE, the old one for UPDATE and DELETE.
fn decode_snapshots(
    req: &AdmissionRequest<DynamicObject>,
) -> Result<(Option<NamespaceSnapshot>, Option<NamespaceSnapshot>)> {
    let new = || NamespaceSnapshot::decode(req.object.as_ref(), "");
    let old = || NamespaceSnapshot::decode(req.old_object.as_ref(), "old ");

    match req.operation {
        Operation::Create => {
            let new = new()?;
            info!(namespace = %new.name, "Namespace created");
            Ok((None, Some(new)))
        }
        Operation::Update => {
            let new = new()?;
            info!(namespace = %new.name, "Namespace updated");
            Ok((Some(old()?), Some(new)))
        }
        Operation::Delete => {
            let old = old()?;
            info!(namespace = %old.name, "Namespace deleted");
            Ok((Some(old), None))
        }
        _ => Ok((None, None)),
    }
}

/// The one place orchestration failures are dropped.
///
/// Backup failures never change the admission decision; they are logged here
/// and the number of dropped errors is returned.
pub fn absorb_soft_failures(report: OrchestrationReport) -> usize {
    let errors = report.backend_errors();
    for (kind, e) in &errors {
        error!(
            namespace = %report.namespace,
            intent = ?report.intent,
            %kind,
            error = %e,
            "failed to converge Velero resource"
        );
    }
    errors.len()
}
