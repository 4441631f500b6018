//! Provider webhook endpoint
//!
//! Every route answers `200 {"responseCode":"2002800","responseMessage":"Successful"}`
//! whatever happens while processing; failures are reported through the notifier.

use super::AppState;
use crate::notify::{Notification, Severity};
use crate::payments::providers::{parse_event, WebhookRoute};
use crate::payments::signature::{Authentication, CallbackHeaders};
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub const ACK_RESPONSE_CODE: &str = "2002800";
pub const ACK_RESPONSE_MESSAGE: &str = "Successful";

const CLIENT_ID_HEADER: &str = "client-id";
const CLIENT_SECRET_HEADER: &str = "client-secret";
const TIMESTAMP_HEADER: &str = "x-timestamp";
const SIGNATURE_HEADER: &str = "x-signature";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub response_code: &'static str,
    pub response_message: &'static str,
}

pub fn acknowledgement() -> (StatusCode, Json<Acknowledgement>) {
    (
        StatusCode::OK,
        Json(Acknowledgement {
            response_code: ACK_RESPONSE_CODE,
            response_message: ACK_RESPONSE_MESSAGE,
        }),
    )
}

pub async fn receive_callback(
    state: AppState,
    route: &'static WebhookRoute,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Bytes,
) -> (StatusCode, Json<Acknowledgement>) {
    let profile = state.profile(route.provider);
    let callback_headers = extract_callback_headers(&headers);

    let authentication = state.verifier.authenticate(
        route.provider,
        profile.require_signature,
        &callback_headers,
        "POST",
        route.path,
        &body,
    );

    match authentication {
        Authentication::Rejected { reason } => {
            let client_ip = client_ip(&headers, peer);
            let client_id = callback_headers.client_id.as_deref().unwrap_or("-");
            warn!(
                path = route.path,
                provider = %route.provider,
                client_ip = %client_ip,
                client_id,
                reason,
                "Unauthorized callback attempt"
            );
            let notification = Notification::new(Severity::Security, "Unauthorized Callback Attempt")
                .field("Source", route.source())
                .field("IP Address", &client_ip)
                .field("Client ID", client_id)
                .field("Reason", reason);
            state.notifier.send(&notification).await;
            return acknowledgement();
        }
        Authentication::Unsigned => {
            debug!(path = route.path, "Accepting unsigned callback");
        }
        Authentication::Verified => {}
    }

    let event = match parse_event(route, &profile, &body, Utc::now()) {
        Ok(event) => event,
        Err(e) => {
            warn!(path = route.path, provider = %route.provider, "Rejected callback body: {}", e);
            let notification = Notification::new(Severity::Warning, "Callback Error")
                .field("Source", route.source())
                .field("Issue", &e);
            state.notifier.send(&notification).await;
            return acknowledgement();
        }
    };

    let outcome = state.reconciler.handle(&event).await;
    info!(
        reference = %event.reference,
        provider = %event.provider,
        flow = %event.flow,
        outcome = ?outcome,
        "Callback processed"
    );

    acknowledgement()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn extract_callback_headers(headers: &HeaderMap) -> CallbackHeaders {
    CallbackHeaders {
        client_id: header_value(headers, CLIENT_ID_HEADER),
        client_secret: header_value(headers, CLIENT_SECRET_HEADER),
        timestamp: header_value(headers, TIMESTAMP_HEADER),
        signature: header_value(headers, SIGNATURE_HEADER),
    }
}

/// First `X-Forwarded-For` hop, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_value(headers, FORWARDED_FOR_HEADER)
        .and_then(|forwarded| {
            forwarded
                .split(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
                .map(str::to_string)
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
