pub mod health;
pub mod webhooks;

use crate::notify::Notifier;
use crate::payments::providers::{ProviderProfile, ROUTES};
use crate::payments::reconcile::Reconciler;
use crate::payments::signature::SignatureVerifier;
use crate::payments::types::Provider;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::body::Bytes;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Shared state of the webhook service, fixed at startup
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub verifier: Arc<SignatureVerifier>,
    pub notifier: Arc<dyn Notifier>,
    profiles: Arc<HashMap<Provider, ProviderProfile>>,
}

impl AppState {
    pub fn new(
        reconciler: Arc<Reconciler>,
        verifier: SignatureVerifier,
        notifier: Arc<dyn Notifier>,
        profiles: impl IntoIterator<Item = ProviderProfile>,
    ) -> Self {
        Self {
            reconciler,
            verifier: Arc::new(verifier),
            notifier,
            profiles: Arc::new(
                profiles
                    .into_iter()
                    .map(|profile| (profile.provider, profile))
                    .collect(),
            ),
        }
    }

    /// Profile of `provider`; unknown providers get the strict default
    pub fn profile(&self, provider: Provider) -> ProviderProfile {
        self.profiles
            .get(&provider)
            .copied()
            .unwrap_or_else(|| match provider {
                Provider::LinkQu => ProviderProfile::linkqu(),
                Provider::PakaiLink => ProviderProfile::pakailink(true),
            })
    }
}

/// Build the service router: the liveness check plus one POST route per
/// entry of the webhook route table
pub fn router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health::health_check));

    for route in ROUTES.iter() {
        router = router.route(
            route.path,
            post(
                move |State(state): State<AppState>,
                      connect_info: Option<ConnectInfo<SocketAddr>>,
                      headers: HeaderMap,
                      body: Bytes| async move {
                    let peer = connect_info.map(|ConnectInfo(addr)| addr);
                    webhooks::receive_callback(state, route, headers, peer, body).await
                },
            ),
        );
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
