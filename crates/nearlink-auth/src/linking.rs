//! Request-side linking operations
//!
//! Implements the linking flow seen by the two clients:
//! 1. The desktop starts an attempt and shows the QR payload (sid + server URL)
//! 2. The phone scans it, fetches the challenge for that sid, and starts
//!    advertising the sid over BLE
//! 3. The scanner confirms the phone is within range (see [`crate::proximity`])
//! 4. The phone completes the passkey ceremony and calls finish; the session is
//!    linked only if step 3 already happened
//! 5. The desktop polls status until `linked` flips

use crate::registry::SessionRegistry;
use crate::session::{LinkError, LinkResult, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Payload encoded into the QR code shown on the desktop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeData {
    pub sid: String,
    /// Relying party id for the passkey ceremony
    pub rp_id: String,
    /// Server URL the phone talks to
    pub url: String,
}

/// Response when starting a linking attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStartResponse {
    pub sid: String,
    pub challenge: String,
    /// Data for the linking UI
    pub qr: QrCodeData,
    /// Image URL on the external QR service rendering `qr`
    pub qr_image_url: String,
}

/// Parameters the phone needs to run the passkey ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairParams {
    pub challenge: String,
    pub session_id: String,
}

/// Request to complete linking after the passkey ceremony
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRequest {
    pub session_id: String,
    pub user_id: String,
}

/// Response after successful linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishResponse {
    pub status: String,
}

/// Polled by the desktop while the attempt is in progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub proximity_confirmed: bool,
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Manages linking attempts on top of the session registry
pub struct LinkingManager {
    registry: Arc<SessionRegistry>,
    /// Relying party id for QR payloads
    rp_id: String,
    /// Server URL for QR payloads
    server_url: String,
    /// Base URL of the external QR image service
    qr_service_url: String,
}

impl LinkingManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rp_id: String,
        server_url: String,
        qr_service_url: String,
    ) -> Self {
        Self {
            registry,
            rp_id,
            server_url,
            qr_service_url,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// Start a new linking attempt
    pub async fn start_linking(&self) -> LinkStartResponse {
        let session = self.registry.create().await;

        let qr = QrCodeData {
            sid: session.sid.clone(),
            rp_id: self.rp_id.clone(),
            url: self.server_url.clone(),
        };
        let qr_image_url = self.qr_image_url(&qr);

        info!("New linking session created for sid={}", session.sid);

        LinkStartResponse {
            sid: session.sid,
            challenge: session.challenge,
            qr,
            qr_image_url,
        }
    }

    /// Challenge and session id for a sid
    pub async fn pair_params(&self, sid: &str) -> LinkResult<PairParams> {
        let session = self
            .registry
            .by_sid(sid)
            .await
            .ok_or(LinkError::UnknownSession)?;

        info!("Pairing parameters requested for sid={}", sid);

        Ok(PairParams {
            challenge: session.challenge,
            session_id: session.id.to_string(),
        })
    }

    /// Complete linking. Refused unless the phone was seen nearby first.
    pub async fn finish(&self, request: FinishRequest) -> LinkResult<FinishResponse> {
        let id = SessionId::parse(&request.session_id).map_err(|_| LinkError::UnknownSession)?;

        let outcome = self
            .registry
            .update(&id, |s| {
                let previous = s.user_id.clone();
                s.finish(&request.user_id).map(|_| previous)
            })
            .await
            .ok_or(LinkError::UnknownSession)?;

        match &outcome {
            Ok(Some(previous)) if previous != &request.user_id => {
                warn!(
                    "Session {} already linked to another user; keeping user={}",
                    id, previous
                );
            }
            Ok(_) => {
                info!("Linked session={} user={}", id, request.user_id);
            }
            Err(LinkError::ProximityNotVerified) => {
                warn!(
                    "Rejected link for session={}: BLE not verified (<0.5 m required)",
                    id
                );
            }
            Err(_) => {}
        }

        outcome.map(|_| FinishResponse {
            status: "ok".to_string(),
        })
    }

    /// Status for a sid. Unknown sids report the all-false default.
    pub async fn status(&self, sid: &str) -> LinkStatus {
        match self.registry.by_sid(sid).await {
            Some(session) => LinkStatus {
                proximity_confirmed: session.proximity_confirmed(),
                linked: session.linked(),
                user_id: session.user_id,
            },
            None => {
                warn!("Status requested for unknown sid={}", sid);
                LinkStatus::default()
            }
        }
    }

    fn qr_image_url(&self, qr: &QrCodeData) -> String {
        let payload = serde_json::to_string(qr).unwrap_or_default();
        format!(
            "{}?data={}&size=240x240",
            self.qr_service_url,
            urlencoding(&payload)
        )
    }
}

/// Percent-encode everything outside the unreserved set
fn urlencoding(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
