use crate::phone;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Batch sending
// ---------------------------------------------------------------------------

/// One recipient of a batch send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub normalized_phone_e164: Option<String>,
    #[serde(default)]
    pub national_phone_number: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub google_place_id: Option<String>,
}

/// Treat `""` like a missing value, the way place items carry absent ids.
fn blank_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.filter(|s| !s.trim().is_empty()))
}

impl Contact {
    /// Digits-only number used for dispatch, if any phone field is usable.
    pub fn dispatch_phone(&self) -> Option<String> {
        phone::resolve(
            self.normalized_phone_e164.as_deref(),
            self.national_phone_number.as_deref(),
        )
    }

    pub fn is_eligible(&self) -> bool {
        self.dispatch_phone().is_some()
    }

    /// Best raw phone value for display when no usable number exists.
    pub fn raw_phone(&self) -> &str {
        self.normalized_phone_e164
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.national_phone_number.as_deref())
            .unwrap_or("")
    }
}

impl From<PlaceItem> for Contact {
    fn from(p: PlaceItem) -> Self {
        Self {
            id: p.id,
            display_name: p.display_name,
            normalized_phone_e164: p.normalized_phone_e164,
            national_phone_number: p.national_phone_number,
            google_place_id: Some(p.google_place_id).filter(|s| !s.is_empty()),
        }
    }
}

/// Contact fields frozen into a [`SendResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSnapshot {
    pub id: String,
    pub display_name: String,
    /// Number actually used (digits only), or the raw value when unusable.
    pub phone: String,
    #[serde(default)]
    pub normalized_phone_e164: Option<String>,
    #[serde(default)]
    pub national_phone_number: Option<String>,
}

impl ContactSnapshot {
    pub fn new(contact: &Contact, phone: impl Into<String>) -> Self {
        Self {
            id: contact.id.clone(),
            display_name: contact.display_name.clone(),
            phone: phone.into(),
            normalized_phone_e164: contact.normalized_phone_e164.clone(),
            national_phone_number: contact.national_phone_number.clone(),
        }
    }

    /// Whether `phone` came from the E.164 field, i.e. already carries the country code.
    pub fn dispatched_via_e164(&self) -> bool {
        self.normalized_phone_e164
            .as_deref()
            .and_then(phone::normalize)
            .is_some_and(|digits| digits == self.phone)
    }
}

/// Outcome of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub contact: ContactSnapshot,
    #[serde(default)]
    pub error: Option<String>,
    /// Dispatch round trip; `None` when the API was never called.
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchPhase {
    #[default]
    Idle,
    Waiting,
    Sending,
    Completed,
    Cancelled,
}

impl BatchPhase {
    pub fn is_running(self) -> bool {
        matches!(self, BatchPhase::Waiting | BatchPhase::Sending)
    }

    pub fn label(self) -> &'static str {
        match self {
            BatchPhase::Idle => "idle",
            BatchPhase::Waiting => "waiting",
            BatchPhase::Sending => "sending",
            BatchPhase::Completed => "completed",
            BatchPhase::Cancelled => "cancelled",
        }
    }
}

/// Live state of the sending orchestrator, published to observers as a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    pub phase: BatchPhase,
    pub step: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub current_index: usize,
    pub current_contact: Option<Contact>,
    pub total_contacts: usize,
    pub countdown_secs: u64,
    pub results: Vec<SendResult>,
    pub cancel_requested: bool,
}

impl BatchState {
    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    pub fn remaining(&self) -> usize {
        self.total_contacts.saturating_sub(self.processed())
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_contacts == 0 {
            return 0.0;
        }
        (self.processed() as f64 / self.total_contacts as f64) * 100.0
    }
}

/// How long to wait between two consecutive sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pacing {
    Fixed {
        #[serde(with = "humantime_serde")]
        interval: Duration,
    },
    /// Uniformly random whole seconds in `[min, max]`, drawn before every wait.
    Range {
        #[serde(with = "humantime_serde")]
        min: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl Pacing {
    /// Interval presets offered to operators for campaign-style sends.
    pub const PRESETS: [(&'static str, u64, u64); 5] = [
        ("30s - 2m", 30, 120),
        ("30s - 3m", 30, 180),
        ("1m - 3m", 60, 180),
        ("1m - 5m", 60, 300),
        ("1m - 10m", 60, 600),
    ];

    pub fn fixed_secs(secs: u64) -> Self {
        Pacing::Fixed {
            interval: Duration::from_secs(secs),
        }
    }

    /// Next wait in whole seconds.
    pub fn next_wait_secs<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match *self {
            Pacing::Fixed { interval } => interval.as_secs(),
            Pacing::Range { min, max } => {
                let (lo, hi) = (min.as_secs(), max.as_secs());
                if hi <= lo {
                    lo
                } else {
                    rng.gen_range(lo..=hi)
                }
            }
        }
    }

    pub fn describe(&self) -> String {
        match *self {
            Pacing::Fixed { interval } => format!("every {}s", interval.as_secs()),
            Pacing::Range { min, max } => {
                format!("every {}-{}s", min.as_secs(), max.as_secs())
            }
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing::fixed_secs(30)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed,
    Cancelled,
}

/// Final record of a batch run, persisted and exported after completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    #[serde(default)]
    pub started_at_utc: String,
    #[serde(default)]
    pub finished_at_utc: String,
    pub message: String,
    pub pacing: Pacing,
    pub total_contacts: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub outcome: BatchOutcome,
    pub results: Vec<SendResult>,
}

impl BatchReport {
    pub fn success_rate(&self) -> Option<f64> {
        let processed = self.success_count + self.failure_count;
        if processed == 0 {
            return None;
        }
        Some(self.success_count as f64 / processed as f64)
    }
}

/// Timestamp formatted the way reports store it.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

// ---------------------------------------------------------------------------
// Prospect API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub text: String,
    /// Digits only, no leading `+`.
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_place_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Paginated listing envelope returned by every list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Enriched,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Niche {
    pub id: String,
    pub display_name: String,
    pub standardized_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub niche: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub google_place_id: String,
    pub display_name: String,
    pub niche_searched: String,
    #[serde(default)]
    pub google_primary_category: Option<String>,
    #[serde(default)]
    pub website_uri: Option<String>,
    #[serde(default)]
    pub normalized_phone_e164: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub enrichment_status: EnrichmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub total_fetched: u64,
    pub new_saved_count: u64,
    pub already_existing_count: u64,
    pub enriched_count: u64,
    pub failed_count: u64,
    pub pending_count: u64,
    pub items: Vec<ReportItem>,
}

/// Stored prospect record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceItem {
    pub id: String,
    #[serde(default)]
    pub google_place_id: String,
    pub display_name: String,
    #[serde(default)]
    pub niche_searched: String,
    #[serde(default)]
    pub google_primary_category: Option<String>,
    #[serde(default)]
    pub website_uri: Option<String>,
    #[serde(default)]
    pub national_phone_number: Option<String>,
    #[serde(default)]
    pub normalized_phone_e164: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub first_message_sent: bool,
    #[serde(default)]
    pub first_message_sent_at: Option<String>,
    #[serde(default)]
    pub first_message_failed: Option<bool>,
    #[serde(default)]
    pub enrichment_status: Option<EnrichmentStatus>,
}

/// Filters for the places listing. `None` fields are omitted from the query string.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlacesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_website: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub niche_searched: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message_sent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_primary_category_like: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_first_message_failed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub template_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub id: String,
    pub title: String,
    pub content: String,
    pub message_type_id: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub interval_min: Option<u64>,
    #[serde(default)]
    pub interval_max: Option<u64>,
    pub total_recipients: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub pending_count: u64,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCampaignsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CampaignStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_external: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientPlace {
    pub id: String,
    #[serde(default)]
    pub google_place_id: String,
    pub display_name: String,
    #[serde(default)]
    pub normalized_phone_e164: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRecipient {
    pub id: String,
    pub status: RecipientStatus,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub place: RecipientPlace,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecipientsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecipientStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub place_ids: Vec<String>,
    pub message_type_id: String,
    pub interval_min: u64,
    pub interval_max: u64,
    pub name: String,
    pub notify_phones: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreateResponse {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub total_recipients: u64,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn contact(e164: Option<&str>, national: Option<&str>) -> Contact {
        Contact {
            id: "1".into(),
            display_name: "Padaria".into(),
            normalized_phone_e164: e164.map(Into::into),
            national_phone_number: national.map(Into::into),
            google_place_id: None,
        }
    }

    #[test]
    fn eligibility_follows_phone_fields() {
        assert!(contact(Some("+5511999990000"), None).is_eligible());
        assert!(contact(None, Some("(11) 3333-4444")).is_eligible());
        assert!(!contact(Some(""), Some("123")).is_eligible());
        assert!(!contact(None, None).is_eligible());
    }

    #[test]
    fn place_item_json_parses_as_contact() {
        let data = r#"[
            {"id": "1", "displayName": "Padaria", "googlePlaceId": "",
             "nicheSearched": "padaria", "nationalPhoneNumber": "(11) 4002-8922",
             "firstMessageSent": false},
            {"id": "2", "displayName": "Mercado", "googlePlaceId": "ChIJ123",
             "normalizedPhoneE164": "+5511999990000"}
        ]"#;
        let contacts: Vec<Contact> = serde_json::from_str(data).unwrap();
        assert_eq!(contacts[0].google_place_id, None);
        assert_eq!(contacts[0].dispatch_phone().as_deref(), Some("1140028922"));
        assert_eq!(contacts[1].google_place_id.as_deref(), Some("ChIJ123"));
    }

    #[test]
    fn snapshot_knows_which_field_was_dialed() {
        let c = contact(Some("+55 11 99999-0000"), Some("(11) 3333-4444"));
        assert!(ContactSnapshot::new(&c, c.dispatch_phone().unwrap()).dispatched_via_e164());
        let c = contact(None, Some("(11) 3333-4444"));
        assert!(!ContactSnapshot::new(&c, c.dispatch_phone().unwrap()).dispatched_via_e164());
    }

    #[test]
    fn progress_is_derived_from_counts() {
        let state = BatchState {
            success_count: 2,
            failure_count: 1,
            total_contacts: 4,
            ..Default::default()
        };
        assert_eq!(state.processed(), 3);
        assert_eq!(state.remaining(), 1);
        assert!((state.progress_percent() - 75.0).abs() < 1e-9);
        assert_eq!(BatchState::default().progress_percent(), 0.0);
    }

    #[test]
    fn range_pacing_stays_in_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let pacing = Pacing::Range {
            min: Duration::from_secs(30),
            max: Duration::from_secs(120),
        };
        for _ in 0..200 {
            let s = pacing.next_wait_secs(&mut rng);
            assert!((30..=120).contains(&s));
        }
        assert_eq!(Pacing::fixed_secs(5).next_wait_secs(&mut rng), 5);
    }

    #[test]
    fn place_item_decodes_from_api_shape() {
        let json = r#"{
            "id": "p1",
            "googlePlaceId": "ChIJ123",
            "displayName": "Oficina do Zé",
            "nicheSearched": "mecanica",
            "nationalPhoneNumber": "(11) 4002-8922",
            "normalizedPhoneE164": null,
            "firstMessageSent": false,
            "enrichmentStatus": "enriched",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }"#;
        let place: PlaceItem = serde_json::from_str(json).unwrap();
        let c = Contact::from(place);
        assert_eq!(c.google_place_id.as_deref(), Some("ChIJ123"));
        assert_eq!(c.dispatch_phone().as_deref(), Some("1140028922"));
    }

    #[test]
    fn send_payload_omits_missing_place_id() {
        let payload = SendMessagePayload {
            text: "oi".into(),
            number: "5511999990000".into(),
            google_place_id: None,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "text": "oi", "number": "5511999990000" })
        );
    }
}
