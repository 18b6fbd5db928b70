// Common test utilities and helpers for all test modules
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanohub::auth::{CertAuthRetriever, CertVerifier, MdmSignatureVerifier};
use nanohub::cmdservice::{MdmEventReceiver, TokenUpdateTallyStore, WorkflowCheckin};
use nanohub::core::errors::{BoxError, EngineError};
use nanohub::core::models::{CallContext, CertHash, Certificate, MdmContext, MdmRequest};
use nanohub::ddm::{EnrollmentDeclarationStorage, EnrollmentSetRemover, StatusReport, StatusStorer};
use nanohub::enqueue::{ApiResult, RawCommandEnqueuer};
use nanohub::mdm::{
    Authenticate, CommandResults, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
use nanohub::service::{CertAuthStore, DumpWriter, EnrollmentStore};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

/// One recorded enqueue call: (raw command, ids, no_push)
pub type EnqueueCall = (Option<Vec<u8>>, Vec<String>, bool);

/// In-memory storage implementing every hub storage trait
pub struct MockStore {
    pub calls: Mutex<Vec<String>>,
    pub cert_hashes: Mutex<HashMap<String, String>>,
    pub tally: u64,
    pub tally_should_fail: bool,
    pub store_should_fail: bool,
    pub tokens: Vec<u8>,
    pub declaration_items: Vec<u8>,
    pub declarations: HashMap<(String, String), Vec<u8>>,
    pub dm_should_fail: bool,
    pub status_reports: Mutex<Vec<(String, StatusReport)>>,
    pub status_should_fail: bool,
    pub removed_sets: Mutex<Vec<String>>,
    pub enqueued: Mutex<Vec<EnqueueCall>>,
    pub api_result: ApiResult,
    pub enqueue_should_fail: bool,
    pub bootstrap_token: Mutex<Option<Vec<u8>>>,
    pub retriever_contexts: Mutex<Vec<CallContext>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            cert_hashes: Mutex::new(HashMap::new()),
            tally: 0,
            tally_should_fail: false,
            store_should_fail: false,
            tokens: br#"{"SyncTokens":{"DeclarationsToken":"abc"}}"#.to_vec(),
            declaration_items: br#"{"Declarations":{}}"#.to_vec(),
            declarations: HashMap::new(),
            dm_should_fail: false,
            status_reports: Mutex::new(Vec::new()),
            status_should_fail: false,
            removed_sets: Mutex::new(Vec::new()),
            enqueued: Mutex::new(Vec::new()),
            api_result: ApiResult::default(),
            enqueue_should_fail: false,
            bootstrap_token: Mutex::new(None),
            retriever_contexts: Mutex::new(Vec::new()),
        }
    }
}

impl MockStore {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn associate(&self, id: &str, cert: &Certificate) {
        self.cert_hashes
            .lock()
            .unwrap()
            .insert(id.to_string(), cert.hash().as_str().to_string());
    }

    pub fn hash_for(&self, id: &str) -> Option<String> {
        self.cert_hashes.lock().unwrap().get(id).cloned()
    }

    fn fail(&self) -> Result<(), BoxError> {
        if self.store_should_fail {
            return Err("database unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentStore for MockStore {
    async fn store_authenticate(&self, r: &MdmRequest, _m: &Authenticate) -> Result<(), BoxError> {
        self.fail()?;
        self.record(format!("store_authenticate:{}", r.id));
        Ok(())
    }

    async fn store_token_update(&self, r: &MdmRequest, _m: &TokenUpdate) -> Result<(), BoxError> {
        self.fail()?;
        self.record(format!("store_token_update:{}", r.id));
        Ok(())
    }

    async fn clear_queue(&self, r: &MdmRequest) -> Result<(), BoxError> {
        self.record(format!("clear_queue:{}", r.id));
        Ok(())
    }

    async fn disable(&self, r: &MdmRequest) -> Result<(), BoxError> {
        self.record(format!("disable:{}", r.id));
        Ok(())
    }

    async fn store_command_report(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<(), BoxError> {
        self.fail()?;
        self.record(format!("store_command_report:{}:{}", r.id, results.status));
        Ok(())
    }

    async fn retrieve_next_command(
        &self,
        r: &MdmRequest,
        skip_not_now: bool,
    ) -> Result<Option<nanohub::mdm::Command>, BoxError> {
        self.record(format!("retrieve_next_command:{}:{}", r.id, skip_not_now));
        Ok(None)
    }

    async fn store_user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<(), BoxError> {
        self.fail()?;
        self.record(format!(
            "store_user_authenticate:{}:{}",
            r.id,
            m.digest_response.is_some()
        ));
        Ok(())
    }

    async fn store_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), BoxError> {
        self.fail()?;
        self.record(format!("store_bootstrap_token:{}", r.id));
        let token = (!m.bootstrap_token.is_empty()).then(|| m.bootstrap_token.clone());
        *self.bootstrap_token.lock().unwrap() = token;
        Ok(())
    }

    async fn retrieve_bootstrap_token(&self, r: &MdmRequest) -> Result<Option<Vec<u8>>, BoxError> {
        self.fail()?;
        self.record(format!("retrieve_bootstrap_token:{}", r.id));
        Ok(self.bootstrap_token.lock().unwrap().clone())
    }
}

#[async_trait]
impl CertAuthStore for MockStore {
    async fn has_cert_hash(&self, _r: &MdmRequest, hash: &CertHash) -> Result<bool, BoxError> {
        Ok(self
            .cert_hashes
            .lock()
            .unwrap()
            .values()
            .any(|h| h == hash.as_str()))
    }

    async fn enrollment_has_cert_hash(&self, r: &MdmRequest) -> Result<bool, BoxError> {
        Ok(self.cert_hashes.lock().unwrap().contains_key(&r.id))
    }

    async fn is_cert_hash_associated(
        &self,
        r: &MdmRequest,
        hash: &CertHash,
    ) -> Result<bool, BoxError> {
        Ok(self.hash_for(&r.id).as_deref() == Some(hash.as_str()))
    }

    async fn associate_cert_hash(&self, r: &MdmRequest, hash: &CertHash) -> Result<(), BoxError> {
        self.cert_hashes
            .lock()
            .unwrap()
            .insert(r.id.clone(), hash.as_str().to_string());
        Ok(())
    }
}

#[async_trait]
impl CertAuthRetriever for MockStore {
    async fn enrollment_id_for_cert_hash(
        &self,
        ctx: &CallContext,
        hash: &CertHash,
    ) -> Result<Option<String>, BoxError> {
        self.retriever_contexts.lock().unwrap().push(ctx.clone());
        self.fail()?;
        Ok(self
            .cert_hashes
            .lock()
            .unwrap()
            .iter()
            .find(|(_, h)| h.as_str() == hash.as_str())
            .map(|(id, _)| id.clone()))
    }
}

#[async_trait]
impl TokenUpdateTallyStore for MockStore {
    async fn retrieve_token_update_tally(
        &self,
        _ctx: &CallContext,
        _id: &str,
    ) -> Result<u64, BoxError> {
        if self.tally_should_fail {
            return Err("tally unavailable".into());
        }
        Ok(self.tally)
    }
}

#[async_trait]
impl RawCommandEnqueuer for MockStore {
    async fn raw_command_enqueue_with_push(
        &self,
        _ctx: &CallContext,
        raw_command: Option<&[u8]>,
        ids: &[String],
        no_push: bool,
    ) -> Result<(ApiResult, u16), BoxError> {
        if self.enqueue_should_fail {
            return Err("push provider unavailable".into());
        }
        self.enqueued
            .lock()
            .unwrap()
            .push((raw_command.map(<[u8]>::to_vec), ids.to_vec(), no_push));
        Ok((self.api_result.clone(), 200))
    }
}

#[async_trait]
impl EnrollmentDeclarationStorage for MockStore {
    async fn retrieve_tokens_json(
        &self,
        _ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError> {
        if self.dm_should_fail {
            return Err("declarations unavailable".into());
        }
        self.record(format!("retrieve_tokens:{}", enrollment_id));
        Ok(self.tokens.clone())
    }

    async fn retrieve_declaration_items_json(
        &self,
        _ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError> {
        if self.dm_should_fail {
            return Err("declarations unavailable".into());
        }
        self.record(format!("retrieve_declaration_items:{}", enrollment_id));
        Ok(self.declaration_items.clone())
    }

    async fn retrieve_enrollment_declaration_json(
        &self,
        _ctx: &CallContext,
        declaration_id: &str,
        declaration_type: &str,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError> {
        if self.dm_should_fail {
            return Err("declarations unavailable".into());
        }
        self.record(format!(
            "retrieve_declaration:{}:{}:{}",
            declaration_type, declaration_id, enrollment_id
        ));
        self.declarations
            .get(&(declaration_type.to_string(), declaration_id.to_string()))
            .cloned()
            .ok_or_else(|| "declaration not found".into())
    }
}

#[async_trait]
impl StatusStorer for MockStore {
    async fn store_declaration_status(
        &self,
        _ctx: &CallContext,
        enrollment_id: &str,
        report: &StatusReport,
    ) -> Result<(), BoxError> {
        if self.status_should_fail {
            return Err("status table locked".into());
        }
        self.status_reports
            .lock()
            .unwrap()
            .push((enrollment_id.to_string(), report.clone()));
        Ok(())
    }
}

#[async_trait]
impl EnrollmentSetRemover for MockStore {
    async fn remove_all_enrollment_sets(
        &self,
        _ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<bool, BoxError> {
        self.removed_sets
            .lock()
            .unwrap()
            .push(format!("{}:*", enrollment_id));
        Ok(true)
    }

    async fn remove_enrollment_set(
        &self,
        _ctx: &CallContext,
        enrollment_id: &str,
        set_name: &str,
    ) -> Result<bool, BoxError> {
        self.removed_sets
            .lock()
            .unwrap()
            .push(format!("{}:{}", enrollment_id, set_name));
        Ok(true)
    }
}

/// Event recorded by [`MockEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Checkin {
        id: String,
        checkin: WorkflowCheckin,
        params: MdmContext,
    },
    CommandResponse {
        id: String,
        command_uuid: Option<String>,
        raw: Vec<u8>,
    },
    Idle {
        id: String,
        raw: Vec<u8>,
        event_at: DateTime<Utc>,
    },
}

/// Workflow engine recording every event it receives
#[derive(Default)]
pub struct MockEngine {
    pub events: Mutex<Vec<EngineEvent>>,
    pub should_fail: bool,
    pub idle_already_started: bool,
}

impl MockEngine {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    fn fail(&self) -> Result<(), EngineError> {
        if self.should_fail {
            return Err(EngineError::Other("engine unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MdmEventReceiver for MockEngine {
    async fn mdm_checkin_event(
        &self,
        _ctx: &CallContext,
        id: &str,
        checkin: &WorkflowCheckin,
        mdm_ctx: &MdmContext,
    ) -> Result<(), EngineError> {
        self.fail()?;
        self.events.lock().unwrap().push(EngineEvent::Checkin {
            id: id.to_string(),
            checkin: checkin.clone(),
            params: mdm_ctx.clone(),
        });
        Ok(())
    }

    async fn mdm_command_response_event(
        &self,
        _ctx: &CallContext,
        id: &str,
        command_uuid: Option<&str>,
        raw: &[u8],
        _mdm_ctx: &MdmContext,
    ) -> Result<(), EngineError> {
        self.fail()?;
        self.events.lock().unwrap().push(EngineEvent::CommandResponse {
            id: id.to_string(),
            command_uuid: command_uuid.map(str::to_string),
            raw: raw.to_vec(),
        });
        Ok(())
    }

    async fn mdm_idle_event(
        &self,
        _ctx: &CallContext,
        id: &str,
        raw: &[u8],
        _mdm_ctx: &MdmContext,
        event_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.fail()?;
        self.events.lock().unwrap().push(EngineEvent::Idle {
            id: id.to_string(),
            raw: raw.to_vec(),
            event_at,
        });
        if self.idle_already_started {
            return Err(EngineError::WorkflowAlreadyStarted);
        }
        Ok(())
    }
}

/// Verifier accepting every certificate except the listed DER bodies
#[derive(Default)]
pub struct MockVerifier {
    pub rejected: Vec<Vec<u8>>,
}

impl CertVerifier for MockVerifier {
    fn verify(&self, cert: &Certificate) -> Result<(), BoxError> {
        if self.rejected.iter().any(|der| der.as_slice() == cert.der()) {
            return Err("certificate not trusted".into());
        }
        Ok(())
    }
}

/// Signature verifier treating the header value as the signer's DER
#[derive(Default)]
pub struct MockSignatureVerifier;

impl MdmSignatureVerifier for MockSignatureVerifier {
    fn verify_mdm_signature(&self, header: &str, body: &[u8]) -> Result<Certificate, BoxError> {
        if header == "invalid" || body.is_empty() {
            return Err("signature verification failed".into());
        }
        Ok(Certificate::from_der(header.as_bytes().to_vec()))
    }
}

/// Dump writer collecting bodies in memory
#[derive(Default)]
pub struct MemoryDump {
    pub bodies: Mutex<Vec<Vec<u8>>>,
}

impl DumpWriter for MemoryDump {
    fn write_dump(&self, body: &[u8]) -> std::io::Result<()> {
        self.bodies.lock().unwrap().push(body.to_vec());
        Ok(())
    }
}

pub fn request(id: &str) -> MdmRequest {
    MdmRequest::new(CallContext::default(), id)
}

pub fn request_with_cert(id: &str, der: &[u8]) -> MdmRequest {
    request(id).with_certificate(Certificate::from_der(der.to_vec()))
}

/// A plist check-in body
pub fn checkin_plist(message_type: &str, udid: &str, extra: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key>
    <string>{}</string>
    <key>Topic</key>
    <string>com.apple.mgmt.External.test</string>
    <key>UDID</key>
    <string>{}</string>
    {}
</dict>
</plist>"#,
        message_type, udid, extra
    )
    .into_bytes()
}

pub fn token_update_plist(udid: &str) -> Vec<u8> {
    checkin_plist(
        "TokenUpdate",
        udid,
        "<key>PushMagic</key><string>magic</string><key>Token</key><data>dG9rZW4=</data>",
    )
}

/// A plist command report body
pub fn report_plist(udid: &str, status: &str, command_uuid: Option<&str>) -> Vec<u8> {
    let uuid = command_uuid
        .map(|u| format!("<key>CommandUUID</key><string>{}</string>", u))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>Status</key>
    <string>{}</string>
    <key>UDID</key>
    <string>{}</string>
    {}
</dict>
</plist>"#,
        status, udid, uuid
    )
    .into_bytes()
}

/// Output of a tracing subscriber installed for the current thread
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture log output until the returned guard is dropped.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
