// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hub options and their validation.
//!
//! [`HubBuilder`] collects options freely. [`HubBuilder::validate`] rejects
//! conflicting or incomplete combinations and produces a [`HubConfig`] in
//! which the certificate extraction mode, the trust source and the handler
//! layout are each a single resolved value.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthMiddleware, CertExtraction, CertVerifier, MdmSignatureVerifier, PoolVerifier};
use crate::cmdservice::MdmEventReceiver;
use crate::core::constants::{limits, worker};
use crate::core::errors::HubError;
use crate::ddm::{
    EnrollmentDeclarationStorage, EnrollmentSetRemover, StatusHandlerHook, StatusIdFn, StatusStorer,
};
use crate::hub::runner::EngineWorker;
use crate::service::{
    CheckinAndCommandService, DumpWriter, GetTokenHandler, StdoutDump, TokenMux,
    UserAuthenticateService,
};

/// Which protocol surfaces carry check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerLayout {
    /// Server handler takes check-ins and command reports; optionally a
    /// separate check-in handler as well.
    Combined { checkin_handler: bool },
    /// Server handler takes command reports only; check-ins go to the
    /// separate check-in handler.
    Split,
}

impl HandlerLayout {
    pub fn has_checkin_handler(&self) -> bool {
        match self {
            HandlerLayout::Combined { checkin_handler } => *checkin_handler,
            HandlerLayout::Split => true,
        }
    }
}

pub(crate) struct DmConfig {
    pub store: Arc<dyn EnrollmentDeclarationStorage>,
    pub set_remover: Arc<dyn EnrollmentSetRemover>,
    pub remove_sets: Option<Vec<String>>,
    pub status_store: Option<Arc<dyn StatusStorer>>,
    pub status_id_fn: Option<StatusIdFn>,
    pub status_handlers: Option<StatusHandlerHook>,
}

/// How UserAuthenticate check-ins are answered.
pub(crate) enum UserAuthenticateConfig {
    Service(Arc<dyn UserAuthenticateService>),
    Default { zero_length_challenge: bool },
}

pub(crate) struct EngineConfig {
    pub receiver: Arc<dyn MdmEventReceiver>,
    pub mask_already_started: bool,
    pub worker: Option<(Arc<dyn EngineWorker>, Duration)>,
}

/// Validated hub configuration.
pub struct HubConfig {
    pub(crate) layout: HandlerLayout,
    pub(crate) migration: bool,
    pub(crate) auth: AuthMiddleware,
    pub(crate) dump: Option<Arc<dyn DumpWriter>>,
    pub(crate) retroactive: bool,
    pub(crate) services: Vec<Arc<dyn CheckinAndCommandService>>,
    pub(crate) dm: Option<DmConfig>,
    pub(crate) engine: Option<EngineConfig>,
    pub(crate) user_authenticate: Option<UserAuthenticateConfig>,
    pub(crate) tokens: Option<TokenMux>,
    pub(crate) body_limit: usize,
}

impl HubConfig {
    pub fn layout(&self) -> HandlerLayout {
        self.layout
    }

    pub fn cert_extraction(&self) -> &CertExtraction {
        self.auth.extraction()
    }

    pub fn migration(&self) -> bool {
        self.migration
    }

    pub fn has_dm(&self) -> bool {
        self.dm.is_some()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }
}

/// Unvalidated hub options.
pub struct HubBuilder {
    checkin: bool,
    no_combined: bool,
    migration: bool,
    dump: Option<Arc<dyn DumpWriter>>,
    retroactive: bool,
    services: Vec<Arc<dyn CheckinAndCommandService>>,

    verifier: Option<Arc<dyn CertVerifier>>,
    roots_pem: Vec<u8>,
    intermediates_pem: Vec<u8>,
    mdm_signature: Option<Arc<dyn MdmSignatureVerifier>>,
    cert_header: Option<String>,
    signature_log_errors: bool,

    dm_store: Option<(Arc<dyn EnrollmentDeclarationStorage>, Arc<dyn EnrollmentSetRemover>)>,
    dm_status_store: Option<Arc<dyn StatusStorer>>,
    dm_status_id_fn: Option<StatusIdFn>,
    dm_status_handlers: Option<StatusHandlerHook>,
    dm_remove_sets: Option<Vec<String>>,

    engine: Option<Arc<dyn MdmEventReceiver>>,
    mask_already_started: bool,
    engine_worker: Option<Arc<dyn EngineWorker>>,
    worker_interval: Duration,

    ua: Option<Arc<dyn UserAuthenticateService>>,
    ua_default: Option<bool>,
    token_handlers: Vec<(String, Arc<dyn GetTokenHandler>)>,

    body_limit: usize,
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self {
            checkin: false,
            no_combined: false,
            migration: false,
            dump: None,
            retroactive: false,
            services: Vec::new(),
            verifier: None,
            roots_pem: Vec::new(),
            intermediates_pem: Vec::new(),
            mdm_signature: None,
            cert_header: None,
            signature_log_errors: false,
            dm_store: None,
            dm_status_store: None,
            dm_status_id_fn: None,
            dm_status_handlers: None,
            dm_remove_sets: None,
            engine: None,
            mask_already_started: false,
            engine_worker: None,
            worker_interval: Duration::from_secs(worker::DEFAULT_INTERVAL_SECS),
            ua: None,
            ua_default: None,
            token_handlers: Vec::new(),
            body_limit: limits::MAX_BODY_SIZE_BYTES,
        }
    }
}

impl HubBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the separate check-in handler.
    pub fn with_checkin_handler(mut self) -> Self {
        self.checkin = true;
        self
    }

    /// Restrict the server handler to command reports.
    pub fn without_server_combined_handler(mut self) -> Self {
        self.no_combined = true;
        self
    }

    /// Enable the unauthenticated migration handler.
    pub fn with_migration(mut self) -> Self {
        self.migration = true;
        self
    }

    pub fn with_dump(mut self, writer: Arc<dyn DumpWriter>) -> Self {
        self.dump = Some(writer);
        self
    }

    pub fn with_dump_to_stdout(self) -> Self {
        self.with_dump(Arc::new(StdoutDump))
    }

    pub fn with_allow_retroactive(mut self) -> Self {
        self.retroactive = true;
        self
    }

    /// Add a supplementary service, called after the core service.
    pub fn with_service(mut self, svc: Arc<dyn CheckinAndCommandService>) -> Self {
        self.services.push(svc);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CertVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_root_pems(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.roots_pem = pem.into();
        self
    }

    pub fn with_intermediate_pems(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.intermediates_pem = pem.into();
        self
    }

    pub fn with_mdm_signature(mut self, verifier: Arc<dyn MdmSignatureVerifier>) -> Self {
        self.mdm_signature = Some(verifier);
        self
    }

    pub fn with_mdm_signature_error_log(mut self) -> Self {
        self.signature_log_errors = true;
        self
    }

    /// Extract the client certificate from this header (RFC 9440 or
    /// URL-encoded PEM).
    pub fn with_cert_header(mut self, header: impl Into<String>) -> Self {
        self.cert_header = Some(header.into());
        self
    }

    /// Enable Declarative Management backed by `store`.
    pub fn with_dm<D>(mut self, store: Arc<D>) -> Self
    where
        D: EnrollmentDeclarationStorage + EnrollmentSetRemover + 'static,
    {
        let declarations: Arc<dyn EnrollmentDeclarationStorage> = store.clone();
        let set_remover: Arc<dyn EnrollmentSetRemover> = store;
        self.dm_store = Some((declarations, set_remover));
        self
    }

    pub fn with_dm_status_store(
        mut self,
        store: Arc<dyn StatusStorer>,
        id_fn: Option<StatusIdFn>,
    ) -> Self {
        self.dm_status_store = Some(store);
        self.dm_status_id_fn = id_fn;
        self
    }

    pub fn with_dm_status_handlers(mut self, hook: StatusHandlerHook) -> Self {
        self.dm_status_handlers = Some(hook);
        self
    }

    /// Remove DM set associations on enrollment: all sets when `sets` is
    /// empty, otherwise the named ones.
    pub fn with_dm_set_remover(mut self, sets: Vec<String>) -> Self {
        self.dm_remove_sets = Some(sets);
        self
    }

    /// Feed check-ins and command reports to the workflow engine.
    pub fn with_engine(mut self, receiver: Arc<dyn MdmEventReceiver>) -> Self {
        self.engine = Some(receiver);
        self
    }

    pub fn with_mask_already_started(mut self) -> Self {
        self.mask_already_started = true;
        self
    }

    pub fn with_engine_worker(mut self, worker: Arc<dyn EngineWorker>) -> Self {
        self.engine_worker = Some(worker);
        self
    }

    pub fn with_worker_interval(mut self, interval: Duration) -> Self {
        self.worker_interval = interval;
        self
    }

    /// Answer UserAuthenticate check-ins with `ua`.
    pub fn with_user_authenticate(mut self, ua: Arc<dyn UserAuthenticateService>) -> Self {
        self.ua = Some(ua);
        self
    }

    /// Use the built-in UserAuthenticate service unless one was set with
    /// [`HubBuilder::with_user_authenticate`]. With `zero_length_challenge`
    /// the first message is answered with an empty `DigestChallenge`
    /// instead of being declined.
    pub fn with_default_user_authenticate(mut self, zero_length_challenge: bool) -> Self {
        self.ua_default = Some(zero_length_challenge);
        self
    }

    /// Answer GetToken check-ins for `service_type` with `handler`.
    pub fn with_get_token_handler(
        mut self,
        service_type: impl Into<String>,
        handler: Arc<dyn GetTokenHandler>,
    ) -> Self {
        self.token_handlers.push((service_type.into(), handler));
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn validate(self) -> Result<HubConfig, HubError> {
        let layout = match (self.no_combined, self.checkin) {
            (true, false) => return Err(config_err("config precludes checkin support")),
            (true, true) => HandlerLayout::Split,
            (false, checkin_handler) => HandlerLayout::Combined { checkin_handler },
        };

        let has_pems = !self.roots_pem.is_empty() || !self.intermediates_pem.is_empty();
        let verifier: Arc<dyn CertVerifier> = match self.verifier {
            Some(_) if has_pems => {
                return Err(config_err("roots and intermediates present with explicit verifier"))
            }
            Some(verifier) => verifier,
            None if self.roots_pem.is_empty() => {
                return Err(config_err("no certificate verifier or root certificates"))
            }
            None => Arc::new(PoolVerifier::from_pem(&self.roots_pem, &self.intermediates_pem)?),
        };

        let extraction = match (self.cert_header, self.mdm_signature) {
            (Some(_), Some(_)) => {
                return Err(config_err(
                    "signature header and Mdm-Signature are mutually exclusive",
                ))
            }
            (Some(header), None) if header.is_empty() => {
                return Err(config_err("empty certificate header name"))
            }
            (Some(header), None) => CertExtraction::Header(header),
            (None, Some(verifier)) => CertExtraction::MdmSignature {
                verifier,
                log_errors: self.signature_log_errors,
            },
            (None, None) => CertExtraction::Tls,
        };

        let dm = match self.dm_store {
            Some((store, set_remover)) => Some(DmConfig {
                store,
                set_remover,
                remove_sets: self.dm_remove_sets,
                status_store: self.dm_status_store,
                status_id_fn: self.dm_status_id_fn,
                status_handlers: self.dm_status_handlers,
            }),
            None if self.dm_status_store.is_some() => {
                return Err(config_err("DM status store without DM"))
            }
            None if self.dm_remove_sets.is_some() => {
                return Err(config_err("DM set remover without DM"))
            }
            None => None,
        };

        if self.worker_interval.is_zero() {
            return Err(config_err("engine worker interval must be greater than 0"));
        }

        let engine = match self.engine {
            Some(receiver) => Some(EngineConfig {
                receiver,
                mask_already_started: self.mask_already_started,
                worker: self.engine_worker.map(|w| (w, self.worker_interval)),
            }),
            None if self.engine_worker.is_some() => {
                return Err(config_err("engine worker without workflow engine"))
            }
            None => None,
        };

        if self.body_limit == 0 {
            return Err(config_err("body limit must be greater than 0"));
        }

        let user_authenticate = match (self.ua, self.ua_default) {
            (Some(ua), _) => Some(UserAuthenticateConfig::Service(ua)),
            (None, Some(zero_length_challenge)) => Some(UserAuthenticateConfig::Default {
                zero_length_challenge,
            }),
            (None, None) => None,
        };

        let mut tokens = TokenMux::new();
        for (service_type, handler) in self.token_handlers {
            tokens.handle(service_type, handler)?;
        }
        let tokens = (!tokens.is_empty()).then_some(tokens);

        Ok(HubConfig {
            layout,
            migration: self.migration,
            auth: AuthMiddleware::new(extraction, verifier, self.body_limit),
            dump: self.dump,
            retroactive: self.retroactive,
            services: self.services,
            dm,
            engine,
            user_authenticate,
            tokens,
            body_limit: self.body_limit,
        })
    }
}

fn config_err(msg: &str) -> HubError {
    HubError::ConfigurationError(msg.to_string())
}
