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

//! Composition of the MDM server.
//!
//! Service chain, outer to inner: dump, certificate authorization, fan-out
//! (core first, then the workflow adapter, caller services and the DM set
//! remover), core. Every authenticated HTTP surface is wrapped in the
//! configured [`AuthMiddleware`].

pub mod config;
pub mod runner;

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{cert_with_enrollment_id, AuthMiddleware, CertAuthRetriever};
use crate::cmdservice::{CmdService, MdmEventReceiver, TokenUpdateTallyStore};
use crate::core::errors::HubError;
use crate::ddm::{DmAdapter, SetsRemover};
use crate::enqueue::{CommandEnqueuer, Enqueue, RawCommandEnqueuer};
use crate::http::{checkin_and_command_router, checkin_router, command_router, HandlerState};
use crate::service::{
    CertAuth, CertAuthStore, CheckinAndCommandService, CoreService, DefaultUserAuthenticate,
    Dumper, EnrollmentStore, MultiService,
};

use self::config::UserAuthenticateConfig;
pub use self::config::{HandlerLayout, HubBuilder, HubConfig};
pub use self::runner::{spawn_worker, EngineWorker, WorkerHandle};

type DynService = Arc<dyn CheckinAndCommandService>;

/// Storage the hub needs from its embedding application.
pub trait HubStore:
    EnrollmentStore + CertAuthStore + TokenUpdateTallyStore + RawCommandEnqueuer + CertAuthRetriever
{
}

impl<T> HubStore for T where
    T: EnrollmentStore
        + CertAuthStore
        + TokenUpdateTallyStore
        + RawCommandEnqueuer
        + CertAuthRetriever
        + ?Sized
{
}

pub struct NanoHub {
    server: Router,
    checkin: Option<Router>,
    migration: Option<Router>,
    auth: AuthMiddleware,
    retriever: Arc<dyn CertAuthRetriever>,
    service: Arc<dyn CheckinAndCommandService>,
    engine: Option<Arc<dyn MdmEventReceiver>>,
    enqueuer: Arc<Enqueue>,
    worker: Option<(Arc<dyn EngineWorker>, Duration)>,
}

impl NanoHub {
    /// Validate `builder` and compose the hub.
    pub fn from_builder<S: HubStore + 'static>(
        store: Arc<S>,
        builder: HubBuilder,
    ) -> Result<Self, HubError> {
        Ok(Self::new(store, builder.validate()?))
    }

    pub fn new<S: HubStore + 'static>(store: Arc<S>, config: HubConfig) -> Self {
        let enrollments: Arc<dyn EnrollmentStore> = store.clone();
        let cert_auth_store: Arc<dyn CertAuthStore> = store.clone();
        let tally_store: Arc<dyn TokenUpdateTallyStore> = store.clone();
        let raw_enqueuer: Arc<dyn RawCommandEnqueuer> = store.clone();
        let retriever: Arc<dyn CertAuthRetriever> = store;

        let enqueuer = Arc::new(Enqueue::new(raw_enqueuer));
        let mut svcs = config.services;

        let mut core = CoreService::new(enrollments.clone());
        match config.user_authenticate {
            Some(UserAuthenticateConfig::Service(ua)) => core = core.with_user_authenticate(ua),
            Some(UserAuthenticateConfig::Default {
                zero_length_challenge,
            }) => {
                core = core.with_user_authenticate(Arc::new(DefaultUserAuthenticate::new(
                    enrollments,
                    zero_length_challenge,
                )))
            }
            None => {}
        }
        if let Some(tokens) = config.tokens {
            core = core.with_token_mux(Arc::new(tokens));
        }
        if let Some(dm) = config.dm {
            let mut adapter = DmAdapter::new(dm.store);
            if let Some(status_store) = dm.status_store {
                adapter = adapter.with_status_store(status_store);
            }
            if let Some(id_fn) = dm.status_id_fn {
                adapter = adapter.with_status_id_fn(id_fn);
            }
            if let Some(hook) = dm.status_handlers {
                adapter = adapter.with_status_handlers(hook);
            }
            core = core.with_declarative_management(Arc::new(adapter));

            if let Some(sets) = dm.remove_sets {
                svcs.push(Arc::new(SetsRemover::new(dm.set_remover, sets)));
            }
        }

        let mut engine = None;
        let mut worker = None;
        if let Some(engine_config) = config.engine {
            let cmd_svc = CmdService::new(engine_config.receiver.clone())
                .with_tally_store(tally_store)
                .with_mask_already_started(engine_config.mask_already_started);
            svcs.insert(0, Arc::new(cmd_svc));
            engine = Some(engine_config.receiver);
            worker = engine_config.worker;
        }

        let mut inner: DynService = Arc::new(core);
        if !svcs.is_empty() {
            inner = Arc::new(MultiService::new(inner, svcs));
        }

        let authorized: DynService = Arc::new(
            CertAuth::new(inner.clone(), cert_auth_store).with_retroactive(config.retroactive),
        );

        // migration check-ins carry no client certificate: they skip cert authorization
        let (service, unauthorized): (DynService, DynService) = match &config.dump {
            Some(writer) => {
                let dumped: DynService = Arc::new(Dumper::new(authorized, writer.clone()));
                let dumped_inner: DynService = Arc::new(Dumper::new(inner, writer.clone()));
                (dumped, dumped_inner)
            }
            None => (authorized, inner),
        };

        let state = HandlerState::new(service.clone(), "server");
        let server = match config.layout {
            HandlerLayout::Split => command_router(state, config.body_limit),
            HandlerLayout::Combined { .. } => checkin_and_command_router(state, config.body_limit),
        };
        let server = config.auth.wrap(server);

        let checkin = config.layout.has_checkin_handler().then(|| {
            let state = HandlerState::new(service.clone(), "checkin");
            config.auth.wrap(checkin_router(state, config.body_limit))
        });

        let migration = config.migration.then(|| {
            let state = HandlerState::new(unauthorized, "migration");
            checkin_router(state, config.body_limit)
        });

        info!(
            service = "nanohub",
            layout = ?config.layout,
            extraction = ?config.auth.extraction(),
            engine = engine.is_some(),
            "hub configured"
        );

        Self {
            server,
            checkin,
            migration,
            auth: config.auth,
            retriever,
            service,
            engine,
            enqueuer,
            worker,
        }
    }

    /// The primary "ServerURL" handler.
    pub fn server_handler(&self) -> Router {
        self.server.clone()
    }

    /// The separate "CheckInURL" handler, if configured.
    pub fn checkin_handler(&self) -> Option<Router> {
        self.checkin.clone()
    }

    /// The migration handler, if configured. It is not authenticated and
    /// must be protected by the embedding application.
    pub fn migration_handler(&self) -> Option<Router> {
        self.migration.clone()
    }

    /// Wrap `router` in MDM authentication plus enrollment ID lookup from
    /// the certificate, for auxiliary endpoints that authenticate like MDM.
    pub fn id_auth_middleware<T>(&self, router: Router<T>) -> Router<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let router = router.layer(from_fn_with_state(
            self.retriever.clone(),
            cert_with_enrollment_id,
        ));
        self.auth.wrap(router)
    }

    /// The composed service chain behind the HTTP handlers.
    pub fn service(&self) -> Arc<dyn CheckinAndCommandService> {
        self.service.clone()
    }

    pub fn engine(&self) -> Option<Arc<dyn MdmEventReceiver>> {
        self.engine.clone()
    }

    pub fn enqueuer(&self) -> Arc<dyn CommandEnqueuer> {
        self.enqueuer.clone()
    }

    /// Start the engine worker in the background, if one is configured.
    pub fn spawn_engine_worker(&self, cancel: CancellationToken) -> Option<WorkerHandle> {
        self.worker
            .as_ref()
            .map(|(worker, interval)| spawn_worker(worker.clone(), *interval, cancel))
    }
}
