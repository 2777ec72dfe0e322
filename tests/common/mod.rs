//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use sixpack_participation::experiment::{ExperimentDefinition, Identity};
use sixpack_participation::remote::{
    AlternativeRef, AssignmentService, ConvertRequest, ConvertResponse, ParticipateRequest,
    ParticipateResponse, Session,
};
use sixpack_participation::store::MemoryParticipationStore;
use sixpack_participation::{EngineConfig, ParticipationEngine, RemoteError};

/// Initialize test logging. Honors `RUST_LOG`; safe to call repeatedly.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Test subject with a numeric primary key.
#[derive(Debug, Clone)]
pub struct User {
    pub pk: Option<u64>,
}

impl User {
    pub fn new(pk: u64) -> Self {
        Self { pk: Some(pk) }
    }
}

pub fn pk_identity() -> Identity<User> {
    Identity::new("pk", |u: &User| u.pk.map(|pk| pk.to_string()))
}

/// `DefaultTest` with the given alternatives and caching mode.
pub fn default_test(alternatives: &[&str], local: bool) -> ExperimentDefinition<User> {
    ExperimentDefinition::builder("DefaultTest")
        .alternatives(alternatives.iter().copied())
        .identity(pk_identity())
        .local_caching(local)
        .build()
        .expect("valid definition")
}

/// Remote double answering from scripted queues and recording every call.
///
/// When a queue runs dry, participate fails with a transport error and
/// convert answers `"ok"`.
#[derive(Default)]
pub struct ScriptedService {
    participate_answers: Mutex<VecDeque<Result<ParticipateResponse, RemoteError>>>,
    convert_answers: Mutex<VecDeque<Result<ConvertResponse, RemoteError>>>,
    participate_calls: Mutex<Vec<(Session, ParticipateRequest)>>,
    convert_calls: Mutex<Vec<(Session, ConvertRequest)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful participation choosing `name`.
    pub fn choose(self, name: &str) -> Self {
        self.participate_answers
            .lock()
            .unwrap()
            .push_back(Ok(ParticipateResponse {
                status: Some("ok".to_string()),
                alternative: AlternativeRef {
                    name: name.to_string(),
                },
            }));
        self
    }

    /// Queue a failed participation.
    pub fn fail_participate(self, err: RemoteError) -> Self {
        self.participate_answers.lock().unwrap().push_back(Err(err));
        self
    }

    /// Queue a conversion answer with the given status.
    pub fn convert_status(self, status: &str) -> Self {
        self.convert_answers
            .lock()
            .unwrap()
            .push_back(Ok(ConvertResponse {
                status: status.to_string(),
            }));
        self
    }

    /// Queue a failed conversion.
    pub fn fail_convert(self, err: RemoteError) -> Self {
        self.convert_answers.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn participate_calls(&self) -> Vec<(Session, ParticipateRequest)> {
        self.participate_calls.lock().unwrap().clone()
    }

    pub fn convert_calls(&self) -> Vec<(Session, ConvertRequest)> {
        self.convert_calls.lock().unwrap().clone()
    }
}

impl AssignmentService for ScriptedService {
    async fn participate(
        &self,
        session: &Session,
        request: &ParticipateRequest,
    ) -> Result<ParticipateResponse, RemoteError> {
        self.participate_calls
            .lock()
            .unwrap()
            .push((session.clone(), request.clone()));
        self.participate_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(RemoteError::new(
                    sixpack_participation::RemoteErrorKind::Transport,
                    "connection refused",
                ))
            })
    }

    async fn convert(
        &self,
        session: &Session,
        request: &ConvertRequest,
    ) -> Result<ConvertResponse, RemoteError> {
        self.convert_calls
            .lock()
            .unwrap()
            .push((session.clone(), request.clone()));
        self.convert_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ConvertResponse {
                    status: "ok".to_string(),
                })
            })
    }
}

pub const HOST: &str = "http://sixpack.test:5000";

/// Engine with remote disabled and an in-memory store.
pub fn local_engine() -> ParticipationEngine<MemoryParticipationStore, ScriptedService> {
    init_logging();
    ParticipationEngine::new(
        EngineConfig::default(),
        MemoryParticipationStore::new(),
        ScriptedService::new(),
    )
    .expect("valid config")
}

/// Engine with remote enabled against a scripted service.
pub fn remote_engine(
    service: ScriptedService,
) -> ParticipationEngine<MemoryParticipationStore, ScriptedService> {
    init_logging();
    ParticipationEngine::new(
        EngineConfig::remote(HOST),
        MemoryParticipationStore::new(),
        service,
    )
    .expect("valid config")
}
