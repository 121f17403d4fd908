//! Wiring from settings to the concrete collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use filmlog_content::{FsCorpus, PostService, StoreLiveCollection};
use filmlog_core::PrincipalId;
use filmlog_session::{
    LocalAuthProvider, LocalStorage, Principal, SessionConfig, SessionManager,
};
use filmlog_settings::{FilmlogSettings, StorageSettings};
use filmlog_store::{Database, FsObjectStore, InquiryRepo, PostRepo};
use filmlog_telemetry::{parse_level, TelemetryConfig};
use tracing::{debug, warn, Level, Span};

pub fn telemetry_config(settings: &FilmlogSettings, data_dir: &Path) -> TelemetryConfig {
    let log_level = parse_level(&settings.logging.level).unwrap_or(Level::WARN);
    let operator_log_path = settings
        .logging
        .operator_log
        .then(|| StorageSettings::resolve(data_dir, &settings.storage.operator_log));
    TelemetryConfig {
        log_level,
        json: settings.logging.json,
        operator_log_path,
        ..TelemetryConfig::default()
    }
}

pub struct App {
    settings: &'static FilmlogSettings,
    data_dir: PathBuf,
    db: Option<Database>,
    local_storage: LocalStorage,
}

impl App {
    pub fn new(settings: &'static FilmlogSettings, data_dir: PathBuf) -> Self {
        let db_path = StorageSettings::resolve(&data_dir, &settings.storage.database);
        let db = match Database::open(&db_path) {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(path = %db_path.display(), error = %e, "database unavailable, live posts disabled");
                None
            }
        };

        let storage_path = StorageSettings::resolve(&data_dir, &settings.storage.local_storage_file);
        let local_storage = match LocalStorage::open(&storage_path) {
            Ok(storage) => storage,
            Err(e) => {
                warn!(path = %storage_path.display(), error = %e, "local store unreadable, sessions will not persist");
                LocalStorage::in_memory()
            }
        };

        Self {
            settings,
            data_dir,
            db,
            local_storage,
        }
    }

    pub fn settings(&self) -> &FilmlogSettings {
        self.settings
    }

    pub fn operator_log_path(&self) -> PathBuf {
        StorageSettings::resolve(&self.data_dir, &self.settings.storage.operator_log)
    }

    /// Public page listing the work log.
    pub fn log_url(&self) -> String {
        format!("{}/log", self.settings.site.base_url.trim_end_matches('/'))
    }

    /// Public page of one long-form document.
    pub fn document_url(&self, slug: &str) -> String {
        format!("{}/{slug}", self.log_url())
    }

    pub fn author(&self) -> Option<PrincipalId> {
        self.settings.site.author_id.as_deref().map(PrincipalId::from_raw)
    }

    pub fn corpus(&self) -> FsCorpus {
        FsCorpus::open(&self.settings.content.corpus_dir, &self.settings.content.extensions)
    }

    pub fn database(&self) -> anyhow::Result<&Database> {
        match &self.db {
            Some(db) => Ok(db),
            None => bail!("database is unavailable; check storage.database in settings"),
        }
    }

    pub fn posts(&self) -> anyhow::Result<PostService> {
        let objects_dir = StorageSettings::resolve(&self.data_dir, &self.settings.storage.objects_dir);
        let objects = Arc::new(FsObjectStore::new(
            objects_dir,
            &self.settings.storage.public_base_url,
        ));
        Ok(PostService::new(PostRepo::new(self.database()?.clone()), objects))
    }

    pub fn live(&self) -> Option<StoreLiveCollection> {
        let db = self.db.clone()?;
        let poll = Duration::from_millis(self.settings.realtime.poll_interval_ms);
        Some(StoreLiveCollection::new(PostRepo::new(db), poll))
    }

    pub fn inquiries(&self) -> anyhow::Result<InquiryRepo> {
        Ok(InquiryRepo::new(self.database()?.clone()))
    }

    /// A session manager on a fresh tab of the shared local store. `identity`
    /// is who the local provider signs in; `None` falls back to the author.
    pub async fn session(&self, identity: Option<PrincipalId>) -> anyhow::Result<SessionManager> {
        let identity = identity.or_else(|| self.author()).map(Principal::new);
        let session_path =
            StorageSettings::resolve(&self.data_dir, &self.settings.storage.provider_session_file);
        let provider = Arc::new(LocalAuthProvider::new(session_path, identity));
        let config = SessionConfig {
            max_age: Duration::from_millis(self.settings.session.max_age_ms),
            login_at_key: self.settings.session.login_at_key.clone(),
        };
        let manager = SessionManager::new(config, provider, Arc::new(self.local_storage.tab()));
        manager.start().await.context("starting session")?;
        if let Some(principal) = manager.state().principal() {
            Span::current().record("principal", principal.id.as_str());
        }
        debug!(state = ?manager.state(), "session restored");
        Ok(manager)
    }

    /// The signed-in principal, provided it is the site author.
    pub async fn require_author(&self) -> anyhow::Result<PrincipalId> {
        let Some(author) = self.author() else {
            bail!("site.authorId is not configured; nobody may edit");
        };
        let manager = self.session(None).await?;
        let state = manager.state();
        match state.principal() {
            Some(principal) if principal.id == author => Ok(author),
            Some(principal) => bail!("signed in as {}, which is not the site author", principal.id),
            None => bail!("not signed in; run `filmlog login` first"),
        }
    }
}
