//! # Session Service
//!
//! The front door for starting sync work: API key validation, library
//! probing, session creation and job dispatch. The pipelines themselves run
//! inside the host's job runner; this service only sets them up.

use crate::export::ExportArgs;
use crate::import::ImportArgs;
use crate::repository::SessionRepository;
use crate::session::{OnExisting, SyncSession};
use crate::{Result, SyncError};
use bridge_traits::{HttpClient, JobDispatcher, JobHandle, JobKind};
use bridge_traits::ResourceQuery;
use provider_zotero::{LibraryUrl, ZoteroConnector, ZoteroError};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// User-facing parameters of an import, before a session exists.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub item_set_id: Option<i64>,
    pub collection_key: Option<String>,
    pub sync_files: bool,
    pub on_existing: OnExisting,
}

/// User-facing parameters of an export, before a session exists.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub resource_ids: Vec<i64>,
    pub query: ResourceQuery,
    pub collection_keys: Vec<String>,
    pub sync_files: bool,
    pub on_existing: OnExisting,
}

/// What a library probe learned: display name, public URL and current
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryProbe {
    pub name: String,
    pub url: String,
    pub version: i64,
}

/// Sets up sync sessions and hands the actual work to the job runner.
pub struct SessionService {
    repository: Arc<dyn SessionRepository>,
    dispatcher: Arc<dyn JobDispatcher>,
    http: Arc<dyn HttpClient>,
}

impl SessionService {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        dispatcher: Arc<dyn JobDispatcher>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            http,
        }
    }

    fn connector(&self, api_key: Option<String>) -> ZoteroConnector {
        ZoteroConnector::new(self.http.clone(), api_key)
    }

    /// Whether an API key grants read access to the library. A key the
    /// remote end rejects outright reads as invalid, not as an error.
    #[instrument(skip(self, api_key))]
    pub async fn validate_api_key(&self, library: &LibraryUrl, api_key: &str) -> Result<bool> {
        match self.connector(None).key_permissions(api_key).await {
            Ok(permissions) => Ok(permissions
                .grants_library_access(library.library_type(), library.library_id())),
            Err(ZoteroError::RequestFailed { status, .. }) => {
                warn!(status, "Key introspection rejected");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Probe a library for its display name, public URL and current version.
    ///
    /// An empty library yields a synthesized name and URL, with version 0.
    #[instrument(skip(self, api_key))]
    pub async fn probe_library(
        &self,
        library: &LibraryUrl,
        api_key: Option<String>,
    ) -> Result<LibraryProbe> {
        let connector = self.connector(api_key);
        let url = library.items(&[("limit", "1"), ("since", "0")]);
        let response = connector.get(&url).await?;
        let version = ZoteroConnector::last_modified_version(&response).unwrap_or(0);

        // The library block only appears on item envelopes, so an empty
        // library forces the fallbacks.
        let body: serde_json::Value = serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        let library_block = body.get(0).and_then(|item| item.get("library"));

        let name = library_block
            .and_then(|block| block.get("name"))
            .and_then(|name| name.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("{} {}", library.library_type(), library.library_id())
            });
        let public_url = library_block
            .and_then(|block| block.pointer("/links/alternate/href"))
            .and_then(|href| href.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "https://www.zotero.org/{}/{}",
                    library.library_type().path_segment(),
                    library.library_id()
                )
            });

        info!(name = %name, version, "Probed remote library");
        Ok(LibraryProbe {
            name,
            url: public_url,
            version,
        })
    }

    /// Create a session for `library` and dispatch its import job.
    #[instrument(skip(self, api_key, request))]
    pub async fn begin_import(
        &self,
        library: &LibraryUrl,
        api_key: Option<String>,
        request: ImportRequest,
    ) -> Result<SyncSession> {
        let probe = self.probe_library(library, api_key).await?;
        let session = self
            .repository
            .create(&probe.name, &probe.url, probe.version)
            .await?;

        let args = ImportArgs {
            session_id: session.id,
            item_set_id: request.item_set_id,
            collection_key: request.collection_key,
            sync_files: request.sync_files,
            on_existing: request.on_existing,
            // The first run starts from the beginning; later runs resume
            // from the stored cursor.
            version: 0,
        };
        let handle = self.dispatch(JobKind::Import, &args).await?;
        self.repository.set_job(session.id, &handle).await?;

        info!(session_id = session.id, job = %handle, "Import dispatched");
        self.reload(session.id).await
    }

    /// Create a session for `library` and dispatch its export job. Unlike
    /// import, export always writes, so the API key is mandatory.
    #[instrument(skip(self, api_key, request))]
    pub async fn begin_export(
        &self,
        library: &LibraryUrl,
        api_key: String,
        request: ExportRequest,
    ) -> Result<SyncSession> {
        let probe = self.probe_library(library, Some(api_key)).await?;
        let session = self
            .repository
            .create(&probe.name, &probe.url, probe.version)
            .await?;

        let args = ExportArgs {
            session_id: session.id,
            resource_ids: request.resource_ids,
            query: request.query,
            collection_keys: request.collection_keys,
            sync_files: request.sync_files,
            on_existing: request.on_existing,
            version: probe.version,
        };
        let handle = self.dispatch(JobKind::Export, &args).await?;
        self.repository.set_job(session.id, &handle).await?;

        info!(session_id = session.id, job = %handle, "Export dispatched");
        self.reload(session.id).await
    }

    /// Dispatch the undo job for a session. Refused while the session's
    /// sync job can still make progress.
    #[instrument(skip(self))]
    pub async fn begin_undo(&self, session_id: i64) -> Result<SyncSession> {
        let session = self
            .repository
            .find_by_id(session_id)
            .await?
            .ok_or(SyncError::SessionNotFound { session_id })?;

        if let Some(job) = &session.job_id {
            let status = self.dispatcher.status(job).await?;
            if !status.is_terminal() {
                return Err(SyncError::SyncStillRunning { session_id });
            }
        }

        let handle = self
            .dispatcher
            .dispatch(JobKind::UndoImport, json!({ "session_id": session_id }))
            .await?;
        self.repository.set_undo_job(session_id, &handle).await?;

        info!(session_id, job = %handle, "Undo dispatched");
        self.reload(session_id).await
    }

    async fn dispatch<T: serde::Serialize>(&self, kind: JobKind, args: &T) -> Result<JobHandle> {
        let args = serde_json::to_value(args).map_err(|e| SyncError::Serialization(e.to_string()))?;
        Ok(self.dispatcher.dispatch(kind, args).await?)
    }

    async fn reload(&self, session_id: i64) -> Result<SyncSession> {
        self.repository
            .find_by_id(session_id)
            .await?
            .ok_or(SyncError::SessionNotFound { session_id })
    }
}
