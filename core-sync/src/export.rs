//! # Export Pipeline
//!
//! Pushes local resources to the remote library: resource selection, item
//! construction from per-type templates, batched write requests, link
//! recording, and attachment file upload for stored media.
//!
//! Item payloads are the template with values filled in. Only fields the
//! template declares are ever set; a value whose field the item type does
//! not carry is dropped rather than rejected by the remote end.

use crate::engine::SyncEngine;
use crate::session::OnExisting;
use crate::Result;
use bridge_traits::{BridgeError, ResourceQuery, ResourceRecord, ResourceStore};
use provider_zotero::{FileUpload, RemoteItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Item type used when a resource has no class or an unmapped one.
const DEFAULT_ITEM_TYPE: &str = "document";

/// Arguments of one export run, serialized into the dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportArgs {
    pub session_id: i64,

    /// Explicit resources to export. Takes precedence over `query`.
    #[serde(default)]
    pub resource_ids: Vec<i64>,

    /// Store search used when no explicit ids are given.
    #[serde(default)]
    pub query: ResourceQuery,

    /// Remote collections the written items are placed into.
    #[serde(default)]
    pub collection_keys: Vec<String>,

    /// Upload stored media files as attachments.
    #[serde(default)]
    pub sync_files: bool,

    pub on_existing: OnExisting,

    /// Version cursor at dispatch time.
    #[serde(default)]
    pub version: i64,
}

/// Tally of one export run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub exported: u64,
    pub failed: u64,
    pub uploaded_files: u64,
    pub version: i64,
}

/// Templates fetched once per (item type, link mode) and reused for the
/// whole run.
struct TemplateCache {
    templates: HashMap<String, Map<String, Value>>,
}

impl TemplateCache {
    fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    async fn get(
        &mut self,
        engine: &SyncEngine,
        item_type: &str,
        link_mode: Option<&str>,
    ) -> Result<Map<String, Value>> {
        let cache_key = format!("{}|{}", item_type, link_mode.unwrap_or(""));
        if let Some(template) = self.templates.get(&cache_key) {
            return Ok(template.clone());
        }
        let template = engine.connector.template(item_type, link_mode).await?;
        self.templates.insert(cache_key, template.clone());
        Ok(template)
    }
}

/// One resource staged for a write request.
struct StagedItem {
    resource_id: i64,
    record: ResourceRecord,
    /// Remote key when this is an in-place update.
    existing_key: Option<String>,
}

/// Run one export. Per-resource failures (missing resource, rejected write,
/// failed upload) are logged and tallied; infrastructure failures abort.
#[instrument(skip(engine, store, args), fields(session_id = args.session_id))]
pub async fn run_export(
    engine: &SyncEngine,
    store: &dyn ResourceStore,
    args: &ExportArgs,
) -> Result<ExportOutcome> {
    let ids = if args.resource_ids.is_empty() {
        store.search_ids(&args.query).await?
    } else {
        args.resource_ids.clone()
    };

    let mut outcome = ExportOutcome {
        version: args.version,
        ..Default::default()
    };
    if ids.is_empty() {
        info!("Nothing to export");
        return Ok(outcome);
    }

    // For in-place updates, resolve which resources already have a remote
    // counterpart and fetch its current version and timestamps.
    let existing_keys = match args.on_existing {
        OnExisting::Replace => engine.repository.existing_keys_for_resources(&ids).await?,
        OnExisting::Create => HashMap::new(),
    };
    let remote_records = fetch_remote_records(engine, &existing_keys).await?;

    let mut templates = TemplateCache::new();

    for chunk in ids.chunks(engine.config.chunk_size.max(1)) {
        if engine.is_cancelled() {
            info!("Stop requested, ending export early");
            break;
        }

        // Stage the chunk: read each resource and build its item payload.
        let mut staged: Vec<StagedItem> = Vec::new();
        let mut items: Vec<Value> = Vec::new();
        for &resource_id in chunk {
            let record = match store.read(resource_id).await {
                Ok(record) => record,
                Err(BridgeError::NotFound(id)) => {
                    warn!(resource_id = id, "Resource no longer exists, skipping");
                    outcome.failed += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let existing_key = existing_keys.get(&resource_id).and_then(|key| {
                // A vanished remote counterpart degrades the update to a
                // fresh create.
                if remote_records.contains_key(key) {
                    Some(key.clone())
                } else {
                    None
                }
            });

            let item = build_item(
                engine,
                &mut templates,
                &record,
                args,
                existing_key.as_deref().map(|key| (key, &remote_records[key])),
            )
            .await?;

            items.push(Value::Object(item));
            staged.push(StagedItem {
                resource_id,
                record,
                existing_key,
            });
        }

        if items.is_empty() {
            continue;
        }

        let (response, version) = engine.connector.write_items(&engine.library, &items).await?;
        if let Some(version) = version {
            outcome.version = outcome.version.max(version);
        }

        let mut links = Vec::new();
        for (index, item) in staged.iter().enumerate() {
            match response.key_for(index) {
                Some(key) => {
                    outcome.exported += 1;
                    // Updates are linked again under this session, so its
                    // undo covers them; resolution stays with the earliest
                    // link row per key.
                    links.push((item.resource_id, key.to_string()));
                    if args.sync_files {
                        export_files(engine, &mut templates, item, key, &mut outcome).await?;
                    }
                }
                None => {
                    if let Some(failure) = response.failure_for(index) {
                        warn!(
                            resource_id = item.resource_id,
                            code = failure.code,
                            message = %failure.message,
                            "Remote write rejected item"
                        );
                    }
                    outcome.failed += 1;
                }
            }
        }
        engine.repository.insert_links(args.session_id, &links).await?;
    }

    if !engine.is_cancelled() && outcome.version > args.version {
        engine
            .repository
            .advance_version(args.session_id, outcome.version)
            .await?;
    }

    info!(
        exported = outcome.exported,
        failed = outcome.failed,
        uploaded_files = outcome.uploaded_files,
        version = outcome.version,
        "Export run finished"
    );
    Ok(outcome)
}

/// Fetch the current remote records behind the existing links, keyed by
/// remote key. A key that no longer resolves is simply absent.
async fn fetch_remote_records(
    engine: &SyncEngine,
    existing_keys: &HashMap<i64, String>,
) -> Result<HashMap<String, RemoteItem>> {
    let keys: Vec<String> = existing_keys.values().cloned().collect();
    let mut records = HashMap::new();

    for chunk in keys.chunks(engine.config.chunk_size.max(1)) {
        if engine.is_cancelled() {
            info!("Stop requested, ending remote record fetch early");
            break;
        }
        let items = engine.connector.items_by_keys(&engine.library, chunk).await?;
        for item in items {
            records.insert(item.key.clone(), item);
        }
    }
    Ok(records)
}

/// Build one item payload: the item-type template with mapped values filled
/// into the fields it declares.
async fn build_item(
    engine: &SyncEngine,
    templates: &mut TemplateCache,
    record: &ResourceRecord,
    args: &ExportArgs,
    existing: Option<(&str, &RemoteItem)>,
) -> Result<Map<String, Value>> {
    let item_type = record
        .resource_class
        .as_deref()
        .and_then(|term| engine.mappings.resource_class.get(term))
        .unwrap_or(DEFAULT_ITEM_TYPE);

    let mut item = templates.get(engine, item_type, None).await?;

    for (term, field) in engine.mappings.property.iter() {
        if !item.contains_key(field) {
            continue;
        }
        if let Some(value) = record.value(term) {
            item.insert(field.to_string(), Value::String(value.to_string()));
        }
    }

    if item.contains_key("creators") {
        let mut creators = Vec::new();
        for (term, creator_type) in engine.mappings.creator_name.iter() {
            for name in record.values_of(term) {
                creators.push(serde_json::json!({
                    "creatorType": creator_type,
                    "name": name,
                }));
            }
        }
        item.insert("creators".to_string(), Value::Array(creators));
    }

    if item.contains_key("tags") {
        let tags: Vec<Value> = record
            .values_of("dcterms:subject")
            .iter()
            .map(|subject| serde_json::json!({ "tag": subject }))
            .collect();
        item.insert("tags".to_string(), Value::Array(tags));
    }

    if !args.collection_keys.is_empty() {
        let collections: Vec<Value> = args
            .collection_keys
            .iter()
            .map(|key| Value::String(key.clone()))
            .collect();
        item.insert("collections".to_string(), Value::Array(collections));
    }

    // In-place updates carry the key, the version guard and the original
    // timestamps so the remote end treats this as a modification.
    if let Some((key, remote)) = existing {
        item.insert("key".to_string(), Value::String(key.to_string()));
        item.insert("version".to_string(), Value::Number(remote.version.into()));
        if let Some(date_added) = &remote.data.date_added {
            item.insert("dateAdded".to_string(), Value::String(date_added.clone()));
        }
        if let Some(date_modified) = &remote.data.date_modified {
            item.insert(
                "dateModified".to_string(),
                Value::String(date_modified.clone()),
            );
        }
    }

    Ok(item)
}

/// Upload the stored media files of one written item as attachments. An
/// update first deletes the item's previous attachment children so the
/// remote set mirrors the local one.
///
/// Failures are per-attachment: a failed authorization, transfer or read
/// aborts that attachment only.
async fn export_files(
    engine: &SyncEngine,
    templates: &mut TemplateCache,
    item: &StagedItem,
    item_key: &str,
    outcome: &mut ExportOutcome,
) -> Result<()> {
    if item.existing_key.is_some() {
        delete_prior_attachments(engine, item_key).await;
    }

    for media in &item.record.media {
        if !media.is_file {
            continue;
        }
        let Some(path) = &media.storage_path else {
            debug!(media_id = media.id, "Media has no stored file, skipping");
            continue;
        };
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(media_id = media.id, "Media storage path has no usable file name");
            continue;
        };

        let title = media
            .values
            .get("dcterms:title")
            .and_then(|v| v.first())
            .cloned()
            .or_else(|| media.source.clone())
            .unwrap_or_else(|| filename.to_string());

        let mut attachment = templates
            .get(engine, "attachment", Some("imported_file"))
            .await?;
        attachment.insert("parentItem".to_string(), Value::String(item_key.to_string()));
        attachment.insert("title".to_string(), Value::String(title));
        attachment.insert("filename".to_string(), Value::String(filename.to_string()));
        if let Some(media_type) = &media.media_type {
            attachment.insert(
                "contentType".to_string(),
                Value::String(media_type.clone()),
            );
        }

        let items = vec![Value::Object(attachment)];
        let (response, version) = engine.connector.write_items(&engine.library, &items).await?;
        if let Some(version) = version {
            outcome.version = outcome.version.max(version);
        }
        let Some(attachment_key) = response.key_for(0) else {
            if let Some(failure) = response.failure_for(0) {
                warn!(
                    media_id = media.id,
                    code = failure.code,
                    message = %failure.message,
                    "Remote write rejected attachment"
                );
            }
            continue;
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(media_id = media.id, error = %e, "Failed to read stored file, skipping upload");
                continue;
            }
        };
        let upload = FileUpload {
            bytes: bytes.into(),
            filename: filename.to_string(),
            mtime_ms: media.created * 1000,
        };

        match engine
            .connector
            .upload_file(&engine.library, attachment_key, &upload)
            .await
        {
            Ok(_) => outcome.uploaded_files += 1,
            Err(e) => {
                warn!(media_id = media.id, error = %e, "File upload failed, skipping attachment");
            }
        }
    }

    Ok(())
}

/// Delete the attachment children an item already has remotely. Failures
/// are logged per child; a child that cannot be deleted is left in place.
async fn delete_prior_attachments(engine: &SyncEngine, item_key: &str) {
    let children = match engine.connector.item_children(&engine.library, item_key).await {
        Ok(children) => children,
        Err(e) => {
            warn!(item_key, error = %e, "Failed to list prior attachments");
            return;
        }
    };

    for child in children {
        if child.data.item_type.as_deref() != Some("attachment") {
            continue;
        }
        if let Err(e) = engine
            .connector
            .delete_item(&engine.library, &child.key, child.version)
            .await
        {
            warn!(item_key = %child.key, error = %e, "Failed to delete prior attachment");
        }
    }
}
