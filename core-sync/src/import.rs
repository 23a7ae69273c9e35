//! # Import Pipeline
//!
//! Pulls changed remote items into the host store: versioned listing, chunked
//! full fetch, vocabulary mapping, batch creation (or in-place update of
//! already-linked resources), link recording and cursor advancement.

use crate::engine::{FetchedItems, SyncEngine};
use crate::mapping::TermRef;
use crate::session::OnExisting;
use crate::Result;
use bridge_traits::{
    BridgeError, MediaDirective, ResourcePayload, ResourceStore, ResourceValue, ValueData,
};
use provider_zotero::RemoteItem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Arguments of one import run, serialized into the dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportArgs {
    pub session_id: i64,

    /// Host set the created resources are placed into.
    #[serde(default)]
    pub item_set_id: Option<i64>,

    /// Restrict the run to one remote collection.
    #[serde(default)]
    pub collection_key: Option<String>,

    /// Ingest attachment files alongside their items.
    #[serde(default)]
    pub sync_files: bool,

    pub on_existing: OnExisting,

    /// Version cursor the listing starts after.
    #[serde(default)]
    pub version: i64,
}

/// Tally of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    /// Cursor after the run. Unchanged from the input when the run was
    /// stopped early.
    pub version: i64,
}

/// Run one import. Per-item mapping and write failures are logged and
/// tallied; only infrastructure failures (listing, fetch, database) abort
/// the run.
#[instrument(skip(engine, store, args), fields(session_id = args.session_id))]
pub async fn run_import(
    engine: &SyncEngine,
    store: &dyn ResourceStore,
    args: &ImportArgs,
) -> Result<ImportOutcome> {
    let since = args.version.to_string();
    let params: &[(&str, &str)] = &[
        ("since", &since),
        ("format", "versions"),
        ("sort", "dateAdded"),
        ("direction", "asc"),
        ("itemType", "-note"),
    ];
    let listing_url = match &args.collection_key {
        Some(collection) => engine.library.collection_items(collection, params),
        None => engine.library.items(params),
    };

    let (keys, listing_version) = engine.connector.changed_versions(&listing_url).await?;
    let mut outcome = ImportOutcome {
        version: args.version,
        ..Default::default()
    };

    if keys.is_empty() {
        info!("No remote changes since last run");
        if let Some(version) = listing_version {
            engine
                .repository
                .advance_version(args.session_id, version)
                .await?;
            outcome.version = version;
        }
        return Ok(outcome);
    }

    let fetched = engine.fetch_remote_items(&keys).await?;

    // Resources already linked to these keys, when updating in place.
    let existing = match args.on_existing {
        OnExisting::Replace => {
            let parent_keys: Vec<String> =
                fetched.parents.iter().map(|p| p.key.clone()).collect();
            engine.repository.existing_links(&parent_keys).await?
        }
        OnExisting::Create => Default::default(),
    };

    let mut creates: Vec<(String, ResourcePayload)> = Vec::new();
    let mut updates: Vec<(i64, String, ResourcePayload)> = Vec::new();
    for parent in &fetched.parents {
        let payload = build_payload(engine, parent, &fetched, args);
        match existing.get(&parent.key) {
            Some(resource_id) => updates.push((*resource_id, parent.key.clone(), payload)),
            None => creates.push((parent.key.clone(), payload)),
        }
    }

    // Creation, chunked, tolerating per-item failures.
    for chunk in creates.chunks(engine.config.chunk_size.max(1)) {
        if engine.is_cancelled() {
            info!("Stop requested, ending import early");
            break;
        }

        let payloads: Vec<ResourcePayload> = chunk.iter().map(|(_, p)| p.clone()).collect();
        let refs = store.batch_create(payloads, true).await?;

        let mut links = Vec::new();
        for ((key, _), resource_ref) in chunk.iter().zip(refs) {
            match resource_ref {
                Some(resource) => {
                    links.push((resource.id, key.clone()));
                    outcome.created += 1;
                }
                None => {
                    warn!(key = %key, "Resource creation failed, skipping item");
                    outcome.failed += 1;
                }
            }
        }
        engine.repository.insert_links(args.session_id, &links).await?;
    }

    // In-place updates, one at a time. Each success is linked to this
    // session too, so undoing the session covers the updated resources.
    let mut update_links: Vec<(i64, String)> = Vec::new();
    for (resource_id, key, payload) in updates {
        if engine.is_cancelled() {
            info!("Stop requested, ending import early");
            break;
        }

        match store.update(resource_id, payload).await {
            Ok(_) => {
                update_links.push((resource_id, key));
                outcome.updated += 1;
            }
            Err(BridgeError::NotFound(id)) => {
                warn!(resource_id = id, "Linked resource no longer exists, skipping update");
                outcome.failed += 1;
            }
            Err(e) => {
                warn!(resource_id, error = %e, "Resource update failed, skipping item");
                outcome.failed += 1;
            }
        }
    }
    engine
        .repository
        .insert_links(args.session_id, &update_links)
        .await?;

    // The cursor only moves once everything listed has been processed.
    if !engine.is_cancelled() {
        if let Some(version) = listing_version {
            engine
                .repository
                .advance_version(args.session_id, version)
                .await?;
            outcome.version = version;
        }
    }

    info!(
        created = outcome.created,
        updated = outcome.updated,
        failed = outcome.failed,
        version = outcome.version,
        "Import run finished"
    );
    Ok(outcome)
}

/// Map one remote item (and its attachment children) to a store payload.
fn build_payload(
    engine: &SyncEngine,
    parent: &RemoteItem,
    fetched: &FetchedItems,
    args: &ImportArgs,
) -> ResourcePayload {
    let mut payload = ResourcePayload::default();
    if let Some(item_set_id) = args.item_set_id {
        payload.item_set_ids.push(item_set_id);
    }

    if let Some(item_type) = parent.data.item_type.as_deref() {
        let candidates = engine.mappings.item_type.candidates(item_type);
        payload.resource_class_id = engine.schema.resolve_class(candidates);
    }

    map_title(engine, parent, &mut payload.values);
    map_fields(engine, parent, &mut payload.values);
    map_creators(engine, parent, &mut payload.values);
    map_tags(engine, parent, &mut payload.values);

    // Media come from the item itself when it is an attachment, and from
    // its attachment children otherwise.
    if let Some(directive) = map_attachment(engine, parent, args) {
        payload.media.push(directive);
    }
    if let Some(children) = fetched.children.get(&parent.key) {
        for child in children {
            if let Some(directive) = map_attachment(engine, child, args) {
                payload.media.push(directive);
            }
        }
    }

    payload
}

/// Resolve a field's property, returning the winning term alongside its id
/// so the caller can key the value map.
fn resolve_field<'a>(
    engine: &'a SyncEngine,
    candidates: &'a [TermRef],
) -> Option<(&'a TermRef, i64)> {
    candidates
        .iter()
        .find_map(|term| engine.schema.property(term).map(|id| (term, id)))
}

fn push_value(
    values: &mut BTreeMap<String, Vec<ResourceValue>>,
    term: &TermRef,
    value: ResourceValue,
) {
    values.entry(term.to_string()).or_default().push(value);
}

fn map_title(
    engine: &SyncEngine,
    item: &RemoteItem,
    values: &mut BTreeMap<String, Vec<ResourceValue>>,
) {
    let Some(title) = item.data.title.as_deref().filter(|t| !t.is_empty()) else {
        return;
    };
    let candidates = engine.mappings.item_field.candidates("title");
    if let Some((term, property_id)) = resolve_field(engine, candidates) {
        push_value(values, term, ResourceValue::literal(property_id, title));
    }
}

/// Map the dynamic data fields. The `url` field becomes a URI-typed value;
/// everything else is a literal.
fn map_fields(
    engine: &SyncEngine,
    item: &RemoteItem,
    values: &mut BTreeMap<String, Vec<ResourceValue>>,
) {
    for (field, raw) in &item.data.fields {
        let Some(text) = raw.as_str().filter(|t| !t.is_empty()) else {
            continue;
        };
        let candidates = engine.mappings.item_field.candidates(field);
        let Some((term, property_id)) = resolve_field(engine, candidates) else {
            continue;
        };

        let data = if term.prefix == "bibo" && term.local_name == "uri" {
            ValueData::Uri(text.to_string())
        } else {
            ValueData::Literal(text.to_string())
        };
        push_value(values, term, ResourceValue { property_id, data });
    }
}

fn map_creators(
    engine: &SyncEngine,
    item: &RemoteItem,
    values: &mut BTreeMap<String, Vec<ResourceValue>>,
) {
    for creator in &item.data.creators {
        let Some(name) = creator.full_name() else {
            continue;
        };
        let candidates = engine.mappings.creator_type.candidates(&creator.creator_type);
        if let Some((term, property_id)) = resolve_field(engine, candidates) {
            push_value(values, term, ResourceValue::literal(property_id, name));
        }
    }
}

fn map_tags(
    engine: &SyncEngine,
    item: &RemoteItem,
    values: &mut BTreeMap<String, Vec<ResourceValue>>,
) {
    if item.data.tags.is_empty() {
        return;
    }
    let Some(subject) = TermRef::parse("dcterms:subject") else {
        return;
    };
    let Some(property_id) = engine.schema.property(&subject) else {
        return;
    };
    for tag in &item.data.tags {
        if !tag.tag.is_empty() {
            push_value(
                values,
                &subject,
                ResourceValue::literal(property_id, tag.tag.clone()),
            );
        }
    }
}

/// Build a media ingest directive for an attachment item, when files are
/// wanted and downloadable. The enclosure link is only present when the
/// fetch carried an API key and the attachment has a stored file.
fn map_attachment(
    engine: &SyncEngine,
    item: &RemoteItem,
    args: &ImportArgs,
) -> Option<MediaDirective> {
    if !args.sync_files || item.data.item_type.as_deref() != Some("attachment") {
        return None;
    }
    item.links.enclosure.as_ref()?;
    let api_key = engine.connector.api_key()?;

    let mut values = BTreeMap::new();
    if let Some(title) = item.data.title.as_deref().filter(|t| !t.is_empty()) {
        let candidates = engine.mappings.item_field.candidates("title");
        if let Some((term, property_id)) = resolve_field(engine, candidates) {
            push_value(
                &mut values,
                term,
                ResourceValue::literal(property_id, title),
            );
        }
    }

    Some(MediaDirective {
        source: engine.library.item_file(&item.key, &[]),
        ingest_url: engine.library.item_file(&item.key, &[("key", api_key)]),
        values,
    })
}
