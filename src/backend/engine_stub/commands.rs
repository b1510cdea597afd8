//! Command trait + registry for the stub engine's handler dispatch.
//! Reduced to an in-memory collection map rather than an on-disk
//! B-tree, since persistence is outside this harness's scope.

use std::collections::HashMap;

use bson::{doc, oid::ObjectId, Bson, Document};

type Collections = HashMap<String, Vec<Document>>;

/// One MongoDB-ish command handler, dispatched by name from a registry.
pub trait Command: Send + Sync {
    fn names(&self) -> &[&str];
    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document;
}

pub struct CommandRegistry {
    handlers: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        let handlers: Vec<Box<dyn Command>> = vec![
            Box::new(InsertCommand),
            Box::new(FindCommand),
            Box::new(UpdateCommand),
            Box::new(DeleteCommand),
            Box::new(CountCommand),
            Box::new(CountDocumentsCommand),
            Box::new(AggregateCommand),
            Box::new(PingCommand),
            Box::new(HelloCommand),
            Box::new(BuildInfoCommand),
            Box::new(ListCollectionsCommand),
            Box::new(ListIndexesCommand),
            Box::new(CreateIndexesCommand),
            Box::new(TransactionNoopCommand),
        ];
        Self { handlers }
    }

    pub fn execute(&self, command_doc: &Document, collections: &mut Collections) -> Document {
        for handler in &self.handlers {
            for name in handler.names() {
                if command_doc.contains_key(name) {
                    return handler.execute(command_doc, collections);
                }
            }
        }
        doc! {
            "ok": Bson::Double(0.0),
            "errmsg": format!("no such command: '{}'", first_key(command_doc)),
            "code": Bson::Int32(59),
            "codeName": "CommandNotFound",
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn first_key(doc: &Document) -> String {
    doc.keys().next().cloned().unwrap_or_default()
}

fn filter_matches(filter: &Document, candidate: &Document) -> bool {
    filter.iter().all(|(k, v)| candidate.get(k) == Some(v))
}

// ---------------------------------------------------------------------
// insert
// ---------------------------------------------------------------------

struct InsertCommand;

impl Command for InsertCommand {
    fn names(&self) -> &[&str] {
        &["insert"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("insert").unwrap_or("test").to_string();
        let bucket = collections.entry(coll_name).or_default();
        let mut inserted_ids = Vec::new();

        if let Ok(docs) = doc.get_array("documents") {
            for item in docs {
                if let Bson::Document(d) = item {
                    let mut with_id = d.clone();
                    with_id
                        .entry("_id".to_string())
                        .or_insert_with(|| Bson::ObjectId(ObjectId::new()));
                    inserted_ids.push(with_id.get("_id").cloned().unwrap_or(Bson::Null));
                    bucket.push(with_id);
                }
            }
        }

        let mut ids_doc = Document::new();
        for (i, id) in inserted_ids.iter().enumerate() {
            ids_doc.insert(i.to_string(), id.clone());
        }

        doc! {
            "ok": Bson::Double(1.0),
            "n": Bson::Int32(inserted_ids.len() as i32),
            "insertedIds": ids_doc,
        }
    }
}

// ---------------------------------------------------------------------
// find
// ---------------------------------------------------------------------

struct FindCommand;

impl Command for FindCommand {
    fn names(&self) -> &[&str] {
        &["find"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("find").unwrap_or("test").to_string();
        let filter = doc.get_document("filter").cloned().unwrap_or_default();
        let empty = Vec::new();
        let bucket = collections.get(&coll_name).unwrap_or(&empty);
        let matches: Vec<Bson> = bucket
            .iter()
            .filter(|d| filter_matches(&filter, d))
            .cloned()
            .map(Bson::Document)
            .collect();

        doc! {
            "ok": Bson::Double(1.0),
            "cursor": {
                "id": Bson::Int64(0),
                "ns": format!("test.{coll_name}"),
                "firstBatch": matches,
            },
        }
    }
}

// ---------------------------------------------------------------------
// update
// ---------------------------------------------------------------------

struct UpdateCommand;

impl Command for UpdateCommand {
    fn names(&self) -> &[&str] {
        &["update"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("update").unwrap_or("test").to_string();
        let bucket = collections.entry(coll_name).or_default();
        let mut matched = 0i64;
        let mut modified = 0i64;

        if let Ok(updates) = doc.get_array("updates") {
            for u in updates {
                let Bson::Document(update_spec) = u else {
                    continue;
                };
                let q = update_spec.get_document("q").cloned().unwrap_or_default();
                let apply = update_spec.get_document("u").cloned().unwrap_or_default();
                let upsert = update_spec.get_bool("upsert").unwrap_or(false);
                let mut any_matched = false;

                for existing in bucket.iter_mut() {
                    if filter_matches(&q, existing) {
                        any_matched = true;
                        matched += 1;
                        if apply_update(existing, &apply) {
                            modified += 1;
                        }
                    }
                }

                if !any_matched && upsert {
                    let mut new_doc = q.clone();
                    apply_update(&mut new_doc, &apply);
                    new_doc
                        .entry("_id".to_string())
                        .or_insert_with(|| Bson::ObjectId(ObjectId::new()));
                    bucket.push(new_doc);
                }
            }
        }

        doc! {
            "ok": Bson::Double(1.0),
            "n": Bson::Int64(matched),
            "nModified": Bson::Int64(modified),
        }
    }
}

/// Apply `$set`/`$unset`/`$inc` operators, or a plain-document
/// replacement when the update body carries no `$`-prefixed keys.
/// Returns whether anything changed.
fn apply_update(target: &mut Document, update: &Document) -> bool {
    let has_operators = update.keys().any(|k| k.starts_with('$'));
    if !has_operators {
        if target == update {
            return false;
        }
        let id = target.get("_id").cloned();
        *target = update.clone();
        if let Some(id) = id {
            target.insert("_id", id);
        }
        return true;
    }

    let mut changed = false;
    if let Some(Bson::Document(set_doc)) = update.get("$set") {
        for (k, v) in set_doc {
            if target.get(k) != Some(v) {
                target.insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }
    if let Some(Bson::Document(unset_doc)) = update.get("$unset") {
        for k in unset_doc.keys() {
            if target.remove(k).is_some() {
                changed = true;
            }
        }
    }
    if let Some(Bson::Document(inc_doc)) = update.get("$inc") {
        for (k, v) in inc_doc {
            let current = target.get_i64(k).unwrap_or(0);
            let delta = v.as_i64().unwrap_or(0);
            target.insert(k.clone(), Bson::Int64(current + delta));
            changed = true;
        }
    }
    changed
}

// ---------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------

struct DeleteCommand;

impl Command for DeleteCommand {
    fn names(&self) -> &[&str] {
        &["delete"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("delete").unwrap_or("test").to_string();
        let bucket = collections.entry(coll_name).or_default();
        let mut removed = 0i64;

        if let Ok(deletes) = doc.get_array("deletes") {
            for d in deletes {
                let Bson::Document(delete_spec) = d else {
                    continue;
                };
                let q = delete_spec.get_document("q").cloned().unwrap_or_default();
                let limit = delete_spec.get_i32("limit").unwrap_or(0);
                let mut count_this = 0i32;
                bucket.retain(|existing| {
                    let matches = filter_matches(&q, existing);
                    if matches && (limit == 0 || count_this < limit) {
                        count_this += 1;
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
            }
        }

        doc! {
            "ok": Bson::Double(1.0),
            "n": Bson::Int64(removed),
        }
    }
}

// ---------------------------------------------------------------------
// count / countDocuments
// ---------------------------------------------------------------------

struct CountCommand;

impl Command for CountCommand {
    fn names(&self) -> &[&str] {
        &["count"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("count").unwrap_or("test").to_string();
        let filter = doc.get_document("query").cloned().unwrap_or_default();
        let empty = Vec::new();
        let n = collections
            .get(&coll_name)
            .unwrap_or(&empty)
            .iter()
            .filter(|d| filter_matches(&filter, d))
            .count();
        doc! { "ok": Bson::Double(1.0), "n": Bson::Int64(n as i64) }
    }
}

struct CountDocumentsCommand;

impl Command for CountDocumentsCommand {
    fn names(&self) -> &[&str] {
        &["countDocuments"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc
            .get_str("countDocuments")
            .unwrap_or("test")
            .to_string();
        let filter = doc.get_document("query").cloned().unwrap_or_default();
        let empty = Vec::new();
        let n = collections
            .get(&coll_name)
            .unwrap_or(&empty)
            .iter()
            .filter(|d| filter_matches(&filter, d))
            .count();
        doc! { "ok": Bson::Double(1.0), "n": Bson::Int64(n as i64) }
    }
}

// ---------------------------------------------------------------------
// aggregate (minimal: $match + $limit pipeline only)
// ---------------------------------------------------------------------

struct AggregateCommand;

impl Command for AggregateCommand {
    fn names(&self) -> &[&str] {
        &["aggregate"]
    }

    fn execute(&self, doc: &Document, collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("aggregate").unwrap_or("test").to_string();
        let empty = Vec::new();
        let mut working: Vec<Document> = collections.get(&coll_name).unwrap_or(&empty).clone();

        if let Ok(pipeline) = doc.get_array("pipeline") {
            for stage in pipeline {
                let Bson::Document(stage_doc) = stage else {
                    continue;
                };
                if let Some(Bson::Document(match_filter)) = stage_doc.get("$match") {
                    working.retain(|d| filter_matches(match_filter, d));
                } else if let Ok(limit) = stage_doc.get_i32("$limit") {
                    working.truncate(limit.max(0) as usize);
                }
            }
        }

        let batch: Vec<Bson> = working.into_iter().map(Bson::Document).collect();
        doc! {
            "ok": Bson::Double(1.0),
            "cursor": {
                "id": Bson::Int64(0),
                "ns": format!("test.{coll_name}"),
                "firstBatch": batch,
            },
        }
    }
}

// ---------------------------------------------------------------------
// connection / admin commands
// ---------------------------------------------------------------------

struct PingCommand;

impl Command for PingCommand {
    fn names(&self) -> &[&str] {
        &["ping"]
    }

    fn execute(&self, _doc: &Document, _collections: &mut Collections) -> Document {
        doc! { "ok": Bson::Double(1.0) }
    }
}

struct HelloCommand;

impl Command for HelloCommand {
    fn names(&self) -> &[&str] {
        &["hello", "isMaster", "ismaster"]
    }

    fn execute(&self, _doc: &Document, _collections: &mut Collections) -> Document {
        doc! {
            "ok": Bson::Double(1.0),
            "ismaster": true,
            "maxWireVersion": Bson::Int32(17),
            "minWireVersion": Bson::Int32(0),
            "topologyVersion": { "processId": ObjectId::new(), "counter": Bson::Int64(0) },
        }
    }
}

struct BuildInfoCommand;

impl Command for BuildInfoCommand {
    fn names(&self) -> &[&str] {
        &["buildInfo", "buildinfo"]
    }

    fn execute(&self, _doc: &Document, _collections: &mut Collections) -> Document {
        doc! {
            "ok": Bson::Double(1.0),
            "version": "7.0.0-stub",
            "versionArray": [7_i32, 0_i32, 0_i32, 0_i32],
        }
    }
}

struct ListCollectionsCommand;

impl Command for ListCollectionsCommand {
    fn names(&self) -> &[&str] {
        &["listCollections"]
    }

    fn execute(&self, _doc: &Document, collections: &mut Collections) -> Document {
        let batch: Vec<Bson> = collections
            .keys()
            .map(|name| Bson::Document(doc! { "name": name.clone(), "type": "collection" }))
            .collect();
        doc! {
            "ok": Bson::Double(1.0),
            "cursor": { "id": Bson::Int64(0), "ns": "test.$cmd.listCollections", "firstBatch": batch },
        }
    }
}

struct ListIndexesCommand;

impl Command for ListIndexesCommand {
    fn names(&self) -> &[&str] {
        &["listIndexes"]
    }

    fn execute(&self, doc: &Document, _collections: &mut Collections) -> Document {
        let coll_name = doc.get_str("listIndexes").unwrap_or("test");
        let id_index = doc! {
            "v": Bson::Int32(2),
            "key": { "_id": Bson::Int32(1) },
            "name": "_id_",
            "ns": format!("test.{coll_name}"),
        };
        doc! {
            "ok": Bson::Double(1.0),
            "cursor": { "id": Bson::Int64(0), "ns": format!("test.{coll_name}"), "firstBatch": [id_index] },
        }
    }
}

struct CreateIndexesCommand;

impl Command for CreateIndexesCommand {
    fn names(&self) -> &[&str] {
        &["createIndexes"]
    }

    fn execute(&self, doc: &Document, _collections: &mut Collections) -> Document {
        let created = doc.get_array("indexes").map(|a| a.len()).unwrap_or(0);
        doc! {
            "ok": Bson::Double(1.0),
            "numIndexesBefore": Bson::Int32(1),
            "numIndexesAfter": Bson::Int32(1 + created as i32),
        }
    }
}

/// `startTransaction`/`commitTransaction`/`abortTransaction` are no-ops
/// against this in-memory stub, since it has no MVCC layer; they exist
/// only so scenarios that touch transaction plumbing have somewhere to
/// land.
struct TransactionNoopCommand;

impl Command for TransactionNoopCommand {
    fn names(&self) -> &[&str] {
        &["commitTransaction", "abortTransaction"]
    }

    fn execute(&self, _doc: &Document, _collections: &mut Collections) -> Document {
        doc! { "ok": Bson::Double(1.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let registry = CommandRegistry::new();
        let mut collections: Collections = HashMap::new();

        let insert = doc! { "insert": "widgets", "documents": [ { "name": "gear" } ] };
        let resp = registry.execute(&insert, &mut collections);
        assert_eq!(resp.get_f64("ok").unwrap(), 1.0);
        assert_eq!(resp.get_i32("n").unwrap(), 1);

        let find = doc! { "find": "widgets", "filter": { "name": "gear" } };
        let resp = registry.execute(&find, &mut collections);
        let batch = resp
            .get_document("cursor")
            .unwrap()
            .get_array("firstBatch")
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn unknown_command_reports_command_not_found() {
        let registry = CommandRegistry::new();
        let mut collections: Collections = HashMap::new();
        let resp = registry.execute(&doc! { "frobnicate": 1 }, &mut collections);
        assert_eq!(resp.get_f64("ok").unwrap(), 0.0);
        assert_eq!(resp.get_str("codeName").unwrap(), "CommandNotFound");
    }

    #[test]
    fn update_with_set_modifies_existing_document() {
        let registry = CommandRegistry::new();
        let mut collections: Collections = HashMap::new();
        registry.execute(
            &doc! { "insert": "widgets", "documents": [ { "_id": "1", "count": 1_i32 } ] },
            &mut collections,
        );
        let resp = registry.execute(
            &doc! {
                "update": "widgets",
                "updates": [ { "q": { "_id": "1" }, "u": { "$set": { "count": 2_i32 } } } ],
            },
            &mut collections,
        );
        assert_eq!(resp.get_i64("nModified").unwrap(), 1);
    }
}
