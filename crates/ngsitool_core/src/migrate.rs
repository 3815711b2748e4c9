//! Bulk copy and bulk remove of every entity of one type.
//!
//! Both jobs share one loop shape: fetch a page, read the total count, pass
//! the dry-run gate on the first page, decode, mutate, decide whether to
//! fetch again. They differ in how the next page is found:
//!
//! * copy is non-destructive, so it walks the source with an advancing
//!   `offset` until the window passes the reported count;
//! * remove deletes what it just read, so it re-issues the same zero-offset
//!   query until the broker reports a count of zero.
//!
//! Everything is synchronous and single-threaded: one fetch, then at most one
//! mutation, per iteration. The remove discipline depends on that ordering.

use std::io::Write;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{
    BrokerClient, BrokerRequest, BrokerResponse, CONTENT_TYPE_JSON, HEADER_LINK, context_link,
};
use crate::codec::decode_page;
use crate::count::extract_count;
use crate::dialect::Dialect;
use crate::entity::Entity;
use crate::error::{MigrationError, MigrationResult};
use crate::gate;
use crate::mutator::{self, Batch, MutationVerb};

pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Copy,
    Remove,
}

impl Operation {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Remove => "remove",
        }
    }

    pub fn past_participle(self) -> &'static str {
        match self {
            Self::Copy => "copied",
            Self::Remove => "removed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Set by `--run`; without it the job only reports the count.
    pub confirmed: bool,
    pub skip_forwarding: bool,
    /// `@context` attached to entities created on a linked-data destination.
    pub destination_context: Option<String>,
    /// `@context` sent as a `Link` header on linked-data listings.
    pub link: Option<String>,
    pub limit: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            confirmed: false,
            skip_forwarding: false,
            destination_context: None,
            link: None,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    DryRun { count: usize },
    Completed { total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub operation: Operation,
    pub entity_type: String,
    pub outcome: Outcome,
    pub fetches: usize,
    pub mutations: usize,
}

/// Per-run state: what is being moved and how far the loop got.
#[derive(Debug)]
struct MigrationJob<'a> {
    operation: Operation,
    entity_type: &'a str,
    limit: usize,
    page_index: usize,
    total: usize,
    fetches: usize,
    mutations: usize,
}

impl<'a> MigrationJob<'a> {
    fn new(operation: Operation, entity_type: &'a str, limit: usize) -> Self {
        Self {
            operation,
            entity_type,
            limit: limit.max(1),
            page_index: 0,
            total: 0,
            fetches: 0,
            mutations: 0,
        }
    }

    fn offset(&self) -> usize {
        self.page_index * self.limit
    }

    fn is_first_fetch(&self) -> bool {
        self.fetches == 1
    }

    fn fetch<C: BrokerClient + ?Sized>(
        &mut self,
        client: &mut C,
        request: BrokerRequest,
    ) -> MigrationResult<BrokerResponse> {
        self.fetches += 1;
        client.execute(request)?.ensure_status(|status| (200..300).contains(&status))
    }

    fn mutate<C: BrokerClient + ?Sized>(
        &mut self,
        client: &mut C,
        verb: MutationVerb,
        batch: Batch,
    ) -> MigrationResult<usize> {
        self.mutations += 1;
        mutator::apply(client, verb, batch)
    }

    /// Move the copy window forward; `false` once it covers `count`.
    fn advance(&mut self, count: usize) -> bool {
        if (self.page_index + 1) * self.limit < count {
            self.page_index += 1;
            true
        } else {
            false
        }
    }

    fn report(&self, outcome: Outcome) -> MigrationReport {
        MigrationReport {
            operation: self.operation,
            entity_type: self.entity_type.to_string(),
            outcome,
            fetches: self.fetches,
            mutations: self.mutations,
        }
    }

    fn finish<W: Write + ?Sized>(&self, out: &mut W) -> MigrationResult<MigrationReport> {
        writeln!(out, "{}", self.total)?;
        info!(
            operation = self.operation.verb(),
            entity_type = self.entity_type,
            total = self.total,
            fetches = self.fetches,
            mutations = self.mutations,
            "job completed"
        );
        Ok(self.report(Outcome::Completed { total: self.total }))
    }
}

/// Copy every entity of `entity_type` from `source` to `destination`.
///
/// Writes either the dry-run advisory or the final total to `out`.
pub fn copy_entities<S, D, W>(
    source: &mut S,
    destination: &mut D,
    entity_type: &str,
    options: &JobOptions,
    out: &mut W,
) -> MigrationResult<MigrationReport>
where
    S: BrokerClient + ?Sized,
    D: BrokerClient + ?Sized,
    W: Write + ?Sized,
{
    validate_entity_type(entity_type)?;
    let dialect = source.profile().dialect;
    let destination_dialect = destination.profile().dialect;
    if dialect != destination_dialect {
        return Err(MigrationError::DialectMismatch {
            from: dialect,
            to: destination_dialect,
        });
    }
    if source.profile().same_partition(destination.profile()) {
        return Err(MigrationError::InvalidJob(
            "source and destination are same".to_string(),
        ));
    }
    validate_link(dialect, options)?;

    let mut job = MigrationJob::new(Operation::Copy, entity_type, options.limit);
    loop {
        let request = list_request(dialect, Operation::Copy, &job, options)?;
        let response = job.fetch(source, request)?;
        let count = extract_count(dialect, &response)?;

        if job.is_first_fetch() && !gate::check(options.confirmed, Operation::Copy, count, out)? {
            return Ok(job.report(Outcome::DryRun { count }));
        }
        if count == 0 {
            break;
        }

        let entities = decode_page(dialect, &response, job.limit)?;
        debug!(
            entity_type,
            page = job.page_index,
            count,
            page_size = entities.len(),
            "copy page fetched"
        );
        if entities.is_empty() {
            warn!(entity_type, count, "broker reported matches but returned an empty page");
            break;
        }

        let page_size = entities.len();
        let entities = match options.destination_context.as_deref() {
            Some(context) if destination_dialect == Dialect::LinkedData => entities
                .into_iter()
                .map(|entity| entity.with_context(context))
                .collect(),
            _ => entities,
        };
        job.mutate(destination, MutationVerb::Append, Batch::Entities(entities))?;
        job.total += page_size;

        if !job.advance(count) {
            break;
        }
    }

    job.finish(out)
}

/// Delete every entity of `entity_type` from the broker behind `client`.
///
/// The running total grows by `min(limit, count)` per page before the delete
/// is issued; it is never re-verified against the broker.
pub fn remove_entities<C, W>(
    client: &mut C,
    entity_type: &str,
    options: &JobOptions,
    out: &mut W,
) -> MigrationResult<MigrationReport>
where
    C: BrokerClient + ?Sized,
    W: Write + ?Sized,
{
    validate_entity_type(entity_type)?;
    let dialect = client.profile().dialect;
    validate_link(dialect, options)?;
    let listing = listing_dialect(dialect, Operation::Remove);

    let mut job = MigrationJob::new(Operation::Remove, entity_type, options.limit);
    loop {
        let request = list_request(listing, Operation::Remove, &job, options)?;
        let response = job.fetch(client, request)?;
        let count = extract_count(listing, &response)?;

        if job.is_first_fetch()
            && !gate::check(options.confirmed, Operation::Remove, count, out)?
        {
            return Ok(job.report(Outcome::DryRun { count }));
        }
        if count == 0 {
            break;
        }

        let entities = decode_page(listing, &response, job.limit)?;
        debug!(
            entity_type,
            iteration = job.fetches,
            count,
            page_size = entities.len(),
            "remove page fetched"
        );
        if entities.is_empty() {
            warn!(entity_type, count, "broker reported matches but returned an empty page");
            break;
        }

        job.total += count.min(job.limit);
        let batch = deletion_batch(dialect, &entities);
        job.mutate(client, MutationVerb::Delete, batch)?;
    }

    job.finish(out)
}

/// Legacy brokers report an empty match as an envelope error rather than
/// `Count: 0`, so removal lists candidates through their flat-JSON API.
fn listing_dialect(dialect: Dialect, operation: Operation) -> Dialect {
    match (dialect, operation) {
        (Dialect::Legacy, Operation::Remove) => Dialect::FlatJson,
        (dialect, _) => dialect,
    }
}

fn deletion_batch(dialect: Dialect, entities: &[Entity]) -> Batch {
    match dialect {
        Dialect::LinkedData => Batch::Identifiers(
            entities
                .iter()
                .map(|entity| entity.id().to_string())
                .collect(),
        ),
        Dialect::Legacy => Batch::Entities(
            entities
                .iter()
                .map(Entity::legacy_delete_projection)
                .collect(),
        ),
        Dialect::FlatJson => Batch::Entities(entities.to_vec()),
    }
}

fn list_request(
    dialect: Dialect,
    operation: Operation,
    job: &MigrationJob<'_>,
    options: &JobOptions,
) -> MigrationResult<BrokerRequest> {
    let limit = job.limit.to_string();
    let request = match dialect {
        Dialect::FlatJson => {
            let count_option = if options.skip_forwarding {
                "count,skipForwarding"
            } else {
                "count"
            };
            let request = BrokerRequest::get(format!("{}/entities", dialect.base_path()))
                .query("type", job.entity_type)
                .query("options", count_option)
                .query("limit", limit);
            match operation {
                Operation::Copy => request.query("offset", job.offset().to_string()),
                Operation::Remove => request.query("attrs", "__NONE"),
            }
        }
        Dialect::LinkedData => {
            let request = BrokerRequest::get(format!("{}/entities", dialect.base_path()))
                .query("type", job.entity_type)
                .query("count", "true")
                .query("limit", limit);
            let request = match operation {
                Operation::Copy => request.query("offset", job.offset().to_string()),
                Operation::Remove => request,
            };
            match options.link.as_deref() {
                Some(link) => request.header(HEADER_LINK, context_link(link)),
                None => request,
            }
        }
        Dialect::Legacy => {
            let payload = json!({
                "entities": [{"type": job.entity_type, "isPattern": "true", "id": ".*"}]
            });
            let body = serde_json::to_vec(&payload)
                .map_err(|error| MigrationError::decode("legacy query request", error))?;
            BrokerRequest::post(
                format!("{}/queryContext", dialect.base_path()),
                CONTENT_TYPE_JSON,
                body,
            )
            .query("details", "on")
            .query("limit", limit)
            .query("offset", job.offset().to_string())
        }
    };
    Ok(request)
}

/// Only linked-data brokers resolve type names through a `Link` context.
fn validate_link(dialect: Dialect, options: &JobOptions) -> MigrationResult<()> {
    if options.link.is_some() && dialect != Dialect::LinkedData {
        return Err(MigrationError::InvalidJob(format!(
            "can't specify --link option on {dialect} broker"
        )));
    }
    Ok(())
}

fn validate_entity_type(entity_type: &str) -> MigrationResult<()> {
    if entity_type.trim().is_empty() {
        return Err(MigrationError::InvalidJob(
            "entity type must not be empty".to_string(),
        ));
    }
    Ok(())
}
