//! Page creation for content larger than one request can carry.
//!
//! A run moves through `Validating → Splitting → Creating → Appending(2..=N) → Completed`
//! and never revisits a stage. Appends are strictly sequential: each one reads the
//! version left by the previous step and names `version + 1`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::{ContentApi, NewPage, Page};
use crate::error::{AssemblyError, RemoteError};
use crate::splitter::{Chunk, SplitOptions, split_content_with};

pub const DEFAULT_CHUNK_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "stage")]
pub enum AssemblyStage {
    Validating,
    Splitting,
    /// Single-shot or first-chunk creation.
    Creating,
    Appending { chunk: usize },
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRequest<'a> {
    pub title: &'a str,
    pub content: &'a [u8],
    pub space_key: &'a str,
    pub parent_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendRecord {
    pub chunk: usize,
    pub bytes: usize,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyResult {
    pub page_id: String,
    pub title: String,
    pub space_key: String,
    pub url: String,
    pub version: u64,
    pub total_bytes: usize,
    pub chunks: usize,
    pub chunked: bool,
    pub appends: Vec<AppendRecord>,
}

impl AssemblyResult {
    pub(crate) fn single(page: Page, total_bytes: usize) -> Self {
        Self {
            page_id: page.id,
            title: page.title,
            space_key: page.space_key,
            url: page.url,
            version: page.version,
            total_bytes,
            chunks: 1,
            chunked: false,
            appends: Vec::new(),
        }
    }
}

/// Create a page in one request. Fails before any I/O when a required field is empty.
pub fn create_single_page<A: ContentApi>(
    api: &mut A,
    title: &str,
    content: &str,
    space_key: &str,
    parent_id: Option<&str>,
) -> Result<Page, AssemblyError> {
    validate(title, content.as_bytes(), space_key)?;
    let page = api.create_page(&NewPage {
        title: title.to_string(),
        space_key: space_key.to_string(),
        content: content.to_string(),
        parent_id: parent_id.map(ToString::to_string),
    })?;
    info!(page_id = %page.id, version = page.version, "created page");
    Ok(page)
}

pub fn assemble_page_with_api<A: ContentApi>(
    api: &mut A,
    request: &AssemblyRequest<'_>,
    max_chunk_bytes: usize,
) -> Result<AssemblyResult, AssemblyError> {
    assemble_page_with_options(api, request, &SplitOptions::new(max_chunk_bytes))
}

pub fn assemble_page_with_options<A: ContentApi>(
    api: &mut A,
    request: &AssemblyRequest<'_>,
    options: &SplitOptions,
) -> Result<AssemblyResult, AssemblyError> {
    enter(AssemblyStage::Validating);
    validate(request.title, request.content, request.space_key)?;

    let total_bytes = request.content.len();
    enter(AssemblyStage::Splitting);
    let chunks = split_content_with(request.content, options)?;

    let mut chunks = chunks.into_iter();
    let Some(first) = chunks.next() else {
        return Err(AssemblyError::validation("content produced no chunks"));
    };
    let remaining = chunks.collect::<Vec<_>>();
    let total_chunks = remaining.len() + 1;

    enter(AssemblyStage::Creating);
    if total_chunks == 1 {
        let page = create_single_page(
            api,
            request.title,
            &first.text,
            request.space_key,
            request.parent_id,
        )?;
        enter(AssemblyStage::Completed);
        return Ok(AssemblyResult::single(page, total_bytes));
    }

    info!(
        total_bytes,
        max_chunk_bytes = options.max_chunk_bytes,
        total_chunks,
        "content exceeds chunk size, creating page in chunks"
    );
    info!(
        chunk = 1,
        total_chunks,
        bytes = first.byte_len(),
        "creating page with first chunk"
    );
    let created = api.create_page(&NewPage {
        title: request.title.to_string(),
        space_key: request.space_key.to_string(),
        content: first.text,
        parent_id: request.parent_id.map(ToString::to_string),
    })?;
    info!(page_id = %created.id, version = created.version, "page created");

    let mut appends = Vec::with_capacity(remaining.len());
    let mut completed_chunks = 1usize;
    let mut version = created.version;
    for chunk in &remaining {
        enter(AssemblyStage::Appending { chunk: chunk.index });
        let record = append_chunk(api, &created.id, chunk).map_err(|source| {
            warn!(
                page_id = %created.id,
                failed_chunk = chunk.index,
                completed_chunks,
                total_chunks,
                "chunk append failed, page left partially populated"
            );
            AssemblyError::PartialAssembly {
                page_id: created.id.clone(),
                completed_chunks,
                total_chunks,
                failed_chunk: chunk.index,
                source,
            }
        })?;
        info!(
            chunk = record.chunk,
            total_chunks,
            bytes = record.bytes,
            version = record.version,
            "appended chunk"
        );
        version = record.version;
        completed_chunks += 1;
        appends.push(record);
    }

    enter(AssemblyStage::Completed);
    info!(page_id = %created.id, total_chunks, total_bytes, "all chunks appended");
    Ok(AssemblyResult {
        page_id: created.id,
        title: created.title,
        space_key: created.space_key,
        url: created.url,
        version,
        total_bytes,
        chunks: total_chunks,
        chunked: true,
        appends,
    })
}

fn enter(stage: AssemblyStage) {
    debug!(?stage, "assembly stage");
}

fn append_chunk<A: ContentApi>(
    api: &mut A,
    page_id: &str,
    chunk: &Chunk,
) -> Result<AppendRecord, RemoteError> {
    let current = api.read_page(page_id)?;
    let mut content = current.content;
    content.push_str(&chunk.text);
    let updated = api.update_page(page_id, current.version + 1, &content, Some(&current.title))?;
    Ok(AppendRecord {
        chunk: chunk.index,
        bytes: chunk.byte_len(),
        version: updated.version,
    })
}

fn validate(title: &str, content: &[u8], space_key: &str) -> Result<(), AssemblyError> {
    if title.is_empty() {
        return Err(AssemblyError::validation("page title is required"));
    }
    if content.is_empty() {
        return Err(AssemblyError::validation("page content is required"));
    }
    if space_key.is_empty() {
        return Err(AssemblyError::validation("space key is required"));
    }
    Ok(())
}
