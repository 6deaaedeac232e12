use serde::Serialize;
use tracing::info;

use crate::assemble::{
    AssemblyRequest, AssemblyResult, assemble_page_with_api, create_single_page,
};
use crate::client::{Attachment, ContentApi, Page};
use crate::error::AssemblyError;
use crate::markup::{InputFormat, OutputFormat, markdown_to_storage, storage_to_markdown};

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub id: String,
    pub title: String,
    pub url: String,
    pub space: String,
    pub content: String,
    pub version: u64,
    pub last_updated: String,
    pub last_updated_by: String,
    pub labels: Vec<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default)]
pub struct PageEdit {
    pub content: Option<String>,
    pub title: Option<String>,
    pub format: Option<InputFormat>,
    pub append: bool,
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub title: String,
    pub content: Vec<u8>,
    pub space_key: String,
    pub parent_id: Option<String>,
    pub format: InputFormat,
    /// Switches to chunked creation when the rendered content is larger than this.
    pub chunk_size: Option<usize>,
}

/// Pull the numeric page id out of `/pages/<id>` or `pageId=<id>` URLs.
pub fn extract_page_id(page_url: &str) -> Result<String, AssemblyError> {
    for marker in ["/pages/", "pageId="] {
        let mut rest = page_url;
        while let Some(position) = rest.find(marker) {
            rest = &rest[position + marker.len()..];
            let digits = rest
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            if !digits.is_empty() {
                return Ok(digits);
            }
        }
    }
    Err(AssemblyError::validation(format!(
        "cannot extract a page id from URL: {page_url}"
    )))
}

pub fn get_page_with_api<A: ContentApi>(
    api: &mut A,
    page_id: &str,
    format: OutputFormat,
) -> Result<PageView, AssemblyError> {
    let page_id = page_id.trim();
    if page_id.is_empty() {
        return Err(AssemblyError::validation("a page id or page URL is required"));
    }
    let page = api.read_page(page_id)?;
    let content = match format {
        OutputFormat::Storage => page.content.clone(),
        OutputFormat::View => page.view_content.clone().unwrap_or_default(),
        OutputFormat::Markdown => storage_to_markdown(&page.content),
    };
    Ok(PageView {
        id: page.id,
        title: page.title,
        url: page.url,
        space: page.space_key,
        content,
        version: page.version,
        last_updated: page.last_updated,
        last_updated_by: page.last_updated_by,
        labels: page.labels,
        attachments: page.attachments,
    })
}

/// Replace or append page content and/or rename the page in a single versioned update.
pub fn update_page_with_api<A: ContentApi>(
    api: &mut A,
    page_id: &str,
    edit: &PageEdit,
) -> Result<Page, AssemblyError> {
    let page_id = page_id.trim();
    if page_id.is_empty() {
        return Err(AssemblyError::validation("a page id or page URL is required"));
    }
    let content = edit.content.as_deref().filter(|value| !value.is_empty());
    let title = edit.title.as_deref().filter(|value| !value.trim().is_empty());
    if content.is_none() && title.is_none() {
        return Err(AssemblyError::validation(
            "an update needs new content or a new title",
        ));
    }

    let current = api.read_page(page_id)?;
    let final_content = match content {
        Some(content) => {
            let rendered = render(content, edit.format.unwrap_or(InputFormat::Markdown));
            if edit.append {
                format!("{}\n{}", current.content, rendered)
            } else {
                rendered
            }
        }
        None => current.content.clone(),
    };
    let final_title = title.unwrap_or(&current.title);

    let updated = api.update_page(
        page_id,
        current.version + 1,
        &final_content,
        Some(final_title),
    )?;
    info!(page_id = %updated.id, version = updated.version, "updated page");
    Ok(updated)
}

pub fn create_page_with_api<A: ContentApi>(
    api: &mut A,
    options: &CreateOptions,
) -> Result<AssemblyResult, AssemblyError> {
    let storage = match options.format {
        InputFormat::Html => options.content.clone(),
        InputFormat::Markdown => {
            let markdown = std::str::from_utf8(&options.content).map_err(|error| {
                AssemblyError::Encoding {
                    offset: error.valid_up_to(),
                }
            })?;
            markdown_to_storage(markdown).into_bytes()
        }
    };

    let parent_id = options.parent_id.as_deref();
    match options.chunk_size {
        Some(chunk_size) => assemble_page_with_api(
            api,
            &AssemblyRequest {
                title: &options.title,
                content: &storage,
                space_key: &options.space_key,
                parent_id,
            },
            chunk_size,
        ),
        None => {
            let text = String::from_utf8(storage).map_err(|error| AssemblyError::Encoding {
                offset: error.utf8_error().valid_up_to(),
            })?;
            let total_bytes = text.len();
            let page = create_single_page(
                api,
                &options.title,
                &text,
                &options.space_key,
                parent_id,
            )?;
            Ok(AssemblyResult::single(page, total_bytes))
        }
    }
}

fn render(content: &str, format: InputFormat) -> String {
    match format {
        InputFormat::Markdown => markdown_to_storage(content),
        InputFormat::Html => content.to_string(),
    }
}
