//! Prompt builders for each generation step.

use deckgen_core::{OutlineNode, PageOutline, outline_text};

use crate::markdown;

const OUTLINE_SHAPE: &str = r#"Return ONLY a JSON array. Each entry is either a page
{"title": "...", "points": ["...", "..."]}
or a part grouping several pages
{"part": "...", "pages": [{"title": "...", "points": ["..."]}]}"#;

/// Project-level inputs shared by every prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub idea_prompt: Option<String>,
    pub outline_text: Option<String>,
    pub extra_requirements: Option<String>,
}

/// Outline from a free-form idea.
pub fn outline_generation(ctx: &PromptContext) -> String {
    let idea = ctx.idea_prompt.as_deref().unwrap_or_default();
    format!(
        "You are helping the user create a presentation.\n\
         Topic / idea:\n{idea}\n\n\
         Draft an outline for the presentation. Group related pages into parts when the deck \
         has clear sections; otherwise list pages directly.\n\n{OUTLINE_SHAPE}"
    )
}

/// Outline from user-written outline text. The text must be split, not rewritten.
pub fn outline_parsing(ctx: &PromptContext) -> String {
    let text = ctx.outline_text.as_deref().unwrap_or_default();
    format!(
        "The user wrote the following presentation outline:\n{text}\n\n\
         Split it into pages without changing the wording. Keep any section headings as parts.\n\n\
         {OUTLINE_SHAPE}"
    )
}

/// Description of a single page (1-based `page_index`).
pub fn page_description(
    ctx: &PromptContext,
    outline: &[OutlineNode],
    page: &PageOutline,
    page_index: usize,
    part: Option<&str>,
) -> String {
    let mut prompt = String::new();
    if let Some(idea) = ctx.idea_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Presentation topic:\n{idea}\n\n"));
    }
    prompt.push_str(&format!("Full outline:\n{}\n\n", outline_text(outline)));
    prompt.push_str(&format!("Write the content for page {page_index}: {}\n", page.title));
    for point in &page.points {
        prompt.push_str(&format!("- {point}\n"));
    }
    if let Some(part) = part {
        prompt.push_str(&format!("\nThis page belongs to: {part}\n"));
    }
    prompt.push_str(
        "\nDescribe the page title, the on-slide text and any visual elements. \
         Keep it concise; this text is used to render the slide image.",
    );
    prompt
}

/// Image prompt for a page. `current_section` is the part name, or the page title.
pub fn image_generation(
    outline: &[OutlineNode],
    page_description: &str,
    current_section: &str,
    has_material_images: bool,
    extra_requirements: Option<&str>,
) -> String {
    let cleaned = markdown::remove_images(page_description);
    let mut prompt = format!(
        "Render one presentation slide, following the style of the reference template image.\n\n\
         Deck outline:\n{}\n\n\
         Current section: {current_section}\n\n\
         Slide content:\n{cleaned}\n",
        outline_text(outline)
    );
    if has_material_images {
        prompt.push_str("\nThe additional reference images are materials to place on this slide.\n");
    }
    if let Some(extra) = extra_requirements.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional requirements:\n{extra}\n"));
    }
    prompt
}
