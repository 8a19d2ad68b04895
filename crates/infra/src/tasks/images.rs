use deckgen_ai::{Generated, Image, ImageOptions, markdown, prompts};
use deckgen_core::{OutlineNode, OwnerId, Page, PageId, PageStatus, Project, ProjectId, ProjectStatus, reconstruct};

use super::{JobRef, TaskContext, TaskError, TaskResult};
use crate::fan_out::FanOut;
use crate::jobs::Progress;
use crate::usage;

/// Per-request overrides for image jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageJobOptions {
    pub max_concurrency: Option<usize>,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
}

/// Shared inputs for rendering any page of one project.
struct PageRender<'a> {
    owner: OwnerId,
    project_id: ProjectId,
    outline: &'a [OutlineNode],
    template: &'a Image,
    extra_requirements: Option<&'a str>,
    options: &'a ImageOptions,
}

/// Generate an image for every page of the project.
pub fn generate_images(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    options: &ImageJobOptions,
) -> anyhow::Result<()> {
    run_all(ctx, job, project_id, options)?;
    Ok(())
}

/// Generate (or regenerate) the image of one page.
pub fn generate_single_image(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    page_id: PageId,
    options: &ImageJobOptions,
) -> anyhow::Result<()> {
    run_single(ctx, job, project_id, page_id, options)?;
    Ok(())
}

fn run_all(ctx: &TaskContext, job: JobRef, project_id: ProjectId, options: &ImageJobOptions) -> TaskResult<()> {
    ctx.image_generator()?;
    let project = ctx.project(job.owner, project_id)?;
    let template = load_template(ctx, &project)?;
    let pages = ctx.store.list_pages(job.owner, project_id)?;
    ctx.begin(job, pages.len())?;

    let outline = reconstruct(pages.iter().map(|p| &p.slot));
    let image_options = ctx.image_options(options.aspect_ratio.as_deref(), options.resolution.as_deref());
    let render = PageRender {
        owner: job.owner,
        project_id,
        outline: &outline,
        template: &template,
        extra_requirements: project.extra_requirements.as_deref(),
        options: &image_options,
    };
    let fan_out = FanOut::new(options.max_concurrency.unwrap_or(ctx.config.max_image_workers));

    tracing::info!(
        job_id = %job.job_id,
        project_id = %project_id,
        pages = pages.len(),
        max_concurrency = fan_out.max_concurrency(),
        "generating images"
    );

    let report = fan_out.run(
        &pages,
        |page| render_page(ctx, &render, page),
        |page, result, progress| {
            match result {
                Ok(generated) => finish_page(ctx, job.owner, project_id, page.id, generated),
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, page_id = %page.id, error = %e, "image failed");
                    ctx.mark_page(job.owner, page.id, PageStatus::Failed);
                }
            }
            ctx.report_progress(job, progress);
        },
    );

    if report.failed() == 0 {
        ctx.store
            .update_project(job.owner, project_id, &mut |p| p.set_status(ProjectStatus::Completed))?;
    }

    tracing::info!(
        job_id = %job.job_id,
        completed = report.progress.completed,
        failed = report.progress.failed,
        "images finished"
    );
    Ok(())
}

fn run_single(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    page_id: PageId,
    options: &ImageJobOptions,
) -> TaskResult<()> {
    ctx.image_generator()?;
    let project = ctx.project(job.owner, project_id)?;
    let page = ctx.page(job.owner, project_id, page_id)?;
    ctx.begin(job, 1)?;

    let rendered = (|| -> TaskResult<Generated<String>> {
        let template = load_template(ctx, &project)?;
        let pages = ctx.store.list_pages(job.owner, project_id)?;
        let outline = reconstruct(pages.iter().map(|p| &p.slot));
        let image_options = ctx.image_options(options.aspect_ratio.as_deref(), options.resolution.as_deref());
        let render = PageRender {
            owner: job.owner,
            project_id,
            outline: &outline,
            template: &template,
            extra_requirements: project.extra_requirements.as_deref(),
            options: &image_options,
        };
        render_page(ctx, &render, &page)
    })();

    match rendered {
        Ok(generated) => {
            finish_page(ctx, job.owner, project_id, page_id, &generated);
            ctx.report_progress(
                job,
                Progress {
                    total: 1,
                    completed: 1,
                    failed: 0,
                },
            );
            tracing::info!(job_id = %job.job_id, page_id = %page_id, "page image generated");
            Ok(())
        }
        Err(e) => {
            ctx.mark_page(job.owner, page_id, PageStatus::Failed);
            ctx.report_progress(
                job,
                Progress {
                    total: 1,
                    completed: 0,
                    failed: 1,
                },
            );
            Err(e)
        }
    }
}

fn load_template(ctx: &TaskContext, project: &Project) -> TaskResult<Image> {
    let path = project
        .template_image_path
        .as_deref()
        .ok_or_else(|| TaskError::precondition("project has no template image"))?;
    ctx.load_image(path)
}

/// Render one page and record the blob as a new version. Returns the blob path.
fn render_page(ctx: &TaskContext, render: &PageRender<'_>, page: &Page) -> TaskResult<Generated<String>> {
    let generator = ctx.image_generator()?;
    ctx.mark_page(render.owner, page.id, PageStatus::Generating);

    let current = ctx.page(render.owner, render.project_id, page.id)?;
    let description = current
        .slot
        .description_text()
        .ok_or_else(|| TaskError::precondition(format!("page {} has no description", page.id)))?;

    let refs = ctx.resolve_refs(&markdown::extract_image_urls(description));
    let section = current
        .slot
        .part
        .as_deref()
        .or_else(|| current.slot.outline_content.as_ref().map(|o| o.title.as_str()))
        .unwrap_or_default();
    let prompt = prompts::image_generation(
        render.outline,
        description,
        section,
        !refs.is_empty(),
        render.extra_requirements,
    );

    let generated = generator.generate(&prompt, Some(render.template), &refs, render.options)?;
    let path = ctx
        .blobs
        .save(&render.project_id.to_string(), "pages", &generated.value.bytes)?;
    ctx.ledger().create_version(render.owner, page.id, &path)?;
    Ok(generated.map(|_| path))
}

fn finish_page(ctx: &TaskContext, owner: OwnerId, project_id: ProjectId, page_id: PageId, generated: &Generated<String>) {
    let path = generated.value.as_str();
    if let Err(e) = ctx.store.update_page(owner, page_id, &mut |p| p.set_image(path)) {
        tracing::error!(page_id = %page_id, error = %e, "failed to save page image");
    }
    usage::record(
        ctx.store.as_ref(),
        owner,
        format!("Generate Image for Project {project_id}"),
        Some(path),
        generated.usage_tokens,
    );
}
