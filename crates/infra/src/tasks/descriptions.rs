use deckgen_ai::{Generated, prompts};
use deckgen_core::{DescriptionContent, Page, PageSlot, PageStatus, ProjectId, ProjectStatus, flatten, reconstruct};

use super::{JobRef, TaskContext, TaskError, TaskResult, prompt_context};
use crate::fan_out::FanOut;
use crate::usage;

/// Generate a description for every page of the project.
///
/// A page that fails is marked `Failed` and counted; the job still completes.
/// The project advances to `DescriptionsGenerated` only when every page succeeded.
pub fn generate_descriptions(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    max_concurrency: Option<usize>,
) -> anyhow::Result<()> {
    run(ctx, job, project_id, max_concurrency)?;
    Ok(())
}

fn run(ctx: &TaskContext, job: JobRef, project_id: ProjectId, max_concurrency: Option<usize>) -> TaskResult<()> {
    let text = ctx.text_generator()?;
    let project = ctx.project(job.owner, project_id)?;
    let pages = ctx.store.list_pages(job.owner, project_id)?;

    let outline = reconstruct(pages.iter().map(|p| &p.slot));
    let flat = flatten(&outline);
    if flat.len() != pages.len() {
        return Err(TaskError::precondition(format!(
            "page count mismatch: {} pages, outline has {}",
            pages.len(),
            flat.len()
        )));
    }
    ctx.begin(job, pages.len())?;

    let items: Vec<(&Page, &PageSlot)> = pages.iter().zip(&flat).collect();
    let prompt_ctx = prompt_context(&project);
    let fan_out = FanOut::new(max_concurrency.unwrap_or(ctx.config.max_description_workers));

    tracing::info!(
        job_id = %job.job_id,
        project_id = %project_id,
        pages = items.len(),
        max_concurrency = fan_out.max_concurrency(),
        "generating descriptions"
    );

    let report = fan_out.run(
        &items,
        |(page, slot)| -> TaskResult<Generated<String>> {
            let page_outline = slot
                .outline_content
                .as_ref()
                .ok_or_else(|| TaskError::precondition(format!("page {} has no outline", page.id)))?;
            let prompt = prompts::page_description(
                &prompt_ctx,
                &outline,
                page_outline,
                slot.order_index + 1,
                slot.part.as_deref(),
            );
            Ok(text.generate(&prompt)?)
        },
        |(page, _), result, progress| {
            match result {
                Ok(generated) => {
                    let content = DescriptionContent::new(generated.value.clone());
                    if let Err(e) = ctx
                        .store
                        .update_page(job.owner, page.id, &mut |p| p.set_description(content.clone()))
                    {
                        tracing::error!(page_id = %page.id, error = %e, "failed to save description");
                    }
                    usage::record(
                        ctx.store.as_ref(),
                        job.owner,
                        format!("Generate Description for Project {project_id}"),
                        None,
                        generated.usage_tokens,
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, page_id = %page.id, error = %e, "description failed");
                    ctx.mark_page(job.owner, page.id, PageStatus::Failed);
                }
            }
            ctx.report_progress(job, progress);
        },
    );

    if report.failed() == 0 {
        ctx.store.update_project(job.owner, project_id, &mut |p| {
            p.set_status(ProjectStatus::DescriptionsGenerated)
        })?;
    }

    tracing::info!(
        job_id = %job.job_id,
        completed = report.progress.completed,
        failed = report.progress.failed,
        "descriptions finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckgen_core::PageOutline;

    use crate::jobs::{JobKind, Progress};
    use crate::store::Store;
    use crate::tasks::fakes::{FakeImage, FakeText, Fixture};

    #[test]
    fn every_page_gets_a_description() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.seed_pages();
        let job = fx.job(JobKind::Descriptions, 3);

        generate_descriptions(&fx.ctx(), job, fx.project_id, Some(2)).unwrap();

        let pages = fx.pages();
        assert!(pages.iter().all(|p| p.slot.status == PageStatus::DescriptionGenerated));
        assert!(pages.iter().all(|p| p.slot.description_text().is_some()));
        assert_eq!(
            fx.job_record(job).progress,
            Progress {
                total: 3,
                completed: 3,
                failed: 0
            }
        );
        assert_eq!(fx.project().status, ProjectStatus::DescriptionsGenerated);
        assert_eq!(fx.store.list_usage(fx.owner).unwrap().len(), 3);
    }

    #[test]
    fn failed_page_is_isolated_and_blocks_project_advance() {
        let fx = Fixture::new(FakeText::new().failing_on("page 2:"), FakeImage::new());
        fx.seed_pages();
        let job = fx.job(JobKind::Descriptions, 3);

        generate_descriptions(&fx.ctx(), job, fx.project_id, None).unwrap();

        let pages = fx.pages();
        assert_eq!(pages[1].slot.status, PageStatus::Failed);
        assert_eq!(pages[0].slot.status, PageStatus::DescriptionGenerated);
        assert_eq!(pages[2].slot.status, PageStatus::DescriptionGenerated);
        let progress = fx.job_record(job).progress;
        assert_eq!((progress.completed, progress.failed), (2, 1));
        assert_eq!(fx.project().status, ProjectStatus::Draft);
    }

    #[test]
    fn page_without_outline_is_a_count_mismatch() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.seed_pages();
        let mut slot = PageSlot::draft(3, None, PageOutline::new("", Vec::<String>::new()));
        slot.outline_content = None;
        fx.add_page(slot);
        let job = fx.job(JobKind::Descriptions, 4);

        let err = generate_descriptions(&fx.ctx(), job, fx.project_id, None).unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Precondition(_))));
        assert_eq!(fx.text.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
