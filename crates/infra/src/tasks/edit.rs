use deckgen_core::{PageId, PageStatus, ProjectId};

use super::images::ImageJobOptions;
use super::{JobRef, TaskContext, TaskError, TaskResult};
use crate::jobs::Progress;
use crate::usage;

/// Edit a page's current image with a natural-language instruction. The result
/// becomes a new current version.
pub fn edit_image(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    page_id: PageId,
    instruction: &str,
    options: &ImageJobOptions,
) -> anyhow::Result<()> {
    run(ctx, job, project_id, page_id, instruction, options)?;
    Ok(())
}

fn run(
    ctx: &TaskContext,
    job: JobRef,
    project_id: ProjectId,
    page_id: PageId,
    instruction: &str,
    options: &ImageJobOptions,
) -> TaskResult<()> {
    let generator = ctx.image_generator()?;
    let page = ctx.page(job.owner, project_id, page_id)?;
    ctx.begin(job, 1)?;
    ctx.mark_page(job.owner, page_id, PageStatus::Generating);

    let edited = (|| -> TaskResult<(String, u64)> {
        let current_path = page
            .slot
            .image_path
            .as_deref()
            .ok_or_else(|| TaskError::precondition(format!("page {page_id} has no image to edit")))?;
        let current = ctx.load_image(current_path)?;
        let image_options = ctx.image_options(options.aspect_ratio.as_deref(), options.resolution.as_deref());

        let generated = generator.edit(instruction, &current, &[], &image_options)?;
        let path = ctx.blobs.save(&project_id.to_string(), "pages", &generated.value.bytes)?;
        ctx.ledger().create_version(job.owner, page_id, &path)?;
        ctx.store.update_page(job.owner, page_id, &mut |p| p.set_image(path.as_str()))?;
        Ok((path, generated.usage_tokens))
    })();

    match edited {
        Ok((path, tokens)) => {
            usage::record(
                ctx.store.as_ref(),
                job.owner,
                format!("Edit Image for Project {project_id}"),
                Some(&path),
                tokens,
            );
            ctx.report_progress(
                job,
                Progress {
                    total: 1,
                    completed: 1,
                    failed: 0,
                },
            );
            tracing::info!(job_id = %job.job_id, page_id = %page_id, path = %path, "page image edited");
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

#[cfg(test)]
mod tests {
    use super::*;
    use deckgen_core::{PageOutline, PageSlot};

    use crate::blob::BlobStore;
    use crate::jobs::JobKind;
    use crate::store::Store;
    use crate::tasks::fakes::{FakeImage, FakeText, Fixture};

    #[test]
    fn edit_appends_a_current_version() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let page = fx.add_page(PageSlot::draft(0, None, PageOutline::new("Chart", ["x"])));
        let original = fx.blobs.save(&fx.project_id.to_string(), "pages", &[9]).unwrap();
        fx.ctx().ledger().create_version(fx.owner, page.id, &original).unwrap();
        fx.store
            .update_page(fx.owner, page.id, &mut |p| p.set_image(original.as_str()))
            .unwrap();
        let job = fx.job(JobKind::EditImage, 1);

        edit_image(&fx.ctx(), job, fx.project_id, page.id, "make it blue", &ImageJobOptions::default()).unwrap();

        let versions = fx.store.list_versions(fx.owner, page.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 2);
        assert!(versions[0].is_current);
        assert!(!versions[1].is_current);

        let page = fx.store.get_page(fx.owner, page.id).unwrap().unwrap();
        assert_eq!(page.slot.image_path.as_deref(), Some(versions[0].image_path.as_str()));
        assert_eq!(page.slot.status, PageStatus::Completed);

        let calls = fx.image.calls();
        assert!(calls[0].edit);
        assert_eq!(calls[0].prompt, "make it blue");
    }

    #[test]
    fn edit_without_image_fails_and_marks_page() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let page = fx.add_page(PageSlot::draft(0, None, PageOutline::new("Chart", ["x"])));
        let job = fx.job(JobKind::EditImage, 1);

        let err = edit_image(&fx.ctx(), job, fx.project_id, page.id, "blue", &ImageJobOptions::default())
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Precondition(_))));
        let page = fx.store.get_page(fx.owner, page.id).unwrap().unwrap();
        assert_eq!(page.slot.status, PageStatus::Failed);
    }
}
