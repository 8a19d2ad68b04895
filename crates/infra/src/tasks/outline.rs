use deckgen_ai::prompts;
use deckgen_core::{CreationType, DomainError, Page, ProjectId, ProjectStatus, flatten, parse_outline_json};

use super::{JobRef, TaskContext, TaskResult, prompt_context};
use crate::jobs::Progress;
use crate::usage;

/// Generate the outline and replace the project's pages with its flattened form.
pub fn generate_outline(ctx: &TaskContext, job: JobRef, project_id: ProjectId) -> anyhow::Result<()> {
    run(ctx, job, project_id)?;
    Ok(())
}

fn run(ctx: &TaskContext, job: JobRef, project_id: ProjectId) -> TaskResult<()> {
    let text = ctx.text_generator()?;
    let project = ctx.project(job.owner, project_id)?;
    ctx.begin(job, 1)?;

    let prompt_ctx = prompt_context(&project);
    let prompt = match project.creation_type {
        CreationType::Idea => prompts::outline_generation(&prompt_ctx),
        CreationType::Outline => prompts::outline_parsing(&prompt_ctx),
    };
    let generated = text.generate(&prompt)?;
    let outline = parse_outline_json(&generated.value)?;

    let pages: Vec<Page> = flatten(&outline)
        .into_iter()
        .map(|slot| Page::new(project.id, job.owner, slot))
        .collect();
    if pages.is_empty() {
        return Err(DomainError::validation("outline has no pages").into());
    }
    let page_count = pages.len();

    ctx.store.replace_pages(job.owner, project.id, pages)?;
    ctx.store
        .update_project(job.owner, project.id, &mut |p| p.set_status(ProjectStatus::OutlineGenerated))?;

    usage::record(
        ctx.store.as_ref(),
        job.owner,
        format!("Generate Outline for Project {}", project.id),
        None,
        generated.usage_tokens,
    );
    ctx.report_progress(
        job,
        Progress {
            total: 1,
            completed: 1,
            failed: 0,
        },
    );

    tracing::info!(
        job_id = %job.job_id,
        project_id = %project.id,
        pages = page_count,
        provider = text.provider(),
        "outline generated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use crate::tasks::TaskError;
    use crate::tasks::fakes::{FakeImage, FakeText, Fixture};

    #[test]
    fn outline_replaces_pages_in_order() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.seed_pages();
        let job = fx.job(JobKind::Outline, 1);

        generate_outline(&fx.ctx(), job, fx.project_id).unwrap();

        let pages = fx.pages();
        let titles: Vec<_> = pages
            .iter()
            .map(|p| p.slot.outline_content.as_ref().unwrap().title.clone())
            .collect();
        assert_eq!(titles, ["Intro", "P1", "P2"]);
        assert_eq!(pages[1].slot.part.as_deref(), Some("Body"));
        assert_eq!(fx.project().status, ProjectStatus::OutlineGenerated);
        assert_eq!(fx.job_record(job).progress.completed, 1);
        assert_eq!(crate::usage::total_tokens(fx.store.as_ref(), fx.owner).unwrap(), 100);
    }

    #[test]
    fn malformed_outline_is_an_error() {
        let mut text = FakeText::new();
        text.outline_json = "not json".into();
        let fx = Fixture::new(text, FakeImage::new());
        let job = fx.job(JobKind::Outline, 1);

        let err = generate_outline(&fx.ctx(), job, fx.project_id).unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Outline(_))));
        assert!(fx.pages().is_empty());
    }

    #[test]
    fn missing_text_provider_fails_before_any_write() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let mut ctx = fx.ctx();
        ctx.text = None;
        let job = fx.job(JobKind::Outline, 1);

        let err = generate_outline(&ctx, job, fx.project_id).unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::ProviderConfig(_))));
        assert_eq!(fx.project().status, ProjectStatus::Draft);
    }
}
