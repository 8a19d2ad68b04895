use deckgen_ai::ImageRef;
use deckgen_core::{Material, ProjectId};
use serde_json::json;

use super::images::ImageJobOptions;
use super::{JobRef, TaskContext, TaskResult};
use crate::jobs::Progress;
use crate::usage;

const GLOBAL_SCOPE: &str = "global";

/// A standalone material image request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialRequest {
    pub prompt: String,
    /// `None` files the material outside any project.
    pub project_id: Option<ProjectId>,
    /// Blob path of the main reference image.
    pub reference_path: Option<String>,
    /// Blob paths of further reference images.
    pub extra_paths: Vec<String>,
    pub options: ImageJobOptions,
}

/// Generate a material image, store it and publish `{url, relative_path}` as the
/// job result.
pub fn generate_material(ctx: &TaskContext, job: JobRef, request: &MaterialRequest) -> anyhow::Result<()> {
    run(ctx, job, request)?;
    Ok(())
}

fn run(ctx: &TaskContext, job: JobRef, request: &MaterialRequest) -> TaskResult<()> {
    let generator = ctx.image_generator()?;
    if let Some(project_id) = request.project_id {
        ctx.project(job.owner, project_id)?;
    }
    ctx.begin(job, 1)?;

    let reference = request
        .reference_path
        .as_deref()
        .map(|path| ctx.load_image(path))
        .transpose()?;
    let extra = request
        .extra_paths
        .iter()
        .map(|path| ctx.load_image(path).map(ImageRef::Inline))
        .collect::<TaskResult<Vec<_>>>()?;
    let options = ctx.image_options(
        request.options.aspect_ratio.as_deref(),
        request.options.resolution.as_deref(),
    );

    let generated = generator.generate(&request.prompt, reference.as_ref(), &extra, &options)?;

    let scope = request
        .project_id
        .map_or_else(|| GLOBAL_SCOPE.to_string(), |id| id.to_string());
    let path = ctx.blobs.save(&scope, "materials", &generated.value.bytes)?;
    let url = ctx.blobs.url(&path, ctx.config.signed_url_ttl)?;
    ctx.store
        .insert_material(Material::new(job.owner, request.project_id, path.as_str(), url.as_str()))?;
    ctx.store.update_job(job.owner, job.job_id, &mut |j| {
        j.set_result(json!({ "url": url, "relative_path": path }))
    })?;

    usage::record(
        ctx.store.as_ref(),
        job.owner,
        format!("Generate Material in {scope}"),
        Some(&path),
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
    tracing::info!(job_id = %job.job_id, scope = %scope, path = %path, "material generated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use crate::tasks::TaskError;
    use crate::store::Store;
    use crate::tasks::fakes::{FakeImage, FakeText, Fixture};

    #[test]
    fn project_material_is_stored_under_the_project() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        fx.blobs.put("uploads/ref.png", vec![4]);
        let job = fx.job(JobKind::Material, 1);
        let request = MaterialRequest {
            prompt: "a lighthouse".into(),
            project_id: Some(fx.project_id),
            reference_path: Some("uploads/ref.png".into()),
            ..Default::default()
        };

        generate_material(&fx.ctx(), job, &request).unwrap();

        let record = fx.job_record(job);
        let result = record.result.unwrap();
        let path = result["relative_path"].as_str().unwrap();
        assert!(path.starts_with(&format!("{}/materials/", fx.project_id)));
        assert!(result["url"].as_str().unwrap().starts_with("/files/"));

        let materials = fx.store.list_materials(fx.owner, Some(fx.project_id)).unwrap();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].relative_path, path);
        assert!(fx.image.calls()[0].had_reference);
    }

    #[test]
    fn global_material_uses_the_global_scope() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let job = fx.job(JobKind::Material, 1);
        let request = MaterialRequest {
            prompt: "an icon".into(),
            ..Default::default()
        };

        generate_material(&fx.ctx(), job, &request).unwrap();

        let result = fx.job_record(job).result.unwrap();
        assert!(result["relative_path"].as_str().unwrap().starts_with("global/materials/"));
    }

    #[test]
    fn unreadable_reference_fails_the_job() {
        let fx = Fixture::new(FakeText::new(), FakeImage::new());
        let job = fx.job(JobKind::Material, 1);
        let request = MaterialRequest {
            prompt: "an icon".into(),
            extra_paths: vec!["nope.png".into()],
            ..Default::default()
        };

        let err = generate_material(&fx.ctx(), job, &request).unwrap_err();

        assert!(matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Blob(_))));
        assert!(fx.image.calls().is_empty());
    }
}
